// Copyright 2025 Runlens (https://github.com/runlens)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Run reconstruction pipeline.
//!
//! Fetches a run's telemetry, derives failure signals, cost, timeline,
//! and status, then attaches the generated post-mortem. A run with
//! metadata but no steps still reconstructs, with empty signals and
//! zero cost.

use runlens_core::{ReconstructedRun, ReconstructionConfig};
use thiserror::Error;
use tracing::{debug, info};

use crate::cost::aggregate_cost;
use crate::engine::ExplanationEngine;
use crate::signals::extract_signals;
use crate::status::resolve_status_now;
use crate::store::{RunStore, StoreError};
use crate::timeline::build_timeline;

#[derive(Debug, Error)]
pub enum ReconstructError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct Reconstructor<S: RunStore> {
    store: S,
    config: ReconstructionConfig,
    engine: ExplanationEngine,
}

impl<S: RunStore> Reconstructor<S> {
    pub fn new(store: S, config: ReconstructionConfig) -> Self {
        let engine = ExplanationEngine::new(config.clone());
        Self {
            store,
            config,
            engine,
        }
    }

    pub fn with_engine(store: S, config: ReconstructionConfig, engine: ExplanationEngine) -> Self {
        Self {
            store,
            config,
            engine,
        }
    }

    /// Reconstruct a run by id. `Ok(None)` when the run is unknown.
    pub async fn reconstruct(
        &self,
        run_id: &str,
    ) -> Result<Option<ReconstructedRun>, ReconstructError> {
        let Some(metadata) = self.store.fetch_run(run_id).await? else {
            debug!(run_id, "run not found");
            return Ok(None);
        };
        let steps = self.store.fetch_steps(run_id).await?;

        let timeline = build_timeline(&metadata, &steps);
        let signals = extract_signals(&steps, &self.config);
        let cost = aggregate_cost(&steps);
        let status = resolve_status_now(&metadata, &steps, &self.config);

        let mut run = ReconstructedRun {
            metadata,
            steps,
            signals,
            cost,
            timeline,
            status,
            post_mortem: None,
        };
        run.post_mortem = Some(self.engine.generate(&run).await);

        info!(
            run_id,
            status = %run.status,
            step_count = run.timeline.step_count,
            has_anomalies = run.signals.has_anomalies,
            "reconstructed run"
        );
        Ok(Some(run))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use runlens_core::{Framework, RunMetadata, RunStatus};

    #[tokio::test]
    async fn test_unknown_run_reconstructs_to_none() {
        let reconstructor =
            Reconstructor::new(MemoryStore::new(), ReconstructionConfig::default());
        let result = reconstructor.reconstruct("missing").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_run_without_steps_still_reconstructs() {
        let mut store = MemoryStore::new();
        store.insert_run(RunMetadata {
            run_id: "run-1".to_string(),
            agent_name: "researcher".to_string(),
            framework: Framework::Custom,
            started_at: "2025-06-01T12:00:00Z".parse().unwrap(),
            ended_at: Some("2025-06-01T12:05:00Z".parse().unwrap()),
            environment: None,
            tags: None,
        });

        let reconstructor = Reconstructor::new(store, ReconstructionConfig::default());
        let run = reconstructor.reconstruct("run-1").await.unwrap().unwrap();

        assert_eq!(run.status, RunStatus::Complete);
        assert_eq!(run.timeline.step_count, 0);
        assert!(!run.signals.has_anomalies);
        assert_eq!(run.cost.total_cost_usd, 0.0);
        assert!(run.post_mortem.is_some());
    }
}
