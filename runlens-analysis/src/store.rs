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

//! Telemetry storage access.
//!
//! `RunStore` is the seam between reconstruction and whatever backend
//! holds the raw telemetry. `MemoryStore` is the in-process
//! implementation, loadable from a `{"runs": [...], "steps": [...]}`
//! JSON fixture.

use async_trait::async_trait;
use runlens_core::{RunMetadata, StepEvent};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read telemetry: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to decode telemetry: {0}")]
    Json(#[from] serde_json::Error),
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Read access to run telemetry.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Fetch run metadata. `Ok(None)` when the run id is unknown.
    async fn fetch_run(&self, run_id: &str) -> Result<Option<RunMetadata>, StoreError>;

    /// Fetch all step events for a run in timestamp order. An unknown
    /// run id yields an empty vector, not an error.
    async fn fetch_steps(&self, run_id: &str) -> Result<Vec<StepEvent>, StoreError>;
}

#[derive(Debug, Deserialize)]
struct Fixture {
    #[serde(default)]
    runs: Vec<RunMetadata>,
    #[serde(default)]
    steps: Vec<StepEvent>,
}

/// In-memory store keyed by run id.
#[derive(Debug, Default)]
pub struct MemoryStore {
    runs: HashMap<String, RunMetadata>,
    steps: HashMap<String, Vec<StepEvent>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_run(&mut self, run: RunMetadata) {
        self.runs.insert(run.run_id.clone(), run);
    }

    pub fn insert_step(&mut self, step: StepEvent) {
        self.steps.entry(step.run_id.clone()).or_default().push(step);
    }

    /// Load from a JSON fixture document holding `runs` and `steps`
    /// arrays. Steps are sorted by timestamp per run; events sharing a
    /// timestamp keep their document order.
    pub fn from_json_str(json: &str) -> Result<Self, StoreError> {
        let fixture: Fixture = serde_json::from_str(json)?;
        let mut store = Self::new();
        for run in fixture.runs {
            store.insert_run(run);
        }
        for step in fixture.steps {
            store.insert_step(step);
        }
        for steps in store.steps.values_mut() {
            steps.sort_by_key(|step| step.timestamp);
        }
        Ok(store)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }
}

#[async_trait]
impl RunStore for MemoryStore {
    async fn fetch_run(&self, run_id: &str) -> Result<Option<RunMetadata>, StoreError> {
        Ok(self.runs.get(run_id).cloned())
    }

    async fn fetch_steps(&self, run_id: &str) -> Result<Vec<StepEvent>, StoreError> {
        Ok(self.steps.get(run_id).cloned().unwrap_or_default())
    }
}
