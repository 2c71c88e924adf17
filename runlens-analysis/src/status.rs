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

//! Run status resolution
//!
//! A state classifier, not a stateful machine: evaluated fresh on every
//! call against the supplied wall clock.

use chrono::{DateTime, Duration, Utc};
use runlens_core::{ReconstructionConfig, RunMetadata, RunStatus, StepEvent};

/// Resolve the status of a run at time `now`.
///
/// Rules, in order:
/// 1. `ended_at` present: `complete`.
/// 2. Any step with error status and a fatal/critical error type: `failed`.
/// 3. Steps exist and the last step is older than the inactivity timeout:
///    `incomplete`.
/// 4. No steps and `started_at` is older than the same timeout:
///    `incomplete`.
/// 5. Otherwise `complete`.
///
/// Caveat on rule 5: an unended, non-stale, non-fatal run is reported as
/// `complete`, which conflates "apparently still progressing" with
/// "finished". This matches the recorded historical behavior and is kept
/// deliberately; see DESIGN.md.
pub fn resolve_status(
    metadata: &RunMetadata,
    steps: &[StepEvent],
    now: DateTime<Utc>,
    config: &ReconstructionConfig,
) -> RunStatus {
    if metadata.ended_at.is_some() {
        return RunStatus::Complete;
    }

    let has_fatal_error = steps.iter().any(|step| {
        step.is_error()
            && step
                .error_type
                .as_deref()
                .map(|e| {
                    let lower = e.to_lowercase();
                    lower.contains("fatal") || lower.contains("critical")
                })
                .unwrap_or(false)
    });
    if has_fatal_error {
        return RunStatus::Failed;
    }

    let timeout = Duration::milliseconds(config.incomplete_run_timeout_ms as i64);
    match steps.last() {
        Some(last) => {
            if now - last.timestamp > timeout {
                return RunStatus::Incomplete;
            }
        }
        None => {
            if now - metadata.started_at > timeout {
                return RunStatus::Incomplete;
            }
        }
    }

    RunStatus::Complete
}

/// Resolve status against the current wall clock.
pub fn resolve_status_now(
    metadata: &RunMetadata,
    steps: &[StepEvent],
    config: &ReconstructionConfig,
) -> RunStatus {
    resolve_status(metadata, steps, Utc::now(), config)
}
