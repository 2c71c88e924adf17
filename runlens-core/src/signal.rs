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

//! Derived anomaly signals
//!
//! Every signal is a pure function of a run's ordered step sequence and
//! static configuration: re-running detection against an unchanged sequence
//! yields identical output, and nothing here mutates stored state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A contiguous run of `retry`-typed steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySignal {
    /// The step immediately preceding the retry run, or the first retry
    /// itself when the run opens the sequence.
    pub start_step_id: String,
    /// Last retry in the run.
    pub end_step_id: String,
    pub count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    /// True iff every retry in the run ended in an error.
    pub all_failed: bool,
}

/// Repeated same-tool activity correlated with repeated failures,
/// distinct from simple repetition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopSignal {
    pub tool: String,
    pub repetitions: usize,
    /// `"<first error type> loop"`, or `"repeated calls"` when no error
    /// type was recorded.
    pub pattern: String,
    pub step_ids: Vec<String>,
}

/// Error severity, derived from the error type text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSeverity {
    Fatal,
    Recoverable,
}

/// One step that ended in an error with a recorded error type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorSignal {
    pub step_id: String,
    pub error_type: String,
    pub severity: ErrorSeverity,
    pub timestamp: DateTime<Utc>,
}

/// A step whose latency exceeded the spike threshold for its run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatencySignal {
    pub step_id: String,
    pub latency_ms: u64,
    /// Median of the run's positive latencies, computed once per run.
    pub median_latency: f64,
    /// The threshold that was applied: `max(configured floor, 3 × median)`.
    pub threshold: f64,
}

/// Failed `tool_call` steps grouped by tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolFailureSignal {
    pub tool: String,
    pub failure_count: usize,
    pub step_ids: Vec<String>,
}

/// Output of all five detectors for one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FailureSignals {
    pub retries: Vec<RetrySignal>,
    pub loops: Vec<LoopSignal>,
    pub errors: Vec<ErrorSignal>,
    pub latency_spikes: Vec<LatencySignal>,
    pub tool_failures: Vec<ToolFailureSignal>,
    /// True iff any of the five detector outputs is non-empty.
    pub has_anomalies: bool,
}

impl FailureSignals {
    /// Recompute `has_anomalies` from the five signal lists.
    pub fn any_present(&self) -> bool {
        !self.retries.is_empty()
            || !self.loops.is_empty()
            || !self.errors.is_empty()
            || !self.latency_spikes.is_empty()
            || !self.tool_failures.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_signals_have_no_anomalies() {
        let signals = FailureSignals::default();
        assert!(!signals.has_anomalies);
        assert!(!signals.any_present());
    }

    #[test]
    fn test_severity_wire_names() {
        assert_eq!(
            serde_json::to_string(&ErrorSeverity::Fatal).unwrap(),
            "\"fatal\""
        );
        assert_eq!(
            serde_json::to_string(&ErrorSeverity::Recoverable).unwrap(),
            "\"recoverable\""
        );
    }
}
