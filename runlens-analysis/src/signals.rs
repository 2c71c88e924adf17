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

//! Signal extraction
//!
//! Five independent detectors over one run's ordered step sequence:
//! retries, loops, errors, latency spikes, and tool failures. Each detector
//! is a pure function of the sequence and the static configuration: no
//! shared state, deterministic and idempotent, so they may run in any
//! order (or concurrently) without affecting the result.

use runlens_core::{
    ErrorSeverity, ErrorSignal, FailureSignals, LatencySignal, LoopSignal, ReconstructionConfig,
    RetrySignal, StepEvent, StepType, ToolFailureSignal,
};
use std::collections::HashMap;
use tracing::debug;

/// Detect contiguous runs of `retry`-typed steps.
///
/// A run is reported when it contains at least `retry_threshold - 1`
/// consecutive retries. Its start id is the step immediately preceding the
/// first retry (or the first retry itself when the run opens the
/// sequence); its end id is the last retry. A non-retry step closes the
/// current run, and the final open run is flushed at end of sequence.
pub fn detect_retries(steps: &[StepEvent], config: &ReconstructionConfig) -> Vec<RetrySignal> {
    let mut signals = Vec::new();
    let mut sequence: Vec<&StepEvent> = Vec::new();
    let mut start_step_id = String::new();

    let flush = |sequence: &mut Vec<&StepEvent>,
                 start_step_id: &str,
                 signals: &mut Vec<RetrySignal>| {
        if !sequence.is_empty() && sequence.len() >= config.retry_threshold.saturating_sub(1) {
            let all_failed = sequence.iter().all(|s| s.is_error());
            signals.push(RetrySignal {
                start_step_id: start_step_id.to_string(),
                end_step_id: sequence[sequence.len() - 1].step_id.clone(),
                count: sequence.len(),
                tool: sequence[0].tool_name.clone(),
                all_failed,
            });
        }
        sequence.clear();
    };

    for (i, step) in steps.iter().enumerate() {
        if step.step_type == StepType::Retry {
            if sequence.is_empty() {
                // The step that originally failed precedes the first retry.
                start_step_id = if i > 0 {
                    steps[i - 1].step_id.clone()
                } else {
                    step.step_id.clone()
                };
            }
            sequence.push(step);
        } else {
            flush(&mut sequence, &start_step_id, &mut signals);
        }
    }
    flush(&mut sequence, &start_step_id, &mut signals);

    signals
}

/// Detect loop patterns: repeated same-tool activity correlated with
/// repeated failures.
///
/// `tool_call`/`retry` steps are grouped by tool name independent of
/// position; steps without a tool name are ignored. A group is a loop only
/// when its size reaches `loop_threshold` AND the number of non-empty
/// error types within it also reaches `loop_threshold` — failures must be
/// repeating, not merely calls. Groups are reported in first-seen tool
/// order so output is deterministic.
pub fn detect_loops(steps: &[StepEvent], config: &ReconstructionConfig) -> Vec<LoopSignal> {
    let mut order: Vec<&str> = Vec::new();
    let mut groups: HashMap<&str, Vec<&StepEvent>> = HashMap::new();

    for step in steps {
        if matches!(step.step_type, StepType::ToolCall | StepType::Retry) {
            if let Some(tool) = step.tool_name.as_deref() {
                let group = groups.entry(tool).or_default();
                if group.is_empty() {
                    order.push(tool);
                }
                group.push(step);
            }
        }
    }

    let mut signals = Vec::new();
    for tool in order {
        let group = &groups[tool];
        if group.len() < config.loop_threshold {
            continue;
        }

        let error_types: Vec<&str> = group
            .iter()
            .filter_map(|s| s.error_type.as_deref())
            .filter(|e| !e.is_empty())
            .collect();

        if error_types.len() >= config.loop_threshold {
            let pattern = match error_types.first() {
                Some(first) => format!("{first} loop"),
                None => "repeated calls".to_string(),
            };

            signals.push(LoopSignal {
                tool: tool.to_string(),
                repetitions: group.len(),
                pattern,
                step_ids: group.iter().map(|s| s.step_id.clone()).collect(),
            });
        }
    }

    signals
}

/// One signal per step with error status and a non-empty error type.
/// Severity is `fatal` when the error type text contains "fatal" or
/// "critical" (case-insensitive), `recoverable` otherwise.
pub fn detect_errors(steps: &[StepEvent]) -> Vec<ErrorSignal> {
    let mut signals = Vec::new();

    for step in steps {
        if !step.is_error() {
            continue;
        }
        let Some(error_type) = step.error_type.as_deref().filter(|e| !e.is_empty()) else {
            continue;
        };

        let lower = error_type.to_lowercase();
        let severity = if lower.contains("fatal") || lower.contains("critical") {
            ErrorSeverity::Fatal
        } else {
            ErrorSeverity::Recoverable
        };

        signals.push(ErrorSignal {
            step_id: step.step_id.clone(),
            error_type: error_type.to_string(),
            severity,
            timestamp: step.timestamp,
        });
    }

    signals
}

/// Detect latency spikes against `max(configured floor, 3 × median)`.
///
/// The median is computed once over the run's positive latencies; when no
/// step has positive latency the detector reports nothing.
pub fn detect_latency_spikes(
    steps: &[StepEvent],
    config: &ReconstructionConfig,
) -> Vec<LatencySignal> {
    let latencies: Vec<u64> = steps
        .iter()
        .filter_map(|s| s.latency_ms)
        .filter(|&l| l > 0)
        .collect();

    if latencies.is_empty() {
        return Vec::new();
    }

    let median = median(&latencies);
    let threshold = (config.latency_spike_ms as f64).max(median * 3.0);

    let mut signals = Vec::new();
    for step in steps {
        let Some(latency) = step.latency_ms.filter(|&l| l > 0) else {
            continue;
        };
        if (latency as f64) > threshold {
            signals.push(LatencySignal {
                step_id: step.step_id.clone(),
                latency_ms: latency,
                median_latency: median,
                threshold,
            });
        }
    }

    signals
}

/// Failed `tool_call` steps grouped by tool, in first-seen tool order.
pub fn detect_tool_failures(steps: &[StepEvent]) -> Vec<ToolFailureSignal> {
    let mut order: Vec<&str> = Vec::new();
    let mut failures: HashMap<&str, Vec<String>> = HashMap::new();

    for step in steps {
        if step.step_type == StepType::ToolCall && step.is_error() {
            if let Some(tool) = step.tool_name.as_deref() {
                let step_ids = failures.entry(tool).or_default();
                if step_ids.is_empty() {
                    order.push(tool);
                }
                step_ids.push(step.step_id.clone());
            }
        }
    }

    order
        .into_iter()
        .map(|tool| {
            let step_ids = failures.remove(tool).unwrap_or_default();
            ToolFailureSignal {
                tool: tool.to_string(),
                failure_count: step_ids.len(),
                step_ids,
            }
        })
        .collect()
}

/// Run all five detectors over a step sequence.
pub fn extract_signals(steps: &[StepEvent], config: &ReconstructionConfig) -> FailureSignals {
    let mut signals = FailureSignals {
        retries: detect_retries(steps, config),
        loops: detect_loops(steps, config),
        errors: detect_errors(steps),
        latency_spikes: detect_latency_spikes(steps, config),
        tool_failures: detect_tool_failures(steps),
        has_anomalies: false,
    };
    signals.has_anomalies = signals.any_present();

    if signals.has_anomalies {
        debug!(
            retries = signals.retries.len(),
            loops = signals.loops.len(),
            errors = signals.errors.len(),
            latency_spikes = signals.latency_spikes.len(),
            tool_failures = signals.tool_failures.len(),
            "anomaly signals detected"
        );
    }

    signals
}

fn median(samples: &[u64]) -> f64 {
    let mut sorted = samples.to_vec();
    sorted.sort_unstable();

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] as f64 + sorted[mid] as f64) / 2.0
    } else {
        sorted[mid] as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, Utc};
    use runlens_core::StepStatus;

    fn base_time() -> DateTime<Utc> {
        "2025-06-01T12:00:00Z".parse().unwrap()
    }

    fn step(id: &str, offset_s: i64, step_type: StepType) -> StepEvent {
        StepEvent {
            step_id: id.to_string(),
            run_id: "run-1".to_string(),
            step_type,
            timestamp: base_time() + Duration::seconds(offset_s),
            model: None,
            tool_name: None,
            status: None,
            error_type: None,
            latency_ms: None,
            tokens_prompt: None,
            tokens_completion: None,
            cost_usd: None,
        }
    }

    fn retry_step(id: &str, offset_s: i64, failed: bool) -> StepEvent {
        let mut s = step(id, offset_s, StepType::Retry);
        s.status = Some(if failed {
            StepStatus::Error
        } else {
            StepStatus::Success
        });
        s
    }

    fn tool_step(id: &str, offset_s: i64, tool: &str, error_type: Option<&str>) -> StepEvent {
        let mut s = step(id, offset_s, StepType::ToolCall);
        s.tool_name = Some(tool.to_string());
        if let Some(e) = error_type {
            s.status = Some(StepStatus::Error);
            s.error_type = Some(e.to_string());
        } else {
            s.status = Some(StepStatus::Success);
        }
        s
    }

    #[test]
    fn test_retry_threshold_boundary() {
        let config = ReconstructionConfig::default(); // threshold 3 => >= 2 reported

        // One retry: below the boundary.
        let steps = vec![step("s1", 0, StepType::Action), retry_step("s2", 1, true)];
        assert!(detect_retries(&steps, &config).is_empty());

        // Exactly threshold - 1 retries: reported.
        let steps = vec![
            step("s1", 0, StepType::Action),
            retry_step("s2", 1, true),
            retry_step("s3", 2, true),
        ];
        let signals = detect_retries(&steps, &config);
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].start_step_id, "s1");
        assert_eq!(signals[0].end_step_id, "s3");
        assert_eq!(signals[0].count, 2);
        assert!(signals[0].all_failed);
    }

    #[test]
    fn test_retry_run_opening_the_sequence() {
        let config = ReconstructionConfig::default();
        let steps = vec![
            retry_step("s1", 0, true),
            retry_step("s2", 1, false),
            step("s3", 2, StepType::Action),
        ];

        let signals = detect_retries(&steps, &config);
        assert_eq!(signals.len(), 1);
        // No preceding step: the first retry anchors the run.
        assert_eq!(signals[0].start_step_id, "s1");
        assert!(!signals[0].all_failed);
    }

    #[test]
    fn test_retry_run_flushed_at_end_of_sequence() {
        let config = ReconstructionConfig::default();
        let steps = vec![
            step("s1", 0, StepType::ToolCall),
            retry_step("s2", 1, true),
            retry_step("s3", 2, true),
            retry_step("s4", 3, true),
        ];

        let signals = detect_retries(&steps, &config);
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].count, 3);
        assert_eq!(signals[0].end_step_id, "s4");
    }

    #[test]
    fn test_loop_requires_repeated_errors_not_just_calls() {
        let config = ReconstructionConfig::default(); // loop threshold 3

        // Three same-tool calls, all successful: repetition, not a loop.
        let steps = vec![
            tool_step("s1", 0, "search_api", None),
            tool_step("s2", 1, "search_api", None),
            tool_step("s3", 2, "search_api", None),
        ];
        assert!(detect_loops(&steps, &config).is_empty());

        // Same count with repeating error types: a loop.
        let steps = vec![
            tool_step("s1", 0, "search_api", Some("timeout")),
            tool_step("s2", 1, "search_api", Some("timeout")),
            tool_step("s3", 2, "search_api", Some("timeout")),
        ];
        let signals = detect_loops(&steps, &config);
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].tool, "search_api");
        assert_eq!(signals[0].repetitions, 3);
        assert_eq!(signals[0].pattern, "timeout loop");
        assert_eq!(signals[0].step_ids, vec!["s1", "s2", "s3"]);
    }

    #[test]
    fn test_loop_ignores_steps_without_tool_name() {
        let config = ReconstructionConfig::default();
        let mut anonymous = step("s1", 0, StepType::ToolCall);
        anonymous.status = Some(StepStatus::Error);
        anonymous.error_type = Some("timeout".to_string());

        let steps = vec![anonymous.clone(), anonymous.clone(), anonymous];
        assert!(detect_loops(&steps, &config).is_empty());
    }

    #[test]
    fn test_error_severity() {
        let steps = vec![
            tool_step("s1", 0, "db", Some("FATAL: connection lost")),
            tool_step("s2", 1, "db", Some("timeout")),
            tool_step("s3", 2, "db", Some("Critical memory pressure")),
        ];

        let signals = detect_errors(&steps);
        assert_eq!(signals.len(), 3);
        assert_eq!(signals[0].severity, ErrorSeverity::Fatal);
        assert_eq!(signals[1].severity, ErrorSeverity::Recoverable);
        assert_eq!(signals[2].severity, ErrorSeverity::Fatal);
    }

    #[test]
    fn test_error_requires_error_type() {
        let mut s = step("s1", 0, StepType::LlmCall);
        s.status = Some(StepStatus::Error);
        assert!(detect_errors(&[s]).is_empty());
    }

    #[test]
    fn test_latency_spike_uses_max_of_floor_and_median_multiple() {
        let mut config = ReconstructionConfig::default();
        config.latency_spike_ms = 100;

        let mut steps = Vec::new();
        for (i, latency) in [200u64, 210, 220, 230, 2000].iter().enumerate() {
            let mut s = step(&format!("s{i}"), i as i64, StepType::LlmCall);
            s.latency_ms = Some(*latency);
            steps.push(s);
        }

        // Median 220, 3x = 660 > floor 100; only the 2000ms step spikes.
        let signals = detect_latency_spikes(&steps, &config);
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].step_id, "s4");
        assert_eq!(signals[0].latency_ms, 2000);
        assert_eq!(signals[0].median_latency, 220.0);
        assert_eq!(signals[0].threshold, 660.0);
    }

    #[test]
    fn test_latency_detector_skips_runs_without_positive_latency() {
        let config = ReconstructionConfig::default();
        let mut s = step("s1", 0, StepType::LlmCall);
        s.latency_ms = Some(0);
        assert!(detect_latency_spikes(&[s], &config).is_empty());
    }

    #[test]
    fn test_tool_failures_grouped_in_first_seen_order() {
        let steps = vec![
            tool_step("s1", 0, "search_api", Some("timeout")),
            tool_step("s2", 1, "fetch_page", Some("http 500")),
            tool_step("s3", 2, "search_api", Some("timeout")),
            tool_step("s4", 3, "ok_tool", None),
        ];

        let signals = detect_tool_failures(&steps);
        assert_eq!(signals.len(), 2);
        assert_eq!(signals[0].tool, "search_api");
        assert_eq!(signals[0].failure_count, 2);
        assert_eq!(signals[0].step_ids, vec!["s1", "s3"]);
        assert_eq!(signals[1].tool, "fetch_page");
        assert_eq!(signals[1].failure_count, 1);
    }

    #[test]
    fn test_extract_signals_is_deterministic() {
        let config = ReconstructionConfig::default();
        let steps = vec![
            tool_step("s1", 0, "search_api", Some("timeout")),
            tool_step("s2", 1, "search_api", Some("timeout")),
            tool_step("s3", 2, "search_api", Some("timeout")),
            step("s4", 3, StepType::Action),
        ];

        let first = extract_signals(&steps, &config);
        let second = extract_signals(&steps, &config);

        assert!(first.has_anomalies);
        assert_eq!(
            serde_json::to_value(&first).unwrap(),
            serde_json::to_value(&second).unwrap()
        );
    }

    #[test]
    fn test_empty_sequence_has_no_anomalies() {
        let config = ReconstructionConfig::default();
        let signals = extract_signals(&[], &config);
        assert!(!signals.has_anomalies);
        assert!(signals.retries.is_empty());
        assert!(signals.loops.is_empty());
        assert!(signals.errors.is_empty());
        assert!(signals.latency_spikes.is_empty());
        assert!(signals.tool_failures.is_empty());
    }
}
