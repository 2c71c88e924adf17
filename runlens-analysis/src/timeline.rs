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

//! Timeline construction

use runlens_core::{RunMetadata, StepEvent, Timeline, TimelineStep};

/// Build the timeline summary for a run.
///
/// Duration is the wall-clock delta between `started_at` and `ended_at`,
/// absent while the run has not ended. It is never derived from step
/// timestamps. Absent optional step fields propagate as absent.
pub fn build_timeline(metadata: &RunMetadata, steps: &[StepEvent]) -> Timeline {
    let duration_ms = metadata
        .ended_at
        .map(|ended| (ended - metadata.started_at).num_milliseconds());

    let timeline_steps = steps
        .iter()
        .map(|step| TimelineStep {
            step_id: step.step_id.clone(),
            step_type: step.step_type,
            timestamp: step.timestamp,
            status: step.status,
            latency_ms: step.latency_ms,
            cost_usd: step.cost_usd,
        })
        .collect();

    Timeline {
        started_at: metadata.started_at,
        ended_at: metadata.ended_at,
        duration_ms,
        step_count: steps.len(),
        steps: timeline_steps,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use runlens_core::{Framework, StepType};

    fn metadata(ended: bool) -> RunMetadata {
        let started_at = "2025-06-01T12:00:00Z".parse().unwrap();
        RunMetadata {
            run_id: "run-1".to_string(),
            agent_name: "researcher".to_string(),
            framework: Framework::Custom,
            started_at,
            ended_at: ended.then(|| started_at + Duration::seconds(90)),
            environment: None,
            tags: None,
        }
    }

    fn step(id: &str) -> StepEvent {
        StepEvent {
            step_id: id.to_string(),
            run_id: "run-1".to_string(),
            step_type: StepType::LlmCall,
            timestamp: "2025-06-01T12:00:05Z".parse().unwrap(),
            model: None,
            tool_name: None,
            status: None,
            error_type: None,
            latency_ms: Some(400),
            tokens_prompt: None,
            tokens_completion: None,
            cost_usd: Some(0.01),
        }
    }

    #[test]
    fn test_duration_only_when_ended() {
        let timeline = build_timeline(&metadata(false), &[]);
        assert!(timeline.duration_ms.is_none());
        assert!(timeline.ended_at.is_none());

        let timeline = build_timeline(&metadata(true), &[]);
        assert_eq!(timeline.duration_ms, Some(90_000));
    }

    #[test]
    fn test_step_count_and_summaries() {
        let steps = vec![step("s1"), step("s2")];
        let timeline = build_timeline(&metadata(false), &steps);

        assert_eq!(timeline.step_count, 2);
        assert_eq!(timeline.steps.len(), 2);
        assert_eq!(timeline.steps[0].step_id, "s1");
        assert_eq!(timeline.steps[0].latency_ms, Some(400));
        assert_eq!(timeline.steps[0].cost_usd, Some(0.01));
    }

    #[test]
    fn test_empty_run_timeline() {
        let timeline = build_timeline(&metadata(false), &[]);
        assert_eq!(timeline.step_count, 0);
        assert!(timeline.steps.is_empty());
    }
}
