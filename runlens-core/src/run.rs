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

//! Run and step telemetry types
//!
//! A *run* is one end-to-end execution of an autonomous agent. A *step* is
//! one recorded unit of agent activity within a run (LLM call, tool call,
//! memory access, retry, generic action). Both are immutable once recorded;
//! the only permitted metadata mutation is `ended_at` transitioning from
//! absent to present exactly once, and that belongs to the ingestion layer,
//! not to this crate.

use crate::classification::PostMortem;
use crate::cost::CostSummary;
use crate::signal::FailureSignals;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of activity a step records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    LlmCall,
    ToolCall,
    MemoryRead,
    MemoryWrite,
    Action,
    Retry,
}

impl fmt::Display for StepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StepType::LlmCall => "llm_call",
            StepType::ToolCall => "tool_call",
            StepType::MemoryRead => "memory_read",
            StepType::MemoryWrite => "memory_write",
            StepType::Action => "action",
            StepType::Retry => "retry",
        };
        f.write_str(s)
    }
}

/// Terminal status of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Success,
    Error,
}

/// Agent framework that produced the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Framework {
    Langchain,
    Crewai,
    Custom,
    Other,
}

impl fmt::Display for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Framework::Langchain => "langchain",
            Framework::Crewai => "crewai",
            Framework::Custom => "custom",
            Framework::Other => "other",
        };
        f.write_str(s)
    }
}

/// Deployment environment the run executed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Local,
    Staging,
    Prod,
}

/// One recorded action within a run.
///
/// Ordering within a run is ascending `timestamp`, with recording order
/// breaking ties; maintaining that order is the store's contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepEvent {
    /// Unique within the run.
    pub step_id: String,
    pub run_id: String,
    pub step_type: StepType,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<StepStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    /// Wall-clock latency of the step in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_prompt: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_completion: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_usd: Option<f64>,
}

impl StepEvent {
    /// True when the step ended in an error.
    pub fn is_error(&self) -> bool {
        self.status == Some(StepStatus::Error)
    }
}

/// Metadata for one agent run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetadata {
    pub run_id: String,
    pub agent_name: String,
    pub framework: Framework,
    pub started_at: DateTime<Utc>,
    /// Present once the run has been marked complete.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<Environment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

/// Lightweight per-step view used in the timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineStep {
    pub step_id: String,
    pub step_type: StepType,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<StepStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_usd: Option<f64>,
}

/// Derived duration/step-count summary of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timeline {
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    /// Wall-clock delta between `started_at` and `ended_at`. Absent while
    /// the run has not ended; never derived from step timestamps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    pub step_count: usize,
    pub steps: Vec<TimelineStep>,
}

/// Resolved state of a run at reconstruction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Complete,
    Incomplete,
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Complete => "complete",
            RunStatus::Incomplete => "incomplete",
            RunStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Aggregate result of reconstructing one run.
///
/// Constructed fresh on every reconstruction request and never persisted
/// by the analysis pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconstructedRun {
    pub metadata: RunMetadata,
    pub steps: Vec<StepEvent>,
    pub signals: FailureSignals,
    pub cost: CostSummary,
    pub timeline: Timeline,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_mortem: Option<PostMortem>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_type_wire_names() {
        let json = serde_json::to_string(&StepType::LlmCall).unwrap();
        assert_eq!(json, "\"llm_call\"");

        let parsed: StepType = serde_json::from_str("\"memory_write\"").unwrap();
        assert_eq!(parsed, StepType::MemoryWrite);
    }

    #[test]
    fn test_step_event_optional_fields_default() {
        let json = r#"{
            "step_id": "s1",
            "run_id": "r1",
            "step_type": "tool_call",
            "timestamp": "2025-06-01T12:00:00Z"
        }"#;

        let step: StepEvent = serde_json::from_str(json).unwrap();
        assert_eq!(step.step_id, "s1");
        assert_eq!(step.step_type, StepType::ToolCall);
        assert!(step.tool_name.is_none());
        assert!(step.cost_usd.is_none());
        assert!(!step.is_error());
    }

    #[test]
    fn test_run_metadata_round_trip() {
        let meta = RunMetadata {
            run_id: "run-1".to_string(),
            agent_name: "researcher".to_string(),
            framework: Framework::Langchain,
            started_at: "2025-06-01T12:00:00Z".parse().unwrap(),
            ended_at: None,
            environment: Some(Environment::Staging),
            tags: Some(vec!["nightly".to_string()]),
        };

        let json = serde_json::to_string(&meta).unwrap();
        assert!(json.contains("\"framework\":\"langchain\""));
        assert!(!json.contains("ended_at"));

        let restored: RunMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.run_id, meta.run_id);
        assert_eq!(restored.environment, Some(Environment::Staging));
    }
}
