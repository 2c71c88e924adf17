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

//! Failure taxonomy and post-mortem types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed failure taxonomy.
///
/// `Hallucination` and `InstructionMisalignment` are declared taxonomy
/// members but are unreachable from the current signal set: they require
/// output/ground-truth comparison the pipeline does not have. They keep
/// their template builders so that adding a detector later is a
/// classifier-rule change only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureType {
    Hallucination,
    ToolExecutionFailure,
    ContextFailure,
    ControlFlowFailure,
    InstructionMisalignment,
    CostExplosion,
    Unclear,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureType::Hallucination => "hallucination",
            FailureType::ToolExecutionFailure => "tool_execution_failure",
            FailureType::ContextFailure => "context_failure",
            FailureType::ControlFlowFailure => "control_flow_failure",
            FailureType::InstructionMisalignment => "instruction_misalignment",
            FailureType::CostExplosion => "cost_explosion",
            FailureType::Unclear => "unclear",
        };
        f.write_str(s)
    }
}

/// Outcome of the priority-ordered failure classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureClassification {
    pub primary_type: FailureType,
    /// Confidence score in `[0, 1]`.
    pub confidence: f64,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_tags: Option<Vec<String>>,
}

/// Classification plus the rendered explanation for a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostMortem {
    pub classification: FailureClassification,
    /// Plain-English explanation, markdown-formatted.
    pub explanation: String,
    pub generated_at: DateTime<Utc>,
}
