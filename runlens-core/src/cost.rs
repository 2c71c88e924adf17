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

//! Cost and token usage summaries

use crate::run::StepType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The single costliest step of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MostExpensiveStep {
    pub step_id: String,
    pub cost_usd: f64,
}

/// Token and USD cost totals for one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CostSummary {
    pub total_tokens: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_cost_usd: f64,
    /// Cost accumulated per step type. Types with no steps are absent.
    pub cost_by_step_type: HashMap<StepType, f64>,
    /// Absent when the run has no steps or no step has positive cost.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub most_expensive_step: Option<MostExpensiveStep>,
}

impl CostSummary {
    /// Cost attributed to one step type, zero when absent.
    pub fn cost_for(&self, step_type: StepType) -> f64 {
        self.cost_by_step_type.get(&step_type).copied().unwrap_or(0.0)
    }
}
