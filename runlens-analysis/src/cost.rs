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

//! Cost aggregation
//!
//! A pure reduction over a run's steps: absent token/cost fields count as
//! zero, per-step-type costs accumulate, and the most expensive step is
//! found with a strict greater-than comparison so the first maximum
//! encountered wins ties.

use runlens_core::{CostSummary, MostExpensiveStep, StepEvent};

/// Aggregate token and cost totals over a step sequence.
pub fn aggregate_cost(steps: &[StepEvent]) -> CostSummary {
    let mut summary = CostSummary::default();

    for step in steps {
        summary.prompt_tokens += step.tokens_prompt.unwrap_or(0);
        summary.completion_tokens += step.tokens_completion.unwrap_or(0);

        let cost = step.cost_usd.unwrap_or(0.0);
        summary.total_cost_usd += cost;
        *summary.cost_by_step_type.entry(step.step_type).or_insert(0.0) += cost;
    }
    summary.total_tokens = summary.prompt_tokens + summary.completion_tokens;
    summary.most_expensive_step = find_most_expensive(steps);

    summary
}

/// The costliest step, or `None` when there are no steps or the maximum
/// cost is not strictly positive.
pub fn find_most_expensive(steps: &[StepEvent]) -> Option<MostExpensiveStep> {
    let first = steps.first()?;
    let mut max_step = first;
    let mut max_cost = first.cost_usd.unwrap_or(0.0);

    for step in steps {
        let cost = step.cost_usd.unwrap_or(0.0);
        if cost > max_cost {
            max_cost = cost;
            max_step = step;
        }
    }

    (max_cost > 0.0).then(|| MostExpensiveStep {
        step_id: max_step.step_id.clone(),
        cost_usd: max_cost,
    })
}
