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

//! Failure classification
//!
//! A priority cascade expressed as an ordered list of rules evaluated
//! first-match-wins, so primary types are mutually exclusive per
//! invocation and the tie-break policy stays explicit and testable per
//! rule. `hallucination` and `instruction_misalignment` have no rule here:
//! they need output/ground-truth comparison the signal set cannot provide.

use runlens_core::{
    CostSummary, FailureClassification, FailureSignals, FailureType, ReconstructionConfig,
};

type Rule = fn(&FailureSignals, &CostSummary, &ReconstructionConfig) -> Option<FailureClassification>;

/// Classification rules in priority order; the first match wins.
const RULES: &[Rule] = &[
    control_flow_rule,
    tool_failure_rule,
    tool_error_fallback_rule,
    cost_explosion_rule,
    context_failure_rule,
];

/// Classify the dominant failure mode of a run from its signals and cost.
pub fn classify_failure(
    signals: &FailureSignals,
    cost: &CostSummary,
    config: &ReconstructionConfig,
) -> FailureClassification {
    RULES
        .iter()
        .find_map(|rule| rule(signals, cost, config))
        .unwrap_or_else(|| unclear_classification(signals))
}

/// Loops or retry sequences: the clearest failure pattern.
fn control_flow_rule(
    signals: &FailureSignals,
    _cost: &CostSummary,
    _config: &ReconstructionConfig,
) -> Option<FailureClassification> {
    let has_loops = !signals.loops.is_empty();
    let has_retries = !signals.retries.is_empty();
    if !has_loops && !has_retries {
        return None;
    }

    let reason = if has_loops {
        format!(
            "Detected {} loop pattern(s) with repeated operations",
            signals.loops.len()
        )
    } else {
        format!(
            "Detected {} retry sequence(s) without progress",
            signals.retries.len()
        )
    };

    Some(FailureClassification {
        primary_type: FailureType::ControlFlowFailure,
        confidence: 0.9,
        reason,
        secondary_tags: (has_loops && has_retries)
            .then(|| vec!["loops".to_string(), "retries".to_string()]),
    })
}

/// Tool-specific errors are highly indicative.
fn tool_failure_rule(
    signals: &FailureSignals,
    _cost: &CostSummary,
    _config: &ReconstructionConfig,
) -> Option<FailureClassification> {
    if signals.tool_failures.is_empty() {
        return None;
    }

    let total_failures: usize = signals.tool_failures.iter().map(|tf| tf.failure_count).sum();

    Some(FailureClassification {
        primary_type: FailureType::ToolExecutionFailure,
        confidence: 0.85,
        reason: format!(
            "{} tool failure(s) detected across {} tool(s)",
            total_failures,
            signals.tool_failures.len()
        ),
        secondary_tags: Some(
            signals
                .tool_failures
                .iter()
                .map(|tf| tf.tool.clone())
                .collect(),
        ),
    })
}

/// No grouped tool failures, but error types that smell of tool/API
/// trouble still point at tool execution.
fn tool_error_fallback_rule(
    signals: &FailureSignals,
    _cost: &CostSummary,
    _config: &ReconstructionConfig,
) -> Option<FailureClassification> {
    let has_tool_errors = signals.errors.iter().any(|e| {
        let lower = e.error_type.to_lowercase();
        lower.contains("timeout") || lower.contains("api") || lower.contains("connection")
    });
    if !has_tool_errors {
        return None;
    }

    Some(FailureClassification {
        primary_type: FailureType::ToolExecutionFailure,
        confidence: 0.75,
        reason: "Error signals suggest tool/API failures".to_string(),
        secondary_tags: Some(signals.errors.iter().map(|e| e.error_type.clone()).collect()),
    })
}

/// Total cost above the configured threshold.
fn cost_explosion_rule(
    _signals: &FailureSignals,
    cost: &CostSummary,
    config: &ReconstructionConfig,
) -> Option<FailureClassification> {
    if cost.total_cost_usd <= config.high_cost_threshold_usd {
        return None;
    }

    let percent_above = (cost.total_cost_usd - config.high_cost_threshold_usd)
        / config.high_cost_threshold_usd
        * 100.0;

    Some(FailureClassification {
        primary_type: FailureType::CostExplosion,
        confidence: 0.8,
        reason: format!(
            "High cost: ${:.2} exceeds threshold by {:.0}%",
            cost.total_cost_usd, percent_above
        ),
        secondary_tags: None,
    })
}

/// Context/memory error text.
fn context_failure_rule(
    signals: &FailureSignals,
    _cost: &CostSummary,
    _config: &ReconstructionConfig,
) -> Option<FailureClassification> {
    let has_context_errors = signals.errors.iter().any(|e| {
        let lower = e.error_type.to_lowercase();
        lower.contains("context") || lower.contains("memory")
    });
    if !has_context_errors {
        return None;
    }

    Some(FailureClassification {
        primary_type: FailureType::ContextFailure,
        confidence: 0.6,
        reason: "Error signals suggest context/memory issues".to_string(),
        secondary_tags: None,
    })
}

/// Default when no rule matched. A zero-confidence `unclear` is also the
/// implicit marker of a genuinely successful run; there is no separate
/// success classification.
fn unclear_classification(signals: &FailureSignals) -> FailureClassification {
    if signals.errors.is_empty() {
        FailureClassification {
            primary_type: FailureType::Unclear,
            confidence: 0.0,
            reason: "No clear failure pattern detected - run may have succeeded".to_string(),
            secondary_tags: None,
        }
    } else {
        FailureClassification {
            primary_type: FailureType::Unclear,
            confidence: 0.4,
            reason: format!(
                "{} error(s) detected but no clear failure pattern",
                signals.errors.len()
            ),
            secondary_tags: None,
        }
    }
}
