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

//! Explanation templates
//!
//! Each failure type maps to a template-construction function over the
//! reconstructed run. Templates contain five ordered blocks built only
//! from data already present on the run; no speculative content. The
//! markdown serialization of a template is the default explanation and
//! the mandatory fallback when the prose rewriter is unavailable.

use runlens_core::{FailureType, ReconstructedRun, RunStatus, StepType};
use serde::{Deserialize, Serialize};

/// Structured five-section explanation of a run's failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplanationTemplate {
    pub summary: String,
    pub what_happened: Vec<String>,
    pub why_it_failed: Vec<String>,
    pub where_it_failed: String,
    pub cost_impact: Vec<String>,
}

impl ExplanationTemplate {
    /// Serialize to markdown-ish plain text: bold section headers and
    /// bullet lists, in fixed section order.
    pub fn to_markdown(&self) -> String {
        let mut sections = Vec::new();

        sections.push(format!("**Summary:** {}", self.summary));
        sections.push(String::new());

        sections.push("**What happened:**".to_string());
        for line in &self.what_happened {
            sections.push(format!("- {line}"));
        }
        sections.push(String::new());

        sections.push("**Why it failed:**".to_string());
        for line in &self.why_it_failed {
            sections.push(format!("- {line}"));
        }
        sections.push(String::new());

        sections.push("**Where it failed:**".to_string());
        sections.push(format!("- {}", self.where_it_failed));
        sections.push(String::new());

        sections.push("**Cost impact:**".to_string());
        for line in &self.cost_impact {
            sections.push(format!("- {line}"));
        }

        sections.join("\n")
    }
}

/// Build the explanation template for a classified failure type.
pub fn build_template(failure_type: FailureType, run: &ReconstructedRun) -> ExplanationTemplate {
    match failure_type {
        FailureType::ControlFlowFailure => control_flow_template(run),
        FailureType::ToolExecutionFailure => tool_failure_template(run),
        FailureType::CostExplosion => cost_explosion_template(run),
        FailureType::ContextFailure => context_failure_template(run),
        FailureType::Hallucination => hallucination_template(run),
        FailureType::InstructionMisalignment => instruction_misalignment_template(run),
        FailureType::Unclear => unclear_template(run),
    }
}

fn total_cost_line(run: &ReconstructedRun) -> String {
    format!("Total run cost: ${:.2}", run.cost.total_cost_usd)
}

fn control_flow_template(run: &ReconstructedRun) -> ExplanationTemplate {
    if let Some(loop_signal) = run.signals.loops.first() {
        let retry_cost_line = if run.cost.total_cost_usd > 0.0 {
            let retry_share = run.cost.cost_for(StepType::Retry) / run.cost.total_cost_usd * 100.0;
            format!(
                "{}% of cost was consumed during repeated retries.",
                retry_share.round()
            )
        } else {
            "No token costs incurred.".to_string()
        };

        return ExplanationTemplate {
            summary: "The agent entered a retry loop and failed to make progress toward task \
                      completion."
                .to_string(),
            what_happened: vec![
                format!("The agent attempted to call {}.", loop_signal.tool),
                format!("The {} returned {}.", loop_signal.tool, loop_signal.pattern),
                format!(
                    "The agent retried the same call {} times without changing parameters.",
                    loop_signal.repetitions
                ),
            ],
            why_it_failed: vec![
                "Retry logic lacked a termination condition or fallback path.".to_string(),
                "No state change occurred between retries.".to_string(),
            ],
            where_it_failed: format!(
                "Steps {}–{} (tool_call: `{}`).",
                loop_signal.step_ids.first().map(String::as_str).unwrap_or(""),
                loop_signal.step_ids.last().map(String::as_str).unwrap_or(""),
                loop_signal.tool
            ),
            cost_impact: vec![total_cost_line(run), retry_cost_line],
        };
    }

    if let Some(retry) = run.signals.retries.first() {
        let outcome_line = if retry.all_failed {
            "All retry attempts failed with the same error.".to_string()
        } else {
            "Some retries succeeded but overall operation failed.".to_string()
        };
        let location = match &retry.tool {
            Some(tool) => format!(
                "Steps {}–{} (tool: `{}`).",
                retry.start_step_id, retry.end_step_id, tool
            ),
            None => format!("Steps {}–{}.", retry.start_step_id, retry.end_step_id),
        };

        return ExplanationTemplate {
            summary: "The agent entered a retry sequence and failed to make progress.".to_string(),
            what_happened: vec![
                "The agent attempted an operation that failed.".to_string(),
                format!("The agent retried {} times.", retry.count),
                outcome_line,
            ],
            why_it_failed: vec![
                "Retry logic did not include sufficient error handling.".to_string(),
                "No fallback strategy was defined.".to_string(),
            ],
            where_it_failed: location,
            cost_impact: vec![
                total_cost_line(run),
                format!("{} retry attempts were made.", retry.count),
            ],
        };
    }

    // Reachable only when the template is requested for a run without
    // control-flow signals.
    unclear_template(run)
}

fn tool_failure_template(run: &ReconstructedRun) -> ExplanationTemplate {
    let failures = &run.signals.tool_failures;
    let Some(primary) = failures.first() else {
        return unclear_template(run);
    };
    let total_failures: usize = failures.iter().map(|f| f.failure_count).sum();

    let mut what_happened = vec![
        if failures.len() == 1 {
            "The agent attempted to use a tool.".to_string()
        } else {
            format!("The agent attempted to use {} different tools.", failures.len())
        },
        format!(
            "Tool {} failed {} time(s).",
            primary.tool, primary.failure_count
        ),
    ];
    if total_failures > primary.failure_count {
        what_happened.push(format!(
            "Additional {} failure(s) occurred in other tools.",
            total_failures - primary.failure_count
        ));
    }

    let error_detail = if run.signals.errors.is_empty() {
        "No error details captured.".to_string()
    } else {
        let types: Vec<&str> = run
            .signals
            .errors
            .iter()
            .map(|e| e.error_type.as_str())
            .collect();
        format!("Error types: {}", types.join(", "))
    };

    ExplanationTemplate {
        summary: "The agent encountered tool execution failures that prevented task completion."
            .to_string(),
        what_happened,
        why_it_failed: vec![
            "Tool calls returned errors or timeouts.".to_string(),
            error_detail,
        ],
        where_it_failed: format!(
            "Steps {} (tool_call: `{}`).",
            primary.step_ids.join(", "),
            primary.tool
        ),
        cost_impact: vec![
            total_cost_line(run),
            format!("{total_failures} failed tool calls."),
        ],
    }
}

fn cost_explosion_template(run: &ReconstructedRun) -> ExplanationTemplate {
    let most_expensive = run.cost.most_expensive_step.as_ref();
    let llm_cost = run.cost.cost_for(StepType::LlmCall);
    let llm_percentage = if run.cost.total_cost_usd > 0.0 {
        llm_cost / run.cost.total_cost_usd * 100.0
    } else {
        0.0
    };

    let mut what_happened = vec![
        format!(
            "The agent successfully {} the task.",
            if run.status == RunStatus::Complete {
                "completed"
            } else {
                "attempted"
            }
        ),
        if run.timeline.step_count > 5 {
            "Multiple intermediate reasoning steps were executed.".to_string()
        } else {
            "The agent made several LLM calls.".to_string()
        },
    ];
    if let Some(step) = most_expensive {
        what_happened.push(format!(
            "Step {} was the most expensive at ${:.4}.",
            step.step_id, step.cost_usd
        ));
    }

    let mut cost_impact = vec![total_cost_line(run)];
    if run.cost.total_tokens > 0 {
        cost_impact.push(format!(
            "Total tokens used: {} ({} prompt + {} completion)",
            run.cost.total_tokens, run.cost.prompt_tokens, run.cost.completion_tokens
        ));
    }
    if llm_percentage > 0.0 {
        cost_impact.push(format!(
            "{:.0}% of cost was LLM calls.",
            llm_percentage
        ));
    }

    ExplanationTemplate {
        summary: "The agent completed the task but used significantly more tokens than expected."
            .to_string(),
        what_happened,
        why_it_failed: vec![
            if llm_percentage > 80.0 {
                "The agent was configured with verbose reasoning enabled.".to_string()
            } else {
                "Multiple LLM calls with overlapping prompts.".to_string()
            },
            "No cost guardrails or early-stop conditions were defined.".to_string(),
        ],
        where_it_failed: match most_expensive {
            Some(step) => format!("Step {} and related LLM calls.", step.step_id),
            None => {
                let leading: Vec<&str> = run
                    .timeline
                    .steps
                    .iter()
                    .take(3)
                    .map(|s| s.step_id.as_str())
                    .collect();
                format!("Steps {}.", leading.join(", "))
            }
        },
        cost_impact,
    }
}

fn context_failure_template(run: &ReconstructedRun) -> ExplanationTemplate {
    ExplanationTemplate {
        summary: "The agent failed due to missing, outdated, or incorrect context.".to_string(),
        what_happened: vec![
            "The agent attempted to use context or memory.".to_string(),
            "The context was incomplete or incorrect.".to_string(),
        ],
        why_it_failed: vec![
            "RAG retrieval may have failed or returned irrelevant results.".to_string(),
            "Memory state was not properly maintained.".to_string(),
        ],
        where_it_failed: match run.signals.errors.first() {
            Some(error) => format!("Step {}.", error.step_id),
            None => "Context issues detected.".to_string(),
        },
        cost_impact: vec![total_cost_line(run)],
    }
}

fn hallucination_template(run: &ReconstructedRun) -> ExplanationTemplate {
    ExplanationTemplate {
        summary: "The agent produced an answer that appeared confident but was not supported by \
                  verified data."
            .to_string(),
        what_happened: vec![
            "The agent generated a response.".to_string(),
            "The response contained unverified or fabricated information.".to_string(),
        ],
        why_it_failed: vec![
            "The agent did not verify the answer against available sources.".to_string(),
            "Retrieved context did not contain the required information.".to_string(),
        ],
        where_it_failed: "LLM generation steps (requires verification).".to_string(),
        cost_impact: vec![total_cost_line(run)],
    }
}

fn instruction_misalignment_template(run: &ReconstructedRun) -> ExplanationTemplate {
    ExplanationTemplate {
        summary: "The agent followed instructions literally but produced incorrect results."
            .to_string(),
        what_happened: vec![
            "The agent executed the task according to provided instructions.".to_string(),
            "The output did not match expected behavior.".to_string(),
        ],
        why_it_failed: vec![
            "Conflicting instructions from system and user prompts.".to_string(),
            "Ambiguous task definition.".to_string(),
        ],
        where_it_failed: "Instruction interpretation layer.".to_string(),
        cost_impact: vec![total_cost_line(run)],
    }
}

fn unclear_template(run: &ReconstructedRun) -> ExplanationTemplate {
    let has_errors = !run.signals.errors.is_empty();

    ExplanationTemplate {
        summary: if has_errors {
            "The agent encountered errors but the failure pattern is unclear.".to_string()
        } else {
            "No clear failure detected - the run may have completed successfully.".to_string()
        },
        what_happened: if has_errors {
            vec![
                format!("The agent executed {} steps.", run.timeline.step_count),
                format!("{} error(s) occurred.", run.signals.errors.len()),
            ]
        } else {
            vec![
                format!("The agent executed {} steps.", run.timeline.step_count),
                "The run completed without obvious failures.".to_string(),
            ]
        },
        why_it_failed: if has_errors {
            vec!["Error signals were detected but do not match known failure patterns.".to_string()]
        } else {
            vec!["No failure signals detected.".to_string()]
        },
        where_it_failed: if has_errors {
            let step_ids: Vec<&str> = run
                .signals
                .errors
                .iter()
                .map(|e| e.step_id.as_str())
                .collect();
            format!("Error in step(s): {}", step_ids.join(", "))
        } else {
            "N/A".to_string()
        },
        cost_impact: vec![total_cost_line(run)],
    }
}
