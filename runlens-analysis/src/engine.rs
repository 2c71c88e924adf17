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

//! Post-mortem generation.
//!
//! Classifies a reconstructed run, builds the matching explanation
//! template, and optionally polishes it with the configured rewriter.
//! Generation is infallible: a rewriter error downgrades to the template
//! rendering and never changes the classification.

use chrono::Utc;
use runlens_core::{PostMortem, ReconstructedRun, ReconstructionConfig};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::classifier::classify_failure;
use crate::rewriter::{ExplanationRewriter, NoopRewriter, OpenAiRewriter, RewriteContext};
use crate::templates::build_template;

pub struct ExplanationEngine {
    config: ReconstructionConfig,
    rewriter: Arc<dyn ExplanationRewriter>,
}

impl ExplanationEngine {
    /// Selects the rewriter from `config.llm_polishing`. Polishing is
    /// only enabled when an API key is also present.
    pub fn new(config: ReconstructionConfig) -> Self {
        let rewriter: Arc<dyn ExplanationRewriter> =
            if config.llm_polishing && config.openai_api_key.is_some() {
                Arc::new(OpenAiRewriter::new(&config))
            } else {
                Arc::new(NoopRewriter)
            };
        Self { config, rewriter }
    }

    pub fn with_rewriter(
        config: ReconstructionConfig,
        rewriter: Arc<dyn ExplanationRewriter>,
    ) -> Self {
        Self { config, rewriter }
    }

    /// Produce the post-mortem for a reconstructed run.
    pub async fn generate(&self, run: &ReconstructedRun) -> PostMortem {
        let classification = classify_failure(&run.signals, &run.cost, &self.config);
        debug!(
            run_id = %run.metadata.run_id,
            failure_type = ?classification.primary_type,
            confidence = classification.confidence,
            "classified run"
        );

        let template = build_template(classification.primary_type, run);
        let context = RewriteContext {
            agent_name: run.metadata.agent_name.clone(),
            framework: run.metadata.framework,
        };

        let explanation = match self.rewriter.rewrite(&template, &context).await {
            Ok(text) => text,
            Err(err) => {
                warn!(
                    run_id = %run.metadata.run_id,
                    error = %err,
                    "explanation rewrite failed, using template rendering"
                );
                template.to_markdown()
            }
        };

        PostMortem {
            classification,
            explanation,
            generated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::aggregate_cost;
    use crate::rewriter::RewriteError;
    use crate::signals::extract_signals;
    use crate::templates::ExplanationTemplate;
    use crate::timeline::build_timeline;
    use async_trait::async_trait;
    use runlens_core::{
        FailureType, Framework, RunMetadata, RunStatus, StepEvent, StepStatus, StepType,
    };

    struct FailingRewriter;

    #[async_trait]
    impl ExplanationRewriter for FailingRewriter {
        async fn rewrite(
            &self,
            _template: &ExplanationTemplate,
            _context: &RewriteContext,
        ) -> Result<String, RewriteError> {
            Err(RewriteError::Api("boom".to_string()))
        }
    }

    fn looping_run() -> ReconstructedRun {
        let metadata = RunMetadata {
            run_id: "run-1".to_string(),
            agent_name: "researcher".to_string(),
            framework: Framework::Langchain,
            started_at: "2025-06-01T12:00:00Z".parse().unwrap(),
            ended_at: Some("2025-06-01T12:01:00Z".parse().unwrap()),
            environment: None,
            tags: None,
        };
        let steps: Vec<StepEvent> = (1..=3)
            .map(|i| StepEvent {
                step_id: format!("s{i}"),
                run_id: "run-1".to_string(),
                step_type: StepType::ToolCall,
                timestamp: format!("2025-06-01T12:00:{i:02}Z").parse().unwrap(),
                model: None,
                tool_name: Some("search_api".to_string()),
                status: Some(StepStatus::Error),
                error_type: Some("timeout".to_string()),
                latency_ms: None,
                tokens_prompt: None,
                tokens_completion: None,
                cost_usd: Some(0.01),
            })
            .collect();
        let config = ReconstructionConfig::default();
        ReconstructedRun {
            timeline: build_timeline(&metadata, &steps),
            signals: extract_signals(&steps, &config),
            cost: aggregate_cost(&steps),
            status: RunStatus::Failed,
            post_mortem: None,
            metadata,
            steps,
        }
    }

    #[tokio::test]
    async fn test_generate_uses_template_without_polishing() {
        let engine = ExplanationEngine::new(ReconstructionConfig::default());
        let post_mortem = engine.generate(&looping_run()).await;

        assert_eq!(
            post_mortem.classification.primary_type,
            FailureType::ControlFlowFailure
        );
        assert!(post_mortem.explanation.contains("**Summary:**"));
        assert!(post_mortem.explanation.contains("**Cost impact:**"));
    }

    #[tokio::test]
    async fn test_rewriter_failure_falls_back_to_template() {
        let engine = ExplanationEngine::with_rewriter(
            ReconstructionConfig::default(),
            Arc::new(FailingRewriter),
        );
        let post_mortem = engine.generate(&looping_run()).await;

        assert_eq!(
            post_mortem.classification.primary_type,
            FailureType::ControlFlowFailure
        );
        assert!(post_mortem.explanation.contains("**Summary:**"));
    }

    #[test]
    fn test_polishing_disabled_without_api_key() {
        let config = ReconstructionConfig {
            llm_polishing: true,
            openai_api_key: None,
            ..Default::default()
        };
        // Construction must not panic and must fall back to the noop path.
        let _engine = ExplanationEngine::new(config);
    }
}
