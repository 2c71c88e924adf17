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

//! Optional LLM polishing of explanation text.
//!
//! The rewriter turns a structured template into natural prose. Rewriting
//! is strictly cosmetic: callers must treat any error as a signal to fall
//! back to the template's own markdown rendering, never as a failure of
//! the post-mortem itself.

use async_trait::async_trait;
use runlens_core::{Framework, ReconstructionConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::templates::ExplanationTemplate;

const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

/// Run context passed alongside the template so the rewriter can refer
/// to the agent by name.
#[derive(Debug, Clone)]
pub struct RewriteContext {
    pub agent_name: String,
    pub framework: Framework,
}

#[derive(Debug, Error)]
pub enum RewriteError {
    #[error("rewrite request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("rewrite API error: {0}")]
    Api(String),
    #[error("rewrite returned an empty response")]
    EmptyResponse,
    #[error("rewrite timed out after {0}ms")]
    Timeout(u64),
}

/// Polishes explanation templates into prose.
#[async_trait]
pub trait ExplanationRewriter: Send + Sync {
    async fn rewrite(
        &self,
        template: &ExplanationTemplate,
        context: &RewriteContext,
    ) -> Result<String, RewriteError>;
}

/// Rewriter that performs no polishing and returns the template's own
/// markdown rendering. Used when polishing is disabled.
#[derive(Debug, Default)]
pub struct NoopRewriter;

#[async_trait]
impl ExplanationRewriter for NoopRewriter {
    async fn rewrite(
        &self,
        template: &ExplanationTemplate,
        _context: &RewriteContext,
    ) -> Result<String, RewriteError> {
        Ok(template.to_markdown())
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f64,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: Option<ApiErrorDetail>,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Rewriter backed by the OpenAI chat completions API.
pub struct OpenAiRewriter {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f64,
    timeout_ms: u64,
}

impl OpenAiRewriter {
    pub fn new(config: &ReconstructionConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: OPENAI_API_BASE.to_string(),
            api_key: config.openai_api_key.clone().unwrap_or_default(),
            model: config.openai_model.clone(),
            max_tokens: config.openai_max_tokens,
            temperature: config.openai_temperature,
            timeout_ms: config.rewrite_timeout_ms,
        }
    }

    /// Point the rewriter at a different API host. Intended for tests.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn build_prompt(template: &ExplanationTemplate, context: &RewriteContext) -> String {
        format!(
            "You are rewriting a structured failure analysis of an AI agent run into clear, \
             natural prose for an engineer. Preserve every fact, number, step identifier, and \
             dollar amount exactly. Do not speculate beyond the provided analysis.\n\n\
             Agent: {} ({})\n\n\
             Structured analysis:\n{}\n\n\
             Rewrite this as flowing prose with the same five sections.",
            context.agent_name,
            context.framework,
            template.to_markdown()
        )
    }

    async fn send(&self, prompt: &str) -> Result<String, RewriteError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body: ApiErrorBody = response.json().await.unwrap_or(ApiErrorBody { error: None });
            let detail = body
                .error
                .map(|e| e.message)
                .unwrap_or_else(|| format!("HTTP {status}"));
            return Err(RewriteError::Api(detail));
        }

        let body: ChatResponse = response.json().await?;
        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(RewriteError::EmptyResponse)
    }
}

#[async_trait]
impl ExplanationRewriter for OpenAiRewriter {
    async fn rewrite(
        &self,
        template: &ExplanationTemplate,
        context: &RewriteContext,
    ) -> Result<String, RewriteError> {
        let prompt = Self::build_prompt(template, context);
        let deadline = Duration::from_millis(self.timeout_ms);

        match tokio::time::timeout(deadline, self.send(&prompt)).await {
            Ok(result) => result,
            Err(_) => Err(RewriteError::Timeout(self.timeout_ms)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template() -> ExplanationTemplate {
        ExplanationTemplate {
            summary: "The agent entered a retry loop.".to_string(),
            what_happened: vec!["The agent attempted to call search_api.".to_string()],
            why_it_failed: vec!["Retry logic lacked a termination condition.".to_string()],
            where_it_failed: "Steps s1–s3 (tool_call: `search_api`).".to_string(),
            cost_impact: vec!["Total run cost: $0.45".to_string()],
        }
    }

    fn context() -> RewriteContext {
        RewriteContext {
            agent_name: "researcher".to_string(),
            framework: Framework::Langchain,
        }
    }

    fn test_config() -> ReconstructionConfig {
        ReconstructionConfig {
            openai_api_key: Some("test-key".to_string()),
            rewrite_timeout_ms: 2_000,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_noop_rewriter_returns_markdown() {
        let template = template();
        let text = NoopRewriter
            .rewrite(&template, &context())
            .await
            .unwrap();
        assert_eq!(text, template.to_markdown());
    }

    #[tokio::test]
    async fn test_openai_rewriter_returns_polished_text() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer test-key")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"choices":[{"message":{"content":"The researcher agent got stuck retrying search_api."}}]}"#,
            )
            .create_async()
            .await;

        let rewriter = OpenAiRewriter::new(&test_config()).with_base_url(server.url());
        let text = rewriter.rewrite(&template(), &context()).await.unwrap();

        mock.assert_async().await;
        assert!(text.contains("search_api"));
    }

    #[tokio::test]
    async fn test_openai_rewriter_surfaces_api_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(429)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":{"message":"rate limited"}}"#)
            .create_async()
            .await;

        let rewriter = OpenAiRewriter::new(&test_config()).with_base_url(server.url());
        let err = rewriter.rewrite(&template(), &context()).await.unwrap_err();

        assert!(matches!(err, RewriteError::Api(msg) if msg == "rate limited"));
    }

    #[tokio::test]
    async fn test_openai_rewriter_rejects_empty_content() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[{"message":{"content":"   "}}]}"#)
            .create_async()
            .await;

        let rewriter = OpenAiRewriter::new(&test_config()).with_base_url(server.url());
        let err = rewriter.rewrite(&template(), &context()).await.unwrap_err();

        assert!(matches!(err, RewriteError::EmptyResponse));
    }
}
