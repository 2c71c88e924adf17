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

//! Reconstruction configuration
//!
//! All thresholds are static: constructed once at process start from the
//! environment and passed by reference into every component. No component
//! reads ambient environment state directly, which keeps every detector
//! and classifier rule unit-testable with arbitrary thresholds.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Default number of attempts that makes a retry sequence reportable
/// (a sequence of `retry_threshold - 1` consecutive retries is reported).
pub const DEFAULT_RETRY_THRESHOLD: usize = 3;

/// Default minimum group size (and repeated-error count) for a loop.
pub const DEFAULT_LOOP_THRESHOLD: usize = 3;

/// Default floor for the latency spike threshold, in milliseconds.
pub const DEFAULT_LATENCY_SPIKE_MS: u64 = 5_000;

/// Default inactivity window after which an unended run is `incomplete`.
pub const DEFAULT_INCOMPLETE_RUN_TIMEOUT_MS: u64 = 3_600_000;

/// Default total-cost threshold for the cost-explosion classification.
pub const DEFAULT_HIGH_COST_THRESHOLD_USD: f64 = 0.50;

/// Default per-call timeout for the prose-polishing collaborator.
pub const DEFAULT_REWRITE_TIMEOUT_MS: u64 = 10_000;

/// Static thresholds and collaborator settings for run reconstruction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconstructionConfig {
    pub retry_threshold: usize,
    pub loop_threshold: usize,
    pub latency_spike_ms: u64,
    pub incomplete_run_timeout_ms: u64,
    pub high_cost_threshold_usd: f64,

    /// When false the explanation renderer uses the deterministic template
    /// serialization without calling the external rewriter.
    pub llm_polishing: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_max_tokens: u32,
    pub openai_temperature: f64,
    pub rewrite_timeout_ms: u64,
}

impl Default for ReconstructionConfig {
    fn default() -> Self {
        Self {
            retry_threshold: DEFAULT_RETRY_THRESHOLD,
            loop_threshold: DEFAULT_LOOP_THRESHOLD,
            latency_spike_ms: DEFAULT_LATENCY_SPIKE_MS,
            incomplete_run_timeout_ms: DEFAULT_INCOMPLETE_RUN_TIMEOUT_MS,
            high_cost_threshold_usd: DEFAULT_HIGH_COST_THRESHOLD_USD,
            llm_polishing: false,
            openai_api_key: None,
            openai_model: "gpt-4-turbo".to_string(),
            openai_max_tokens: 500,
            openai_temperature: 0.3,
            rewrite_timeout_ms: DEFAULT_REWRITE_TIMEOUT_MS,
        }
    }
}

impl ReconstructionConfig {
    /// Build a config from process environment variables.
    ///
    /// Unset variables fall back to defaults; malformed values are a fatal
    /// error here rather than a per-request failure later.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. Tests inject a map
    /// here instead of mutating process environment state.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = parse_var(&lookup, "RUNLENS_RETRY_THRESHOLD")? {
            require_positive("RUNLENS_RETRY_THRESHOLD", v)?;
            config.retry_threshold = v;
        }
        if let Some(v) = parse_var(&lookup, "RUNLENS_LOOP_THRESHOLD")? {
            require_positive("RUNLENS_LOOP_THRESHOLD", v)?;
            config.loop_threshold = v;
        }
        if let Some(v) = parse_var(&lookup, "RUNLENS_LATENCY_SPIKE_MS")? {
            config.latency_spike_ms = v;
        }
        if let Some(v) = parse_var(&lookup, "RUNLENS_INCOMPLETE_RUN_TIMEOUT_MS")? {
            config.incomplete_run_timeout_ms = v;
        }
        if let Some(v) = parse_var::<f64, _>(&lookup, "RUNLENS_HIGH_COST_THRESHOLD_USD")? {
            if !v.is_finite() || v < 0.0 {
                return Err(ConfigError::NonPositive {
                    key: "RUNLENS_HIGH_COST_THRESHOLD_USD",
                    value: v.to_string(),
                });
            }
            config.high_cost_threshold_usd = v;
        }
        if let Some(v) = parse_var(&lookup, "RUNLENS_LLM_POLISHING")? {
            config.llm_polishing = v;
        }
        if let Some(v) = lookup("RUNLENS_OPENAI_API_KEY") {
            if !v.is_empty() {
                config.openai_api_key = Some(v);
            }
        }
        if let Some(v) = lookup("RUNLENS_OPENAI_MODEL") {
            if !v.is_empty() {
                config.openai_model = v;
            }
        }
        if let Some(v) = parse_var(&lookup, "RUNLENS_OPENAI_MAX_TOKENS")? {
            config.openai_max_tokens = v;
        }
        if let Some(v) = parse_var::<f64, _>(&lookup, "RUNLENS_OPENAI_TEMPERATURE")? {
            if !v.is_finite() {
                return Err(ConfigError::InvalidValue {
                    key: "RUNLENS_OPENAI_TEMPERATURE",
                    value: v.to_string(),
                    message: "must be a finite number".to_string(),
                });
            }
            config.openai_temperature = v;
        }
        if let Some(v) = parse_var(&lookup, "RUNLENS_REWRITE_TIMEOUT_MS")? {
            require_positive("RUNLENS_REWRITE_TIMEOUT_MS", v)?;
            config.rewrite_timeout_ms = v;
        }

        Ok(config)
    }
}

fn parse_var<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                key,
                value: raw,
                message: e.to_string(),
            }),
    }
}

fn require_positive<T>(key: &'static str, value: T) -> Result<(), ConfigError>
where
    T: PartialOrd + Default + std::fmt::Display,
{
    if value <= T::default() {
        return Err(ConfigError::NonPositive {
            key,
            value: value.to_string(),
        });
    }
    Ok(())
}
