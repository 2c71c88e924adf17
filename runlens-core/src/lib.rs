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

//! Runlens Core
//!
//! Fundamental data structures for agent-run telemetry: step events, run
//! metadata, derived signals, cost summaries, and the failure taxonomy.

pub mod classification;
pub mod config;
pub mod cost;
pub mod error;
pub mod run;
pub mod signal;

pub use classification::{FailureClassification, FailureType, PostMortem};
pub use config::ReconstructionConfig;
pub use cost::{CostSummary, MostExpensiveStep};
pub use error::ConfigError;
pub use run::{
    Environment, Framework, ReconstructedRun, RunMetadata, RunStatus, StepEvent, StepStatus,
    StepType, Timeline, TimelineStep,
};
pub use signal::{
    ErrorSeverity, ErrorSignal, FailureSignals, LatencySignal, LoopSignal, RetrySignal,
    ToolFailureSignal,
};
