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

//! Run analysis pipeline: signal extraction, cost aggregation, status
//! resolution, failure classification, and post-mortem generation over
//! telemetry loaded through a [`store::RunStore`].

pub mod classifier;
pub mod cost;
pub mod engine;
pub mod reconstructor;
pub mod rewriter;
pub mod signals;
pub mod status;
pub mod store;
pub mod templates;
pub mod timeline;

pub use classifier::classify_failure;
pub use cost::aggregate_cost;
pub use engine::ExplanationEngine;
pub use reconstructor::{ReconstructError, Reconstructor};
pub use rewriter::{ExplanationRewriter, NoopRewriter, OpenAiRewriter, RewriteContext};
pub use signals::extract_signals;
pub use status::{resolve_status, resolve_status_now};
pub use store::{MemoryStore, RunStore, StoreError};
pub use templates::{build_template, ExplanationTemplate};
pub use timeline::build_timeline;
