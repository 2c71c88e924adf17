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

//! Core error types

use thiserror::Error;

/// Configuration errors are fatal at startup, never per-request.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {message}")]
    InvalidValue {
        key: &'static str,
        value: String,
        message: String,
    },

    #[error("{key} must be positive, got {value}")]
    NonPositive { key: &'static str, value: String },
}
