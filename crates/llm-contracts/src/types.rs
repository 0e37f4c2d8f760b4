// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Anthropic,
    #[serde(rename = "openai")]
    OpenAI,
    Custom(String),
}

impl Provider {
    /// Infers the backend from a model id. Unrecognised ids map to `Custom`,
    /// which the gateway serves through its mock client.
    pub fn for_model(model: &str) -> Self {
        let lowered = model.trim().to_lowercase();
        if lowered.starts_with("claude") {
            Provider::Anthropic
        } else if lowered.starts_with("gpt")
            || lowered.starts_with("o1")
            || lowered.starts_with("o3")
            || lowered.starts_with("o4")
        {
            Provider::OpenAI
        } else {
            Provider::Custom(lowered)
        }
    }

    /// Inclusive temperature range accepted by the provider's API.
    pub fn temperature_range(&self) -> (f32, f32) {
        match self {
            Provider::Anthropic => (0.0, 1.0),
            Provider::OpenAI | Provider::Custom(_) => (0.0, 2.0),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Provider::Anthropic => "anthropic",
            Provider::OpenAI => "openai",
            Provider::Custom(name) => name,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for Provider {
    fn from(s: String) -> Self {
        match s.as_str() {
            "anthropic" => Provider::Anthropic,
            "openai" => Provider::OpenAI,
            _ => Provider::Custom(s),
        }
    }
}

#[derive(Debug, Error)]
pub enum LLMError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Rate limit exceeded")]
    RateLimit,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Serialisation error: {0}")]
    Serialisation(String),

    #[error("Timeout error")]
    Timeout,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl LLMError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, LLMError::Timeout)
    }
}

pub type LLMResult<T> = Result<T, LLMError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_inference() {
        assert_eq!(Provider::for_model("claude-3-5-haiku-latest"), Provider::Anthropic);
        assert_eq!(Provider::for_model("gpt-4o-mini"), Provider::OpenAI);
        assert_eq!(Provider::for_model("o3-mini"), Provider::OpenAI);
        assert_eq!(
            Provider::for_model("Gemini-1.5-Flash"),
            Provider::Custom("gemini-1.5-flash".to_string())
        );
    }

    #[test]
    fn test_temperature_ranges() {
        assert_eq!(Provider::Anthropic.temperature_range(), (0.0, 1.0));
        assert_eq!(Provider::OpenAI.temperature_range(), (0.0, 2.0));
    }
}
