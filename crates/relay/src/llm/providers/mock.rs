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

use async_trait::async_trait;
use llm_contracts::{LLMResult, ProviderRequest, ProviderResponse, Usage};
use serde_json::json;

use super::ApiClient;

/// Offline stand-in used whenever a provider has no credential. Replies are a
/// pure function of the request.
#[derive(Debug, Clone, Default)]
pub struct MockClient;

impl MockClient {
    pub fn new() -> Self {
        Self
    }

    pub fn reply_for(model: &str, prompt: &str) -> String {
        format!("[mock:{model}] Simulated response to: {prompt}")
    }

    fn estimate_tokens(text: &str) -> u32 {
        (text.chars().count() as u32).div_ceil(4)
    }
}

#[async_trait]
impl ApiClient for MockClient {
    async fn send_request(&self, request: ProviderRequest) -> LLMResult<ProviderResponse> {
        let prompt = request.user_prompt().to_string();
        let content = Self::reply_for(&request.model, &prompt);
        let prompt_tokens: u32 = request
            .messages
            .iter()
            .map(|m| Self::estimate_tokens(&m.content))
            .sum();
        let usage = Usage::new(prompt_tokens, Self::estimate_tokens(&content));

        Ok(ProviderResponse {
            raw_response: json!({ "mock": true, "model": request.model, "text": content }),
            content,
            model: request.model,
            function_call: None,
            usage: Some(usage),
            finish_reason: Some("mock".to_string()),
        })
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llm_contracts::ModelSettings;

    #[tokio::test]
    async fn test_mock_is_deterministic() {
        let settings = ModelSettings::new("gemini-pro", 0.5);
        let request = ProviderRequest::from_settings(&settings, "Write a haiku");

        let first = MockClient::new().send_request(request.clone()).await.unwrap();
        let second = MockClient::new().send_request(request).await.unwrap();

        assert_eq!(first.content, second.content);
        assert!(first.content.contains("gemini-pro"));
        assert!(first.content.contains("Write a haiku"));
        assert_eq!(first.usage, second.usage);
        assert!(first.function_call.is_none());
    }
}
