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

pub mod anthropic;
pub mod mock;
pub mod openai;

use async_trait::async_trait;
use llm_contracts::{LLMError, ProviderRequest, ProviderResponse, LLMResult};
use reqwest::StatusCode;

#[async_trait]
pub trait ApiClient: Send + Sync {
    async fn send_request(&self, request: ProviderRequest) -> LLMResult<ProviderResponse>;

    fn provider_name(&self) -> &'static str;
}

pub(crate) fn error_for_status(provider: &str, status: StatusCode, body: String) -> LLMError {
    match status.as_u16() {
        401 | 403 => LLMError::Authentication(format!("{provider} API rejected credentials: {body}")),
        429 => LLMError::RateLimit,
        _ => LLMError::Provider(format!("{provider} API error {status}: {body}")),
    }
}

pub use anthropic::AnthropicClient;
pub use mock::MockClient;
pub use openai::OpenAIClient;
