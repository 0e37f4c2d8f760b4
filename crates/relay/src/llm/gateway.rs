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

use llm_contracts::{GatewayConfig, Generation, LLMResult, ModelSettings, Provider, ProviderRequest};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::providers::{AnthropicClient, ApiClient, MockClient, OpenAIClient};

/// Routes a variation's prompt to the backend its model belongs to. Providers
/// without a configured client are answered by [`MockClient`].
pub struct Gateway {
    clients: HashMap<Provider, Arc<dyn ApiClient>>,
    mock: Arc<dyn ApiClient>,
}

impl Gateway {
    pub fn from_config(config: &GatewayConfig) -> LLMResult<Self> {
        let mut gateway = Self::mock_only();

        if let Some(api_key) = config.anthropic.api_key() {
            let client = AnthropicClient::new(
                api_key.to_string(),
                config.anthropic.endpoint.clone(),
                Some(config.anthropic_version.clone()),
                Some(config.timeout_seconds),
            )?;
            gateway = gateway.with_client(Provider::Anthropic, Arc::new(client));
            info!("Created Anthropic client");
        } else {
            warn!("ANTHROPIC_API_KEY not found, Anthropic models will use mock responses");
        }

        if let Some(api_key) = config.openai.api_key() {
            let client = OpenAIClient::new(
                api_key.to_string(),
                config.openai.endpoint.clone(),
                Some(config.timeout_seconds),
            )?;
            gateway = gateway.with_client(Provider::OpenAI, Arc::new(client));
            info!("Created OpenAI client");
        } else {
            warn!("OPENAI_API_KEY not found, OpenAI models will use mock responses");
        }

        Ok(gateway)
    }

    pub fn mock_only() -> Self {
        Self {
            clients: HashMap::new(),
            mock: Arc::new(MockClient::new()),
        }
    }

    pub fn with_client(mut self, provider: Provider, client: Arc<dyn ApiClient>) -> Self {
        self.clients.insert(provider, client);
        self
    }

    pub fn has_credentials(&self, provider: &Provider) -> bool {
        self.clients.contains_key(provider)
    }

    /// The exact text sent as the user turn for a prompt and optional context.
    pub fn compose_prompt(prompt: &str, context: Option<&str>) -> String {
        match context.map(str::trim).filter(|c| !c.is_empty()) {
            Some(context) => format!("Context:\n{context}\n\n{prompt}"),
            None => prompt.to_string(),
        }
    }

    pub async fn generate(
        &self,
        settings: &ModelSettings,
        prompt: &str,
        context: Option<&str>,
    ) -> LLMResult<Generation> {
        let provider = settings.resolved_provider();
        let (client, mocked) = match self.clients.get(&provider) {
            Some(client) => (client.clone(), false),
            None => (self.mock.clone(), true),
        };

        let request = ProviderRequest::from_settings(settings, &Self::compose_prompt(prompt, context));
        debug!(
            model = %settings.model,
            provider = %provider,
            mocked,
            tools = request.tools.len(),
            "Dispatching generation request"
        );

        let started = Instant::now();
        let response = client.send_request(request).await?;
        let latency_ms = started.elapsed().as_millis() as u64;

        Ok(Generation {
            text: response.content,
            function_call: response.function_call,
            usage: response.usage,
            finish_reason: response.finish_reason,
            latency_ms,
            model: response.model,
            provider: client.provider_name().to_string(),
            mocked,
        })
    }
}
