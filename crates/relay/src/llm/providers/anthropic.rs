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
use llm_contracts::{
    FunctionCallPayload, LLMError, LLMResult, ProviderRequest, ProviderResponse, ToolChoice, Usage,
};
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{error_for_status, ApiClient};

#[derive(Debug, Clone)]
pub struct AnthropicClient {
    client: Client,
    api_key: String,
    endpoint: String,
    api_version: String,
    timeout: Duration,
}

impl AnthropicClient {
    pub fn new(
        api_key: String,
        endpoint: Option<String>,
        api_version: Option<String>,
        timeout_seconds: Option<u64>,
    ) -> LLMResult<Self> {
        let timeout = Duration::from_secs(timeout_seconds.unwrap_or(30));
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LLMError::Configuration(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            endpoint: endpoint
                .unwrap_or_else(|| "https://api.anthropic.com/v1/messages".to_string()),
            api_version: api_version.unwrap_or_else(|| "2023-06-01".to_string()),
            timeout,
        })
    }

    fn build_anthropic_payload(&self, request: &ProviderRequest) -> Value {
        let mut system_content = Vec::new();
        let mut regular_messages = Vec::new();

        for msg in &request.messages {
            if msg.role == "system" {
                system_content.push(msg.content.clone());
            } else {
                regular_messages.push(json!({
                    "role": msg.role,
                    "content": msg.content
                }));
            }
        }

        let mut payload = json!({
            "model": request.model,
            "messages": regular_messages,
            "max_tokens": request.max_tokens.unwrap_or(4096)
        });

        if !system_content.is_empty() {
            payload["system"] = json!(system_content.join("\n\n"));
        }
        if let Some(temperature) = request.temperature {
            payload["temperature"] = json!(temperature);
        }
        if let Some(top_p) = request.top_p {
            payload["top_p"] = json!(top_p);
        }
        if let Some(top_k) = request.top_k {
            payload["top_k"] = json!(top_k);
        }

        if !request.tools.is_empty() {
            payload["tools"] = request
                .tools
                .iter()
                .map(|tool| {
                    json!({
                        "name": tool.name,
                        "description": tool.description,
                        "input_schema": tool.parameters
                    })
                })
                .collect::<Vec<_>>()
                .into();
            payload["tool_choice"] = match request.tool_choice {
                ToolChoice::Required => json!({ "type": "any" }),
                ToolChoice::Auto => json!({ "type": "auto" }),
                ToolChoice::None => json!({ "type": "none" }),
            };
        }

        for (key, value) in &request.provider_specific {
            payload[key] = value.clone();
        }

        payload
    }

    fn parse_anthropic_response(
        &self,
        response_data: Value,
        model: String,
    ) -> LLMResult<ProviderResponse> {
        let blocks = response_data["content"].as_array().ok_or_else(|| {
            LLMError::Provider("Anthropic response has no content blocks".to_string())
        })?;

        let mut text_parts = Vec::new();
        let mut function_call = None;
        for block in blocks {
            match block["type"].as_str() {
                Some("text") => {
                    if let Some(text) = block["text"].as_str() {
                        text_parts.push(text.to_string());
                    }
                }
                Some("tool_use") if function_call.is_none() => {
                    let name = block["name"].as_str().ok_or_else(|| {
                        LLMError::Provider("Anthropic tool_use block without a name".to_string())
                    })?;
                    function_call = Some(FunctionCallPayload {
                        name: name.to_string(),
                        arguments: block.get("input").cloned().unwrap_or_else(|| json!({})),
                    });
                }
                _ => {}
            }
        }

        if text_parts.is_empty() && function_call.is_none() {
            return Err(LLMError::Provider(
                "Failed to extract content from Anthropic response".to_string(),
            ));
        }

        let usage = response_data.get("usage").map(|usage_data| {
            Usage::new(
                usage_data["input_tokens"].as_u64().unwrap_or(0) as u32,
                usage_data["output_tokens"].as_u64().unwrap_or(0) as u32,
            )
        });

        let finish_reason = response_data["stop_reason"].as_str().map(|s| s.to_string());

        Ok(ProviderResponse {
            content: text_parts.join("\n"),
            model,
            function_call,
            usage,
            finish_reason,
            raw_response: response_data,
        })
    }

    async fn execute_request(&self, payload: Value) -> LLMResult<Value> {
        debug!(endpoint = %self.endpoint, "Sending request to Anthropic API");

        let response = tokio::time::timeout(
            self.timeout,
            self.client
                .post(&self.endpoint)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", &self.api_version)
                .header("content-type", "application/json")
                .json(&payload)
                .send(),
        )
        .await;

        match response {
            Ok(Ok(resp)) => {
                let status = resp.status();
                info!("Received response from Anthropic API: {}", status);

                if status.is_success() {
                    resp.json::<Value>().await.map_err(|e| {
                        LLMError::Serialisation(format!("Failed to parse JSON response: {e}"))
                    })
                } else {
                    let body = resp
                        .text()
                        .await
                        .unwrap_or_else(|e| format!("failed to read error body: {e}"));
                    Err(error_for_status("Anthropic", status, body))
                }
            }
            Ok(Err(e)) if e.is_timeout() => Err(LLMError::Timeout),
            Ok(Err(e)) => Err(LLMError::Network(format!("Request failed: {e}"))),
            Err(_) => {
                warn!(
                    "Request to Anthropic API timed out after {} seconds",
                    self.timeout.as_secs()
                );
                Err(LLMError::Timeout)
            }
        }
    }
}

#[async_trait]
impl ApiClient for AnthropicClient {
    async fn send_request(&self, request: ProviderRequest) -> LLMResult<ProviderResponse> {
        let payload = self.build_anthropic_payload(&request);
        let response_data = self.execute_request(payload).await?;
        self.parse_anthropic_response(response_data, request.model)
    }

    fn provider_name(&self) -> &'static str {
        "anthropic"
    }
}
