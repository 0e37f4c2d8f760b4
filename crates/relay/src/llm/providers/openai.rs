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
use tracing::{debug, warn};

use super::{error_for_status, ApiClient};

#[derive(Debug, Clone)]
pub struct OpenAIClient {
    client: Client,
    api_key: String,
    endpoint: String,
    timeout: Duration,
}

impl OpenAIClient {
    pub fn new(
        api_key: String,
        endpoint: Option<String>,
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
                .unwrap_or_else(|| "https://api.openai.com/v1/chat/completions".to_string()),
            timeout,
        })
    }

    fn build_openai_payload(&self, request: &ProviderRequest) -> Value {
        let mut payload = json!({
            "model": request.model,
            "messages": request.messages.iter().map(|msg| {
                json!({
                    "role": msg.role,
                    "content": msg.content
                })
            }).collect::<Vec<_>>()
        });

        if let Some(max_tokens) = request.max_tokens {
            payload["max_tokens"] = json!(max_tokens);
        }
        if let Some(temperature) = request.temperature {
            payload["temperature"] = json!(temperature);
        }
        if let Some(top_p) = request.top_p {
            payload["top_p"] = json!(top_p);
        }

        if !request.tools.is_empty() {
            payload["tools"] = request
                .tools
                .iter()
                .map(|tool| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": tool.name,
                            "description": tool.description,
                            "parameters": tool.parameters
                        }
                    })
                })
                .collect::<Vec<_>>()
                .into();
            payload["tool_choice"] = match request.tool_choice {
                ToolChoice::Required => json!("required"),
                ToolChoice::Auto => json!("auto"),
                ToolChoice::None => json!("none"),
            };
        }

        for (key, value) in &request.provider_specific {
            payload[key] = value.clone();
        }

        payload
    }

    fn parse_openai_response(
        &self,
        response_data: Value,
        model: String,
    ) -> LLMResult<ProviderResponse> {
        let message = &response_data["choices"][0]["message"];
        if message.is_null() {
            return Err(LLMError::Provider(
                "OpenAI response has no choices".to_string(),
            ));
        }

        let content = message["content"].as_str().unwrap_or("").to_string();

        let function_call = match message["tool_calls"][0].get("function") {
            Some(function) => {
                let name = function["name"].as_str().ok_or_else(|| {
                    LLMError::Provider("OpenAI tool call without a function name".to_string())
                })?;
                let arguments = match &function["arguments"] {
                    Value::String(raw) if raw.trim().is_empty() => json!({}),
                    Value::String(raw) => serde_json::from_str(raw).map_err(|e| {
                        LLMError::Serialisation(format!(
                            "Tool call arguments for {name} are not valid JSON: {e}"
                        ))
                    })?,
                    Value::Null => json!({}),
                    other => other.clone(),
                };
                Some(FunctionCallPayload {
                    name: name.to_string(),
                    arguments,
                })
            }
            None => None,
        };

        if content.is_empty() && function_call.is_none() {
            return Err(LLMError::Provider(
                "Failed to extract content from OpenAI response".to_string(),
            ));
        }

        let usage = response_data.get("usage").map(|usage_data| Usage {
            prompt_tokens: usage_data["prompt_tokens"].as_u64().unwrap_or(0) as u32,
            completion_tokens: usage_data["completion_tokens"].as_u64().unwrap_or(0) as u32,
            total_tokens: usage_data["total_tokens"].as_u64().unwrap_or(0) as u32,
        });

        let finish_reason = response_data["choices"][0]["finish_reason"]
            .as_str()
            .map(|s| s.to_string());

        Ok(ProviderResponse {
            content,
            model,
            function_call,
            usage,
            finish_reason,
            raw_response: response_data,
        })
    }

    async fn execute_request(&self, payload: Value) -> LLMResult<Value> {
        debug!(endpoint = %self.endpoint, "Sending request to OpenAI API");

        match tokio::time::timeout(
            self.timeout,
            self.client
                .post(&self.endpoint)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(&payload)
                .send(),
        )
        .await
        {
            Ok(Ok(response)) => match response.status() {
                status if status.is_success() => response.json().await.map_err(|e| {
                    LLMError::Serialisation(format!("Failed to parse response: {e}"))
                }),
                status => {
                    let body = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "Unknown error".to_string());
                    Err(error_for_status("OpenAI", status, body))
                }
            },
            Ok(Err(e)) if e.is_timeout() => Err(LLMError::Timeout),
            Ok(Err(e)) => Err(LLMError::Network(format!("Request failed: {e}"))),
            Err(_) => {
                warn!(
                    "Request to OpenAI API timed out after {} seconds",
                    self.timeout.as_secs()
                );
                Err(LLMError::Timeout)
            }
        }
    }
}

#[async_trait]
impl ApiClient for OpenAIClient {
    async fn send_request(&self, request: ProviderRequest) -> LLMResult<ProviderResponse> {
        let payload = self.build_openai_payload(&request);
        let response_data = self.execute_request(payload).await?;
        self.parse_openai_response(response_data, request.model)
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> OpenAIClient {
        OpenAIClient::new("key".to_string(), None, Some(5)).unwrap()
    }

    #[test]
    fn test_parse_tool_call_arguments() {
        let data = json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "query_graph", "arguments": "{\"query\": \"MATCH (n) RETURN n\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        });
        let parsed = client()
            .parse_openai_response(data, "gpt-4o".to_string())
            .unwrap();
        assert!(parsed.content.is_empty());
        let call = parsed.function_call.unwrap();
        assert_eq!(call.name, "query_graph");
        assert_eq!(call.arguments["query"], "MATCH (n) RETURN n");
        assert_eq!(parsed.usage.unwrap().total_tokens, 15);
    }

    #[test]
    fn test_parse_rejects_malformed_arguments() {
        let data = json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{"function": {"name": "get_weather", "arguments": "{not json"}}]
                }
            }]
        });
        let err = client()
            .parse_openai_response(data, "gpt-4o".to_string())
            .unwrap_err();
        assert!(matches!(err, LLMError::Serialisation(_)));
    }
}
