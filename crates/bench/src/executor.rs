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

use chrono::Utc;
use llm_contracts::{FunctionCallPayload, Generation, LLMError};
use relay::{DispatchOutcome, FunctionDispatcher, Gateway};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::audit::{AuditHandle, AuditRecord};
use crate::model::{
    ApiConfiguration, ApiRequest, ApiResponse, ExecutionLog, FunctionCallRecord, LogLevel,
    ResponseStatus, VariationResult,
};

/// Runs one configuration: prompt, optional single function round trip, and
/// the audit rows for each step.
pub struct VariationExecutor {
    gateway: Arc<Gateway>,
    dispatcher: Arc<FunctionDispatcher>,
    audit: AuditHandle,
}

impl VariationExecutor {
    pub fn new(gateway: Arc<Gateway>, dispatcher: Arc<FunctionDispatcher>, audit: AuditHandle) -> Self {
        Self {
            gateway,
            dispatcher,
            audit,
        }
    }

    pub async fn execute(
        &self,
        owner: &str,
        configuration: &ApiConfiguration,
        prompt: &str,
        context: Option<&str>,
    ) -> VariationResult {
        let started = Instant::now();

        let request = ApiRequest::new(
            configuration,
            Gateway::compose_prompt(prompt, context),
            None,
        );
        self.audit
            .record_best_effort(owner, AuditRecord::Request(request.clone()))
            .await;

        let first = self
            .gateway
            .generate(&configuration.settings, prompt, context)
            .await;

        let (response, function_call) = match first {
            Ok(generation) => match generation.function_call.clone() {
                Some(call) => {
                    let intermediate = success_response(request.id, &generation);
                    self.audit
                        .record_best_effort(owner, AuditRecord::Response(intermediate))
                        .await;
                    let (response, record) = self
                        .round_trip(owner, configuration, &request, call)
                        .await;
                    (response, Some(record))
                }
                None => {
                    let response = success_response(request.id, &generation);
                    self.audit
                        .record_best_effort(owner, AuditRecord::Response(response.clone()))
                        .await;
                    (response, None)
                }
            },
            Err(e) => {
                let latency_ms = started.elapsed().as_millis() as u64;
                warn!(
                    variation = %configuration.name,
                    model = %configuration.settings.model,
                    "Generation failed: {}",
                    e
                );
                let response = failed_response(request.id, &e, latency_ms);
                self.audit
                    .record_best_effort(owner, AuditRecord::Response(response.clone()))
                    .await;
                (response, None)
            }
        };

        VariationResult {
            configuration: configuration.clone(),
            request,
            response,
            function_call,
            execution_time_ms: started.elapsed().as_millis() as u64,
        }
    }

    /// Dispatches the requested function, then asks the model once more for a
    /// prose answer. Never chains a second function call.
    async fn round_trip(
        &self,
        owner: &str,
        configuration: &ApiConfiguration,
        request: &ApiRequest,
        call: FunctionCallPayload,
    ) -> (ApiResponse, FunctionCallRecord) {
        info!(
            variation = %configuration.name,
            function = %call.name,
            "Model requested a function call"
        );

        let outcome = self.dispatcher.execute(&call.name, &call.arguments).await;
        let record = function_call_record(request.id, &outcome);
        self.audit
            .record_best_effort(owner, AuditRecord::FunctionCall(record.clone()))
            .await;
        self.audit
            .record_best_effort(
                owner,
                AuditRecord::Log(ExecutionLog::new(
                    configuration.run_id,
                    Some(configuration.id),
                    if outcome.status.is_usable() {
                        LogLevel::Info
                    } else {
                        LogLevel::Warn
                    },
                    format!("Dispatched function {}", outcome.function_name),
                    json!({
                        "status": outcome.status,
                        "latency_ms": outcome.latency_ms,
                        "error": outcome.error,
                    }),
                )),
            )
            .await;

        let follow_up_prompt = follow_up_prompt(&request.prompt, &outcome);
        let follow_up = ApiRequest::new(
            configuration,
            follow_up_prompt.clone(),
            Some(outcome.function_name.clone()),
        );
        self.audit
            .record_best_effort(owner, AuditRecord::Request(follow_up.clone()))
            .await;

        let started = Instant::now();
        let response = match self
            .gateway
            .generate(&configuration.settings.without_tools(), &follow_up_prompt, None)
            .await
        {
            Ok(generation) if !generation.text.trim().is_empty() => {
                success_response(follow_up.id, &generation)
            }
            Ok(generation) => {
                debug!(function = %outcome.function_name, "Follow-up answer was empty");
                synthesized_response(follow_up.id, &outcome, generation.latency_ms, None)
            }
            Err(e) => {
                warn!(
                    function = %outcome.function_name,
                    "Follow-up generation failed, synthesising answer: {}",
                    e
                );
                synthesized_response(
                    follow_up.id,
                    &outcome,
                    started.elapsed().as_millis() as u64,
                    Some(e.to_string()),
                )
            }
        };
        self.audit
            .record_best_effort(owner, AuditRecord::Response(response.clone()))
            .await;

        (response, record)
    }
}

pub fn follow_up_prompt(original_prompt: &str, outcome: &DispatchOutcome) -> String {
    let result = serde_json::to_string_pretty(&outcome.result).unwrap_or_else(|_| "{}".to_string());
    format!(
        "{original_prompt}\n\nYou called the function `{}` with arguments {} and it returned:\n{result}\n\n\
         Using this result, answer the original request in natural language. Do not call any functions.",
        outcome.function_name, outcome.arguments
    )
}

fn success_response(request_id: Uuid, generation: &Generation) -> ApiResponse {
    ApiResponse {
        id: Uuid::new_v4(),
        request_id,
        status: ResponseStatus::Success,
        text: generation.text.clone(),
        function_call: generation.function_call.clone(),
        usage: generation.usage,
        finish_reason: generation.finish_reason.clone(),
        latency_ms: generation.latency_ms,
        error_message: None,
        created_at: Utc::now(),
    }
}

fn failed_response(request_id: Uuid, error: &LLMError, latency_ms: u64) -> ApiResponse {
    ApiResponse {
        id: Uuid::new_v4(),
        request_id,
        status: if error.is_timeout() {
            ResponseStatus::Timeout
        } else {
            ResponseStatus::Error
        },
        text: String::new(),
        function_call: None,
        usage: None,
        finish_reason: None,
        latency_ms,
        error_message: Some(error.to_string()),
        created_at: Utc::now(),
    }
}

fn synthesized_response(
    request_id: Uuid,
    outcome: &DispatchOutcome,
    latency_ms: u64,
    error_message: Option<String>,
) -> ApiResponse {
    let result = serde_json::to_string(&outcome.result).unwrap_or_else(|_| "{}".to_string());
    ApiResponse {
        id: Uuid::new_v4(),
        request_id,
        status: ResponseStatus::Success,
        text: format!(
            "I called the {} function for you. Here is what it returned: {result}",
            outcome.function_name
        ),
        function_call: None,
        usage: None,
        finish_reason: Some("synthesized".to_string()),
        latency_ms,
        error_message,
        created_at: Utc::now(),
    }
}

fn function_call_record(request_id: Uuid, outcome: &DispatchOutcome) -> FunctionCallRecord {
    FunctionCallRecord {
        id: Uuid::new_v4(),
        request_id,
        function_name: outcome.function_name.clone(),
        arguments: outcome.arguments.clone(),
        result: outcome.result.clone(),
        error: outcome.error.clone(),
        status: outcome.status,
        latency_ms: outcome.latency_ms,
        created_at: Utc::now(),
    }
}
