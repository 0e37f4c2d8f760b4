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

use chrono::{DateTime, Utc};
use llm_contracts::{FunctionCallPayload, ModelSettings, ToolDeclaration, Usage};
use relay::DispatchStatus;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }
}

/// Submission payload for one multi-variation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRequest {
    pub run_name: String,
    #[serde(default)]
    pub description: String,
    pub base_prompt: String,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub enable_function_calling: bool,
    pub configurations: Vec<VariationSpec>,
    #[serde(default)]
    pub tools: Vec<ToolDeclaration>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariationSpec {
    pub name: String,
    #[serde(flatten)]
    pub settings: ModelSettings,
}

impl VariationSpec {
    pub fn new(name: impl Into<String>, settings: ModelSettings) -> Self {
        Self {
            name: name.into(),
            settings,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRun {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub function_calling_enabled: bool,
    pub status: RunStatus,
    pub error_message: Option<String>,
    pub total_time_ms: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ExecutionRun {
    pub fn new(request: &ExecutionRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: request.run_name.clone(),
            description: request.description.clone(),
            function_calling_enabled: request.enable_function_calling,
            status: RunStatus::Pending,
            error_message: None,
            total_time_ms: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }
}

/// A variation as persisted for one run. Never changes after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfiguration {
    pub id: Uuid,
    pub run_id: Uuid,
    pub name: String,
    #[serde(flatten)]
    pub settings: ModelSettings,
    pub created_at: DateTime<Utc>,
}

impl ApiConfiguration {
    pub fn new(run_id: Uuid, spec: &VariationSpec) -> Self {
        Self {
            id: Uuid::new_v4(),
            run_id,
            name: spec.name.clone(),
            settings: spec.settings.clone(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiRequest {
    pub id: Uuid,
    pub run_id: Uuid,
    pub configuration_id: Uuid,
    pub prompt: String,
    pub function_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ApiRequest {
    pub fn new(configuration: &ApiConfiguration, prompt: String, function_name: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            run_id: configuration.run_id,
            configuration_id: configuration.id,
            prompt,
            function_name,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Success,
    Error,
    Timeout,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse {
    pub id: Uuid,
    pub request_id: Uuid,
    pub status: ResponseStatus,
    pub text: String,
    pub function_call: Option<FunctionCallPayload>,
    pub usage: Option<Usage>,
    pub finish_reason: Option<String>,
    pub latency_ms: u64,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCallRecord {
    pub id: Uuid,
    pub request_id: Uuid,
    pub function_name: String,
    pub arguments: Value,
    pub result: Value,
    pub error: Option<String>,
    pub status: DispatchStatus,
    pub latency_ms: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionLog {
    pub id: Uuid,
    pub run_id: Uuid,
    pub configuration_id: Option<Uuid>,
    pub level: LogLevel,
    pub message: String,
    pub details: Value,
    pub created_at: DateTime<Utc>,
}

impl ExecutionLog {
    pub fn new(
        run_id: Uuid,
        configuration_id: Option<Uuid>,
        level: LogLevel,
        message: impl Into<String>,
        details: Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            run_id,
            configuration_id,
            level,
            message: message.into(),
            details,
            created_at: Utc::now(),
        }
    }
}

/// In-memory outcome of one variation within a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariationResult {
    pub configuration: ApiConfiguration,
    pub request: ApiRequest,
    pub response: ApiResponse,
    pub function_call: Option<FunctionCallRecord>,
    pub execution_time_ms: u64,
}

impl VariationResult {
    pub fn succeeded(&self) -> bool {
        self.response.status == ResponseStatus::Success
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigurationScore {
    pub configuration_id: Uuid,
    pub configuration_name: String,
    pub metrics: BTreeMap<String, f64>,
    pub overall_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub id: Uuid,
    pub run_id: Uuid,
    pub best_configuration_id: Uuid,
    pub scores: HashMap<Uuid, ConfigurationScore>,
    pub analysis_notes: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub run: ExecutionRun,
    pub results: Vec<VariationResult>,
    pub comparison: Option<ComparisonResult>,
    pub success_count: usize,
    pub error_count: usize,
    pub total_time_ms: u64,
}

/// Transient record letting callers poll a run before it is queryable by id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatus {
    pub id: Uuid,
    pub owner: String,
    pub run_id: Option<Uuid>,
    pub status: RunStatus,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Box<ExecutionResult>>,
}

impl JobStatus {
    pub fn pending(owner: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner: owner.to_string(),
            run_id: None,
            status: RunStatus::Pending,
            error: None,
            started_at: Utc::now(),
            completed_at: None,
            result: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub run_id: Uuid,
    pub status: RunStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollResponse {
    pub status: RunStatus,
    pub run_id: Option<Uuid>,
    pub error: Option<String>,
    pub result: Option<ExecutionResult>,
}
