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

pub mod memory;
pub mod writer;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PersistenceError;
use crate::model::{
    ApiConfiguration, ApiRequest, ApiResponse, ComparisonResult, ExecutionLog, ExecutionRun,
    FunctionCallRecord,
};

pub use memory::InMemoryAuditStore;
pub use writer::{AuditHandle, AuditWriter};

/// Append/read interface over the audit trail. Every call is scoped by an
/// opaque owner identity.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn create_run(&self, owner: &str, run: &ExecutionRun) -> Result<(), PersistenceError>;

    async fn update_run(&self, owner: &str, run: &ExecutionRun) -> Result<(), PersistenceError>;

    async fn create_configuration(
        &self,
        owner: &str,
        configuration: &ApiConfiguration,
    ) -> Result<(), PersistenceError>;

    async fn create_request(&self, owner: &str, request: &ApiRequest)
        -> Result<(), PersistenceError>;

    async fn create_response(
        &self,
        owner: &str,
        response: &ApiResponse,
    ) -> Result<(), PersistenceError>;

    async fn create_function_call(
        &self,
        owner: &str,
        call: &FunctionCallRecord,
    ) -> Result<(), PersistenceError>;

    async fn create_log(&self, owner: &str, log: &ExecutionLog) -> Result<(), PersistenceError>;

    async fn create_comparison(
        &self,
        owner: &str,
        comparison: &ComparisonResult,
    ) -> Result<(), PersistenceError>;

    async fn load_run(
        &self,
        owner: &str,
        run_id: Uuid,
    ) -> Result<Option<RunSnapshot>, PersistenceError>;
}

/// Everything recorded for one run, in insertion order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub run: ExecutionRun,
    pub configurations: Vec<ApiConfiguration>,
    pub requests: Vec<ApiRequest>,
    pub responses: Vec<ApiResponse>,
    pub function_calls: Vec<FunctionCallRecord>,
    pub logs: Vec<ExecutionLog>,
    pub comparison: Option<ComparisonResult>,
}

#[derive(Debug, Clone)]
pub enum AuditRecord {
    Run(ExecutionRun),
    RunUpdate(ExecutionRun),
    Configuration(ApiConfiguration),
    Request(ApiRequest),
    Response(ApiResponse),
    FunctionCall(FunctionCallRecord),
    Log(ExecutionLog),
    Comparison(ComparisonResult),
}

impl AuditRecord {
    pub fn kind(&self) -> &'static str {
        match self {
            AuditRecord::Run(_) => "execution_run",
            AuditRecord::RunUpdate(_) => "execution_run_update",
            AuditRecord::Configuration(_) => "api_configuration",
            AuditRecord::Request(_) => "api_request",
            AuditRecord::Response(_) => "api_response",
            AuditRecord::FunctionCall(_) => "function_call",
            AuditRecord::Log(_) => "execution_log",
            AuditRecord::Comparison(_) => "comparison_result",
        }
    }

    pub(crate) async fn apply(
        &self,
        store: &dyn AuditStore,
        owner: &str,
    ) -> Result<(), PersistenceError> {
        match self {
            AuditRecord::Run(run) => store.create_run(owner, run).await,
            AuditRecord::RunUpdate(run) => store.update_run(owner, run).await,
            AuditRecord::Configuration(configuration) => {
                store.create_configuration(owner, configuration).await
            }
            AuditRecord::Request(request) => store.create_request(owner, request).await,
            AuditRecord::Response(response) => store.create_response(owner, response).await,
            AuditRecord::FunctionCall(call) => store.create_function_call(owner, call).await,
            AuditRecord::Log(log) => store.create_log(owner, log).await,
            AuditRecord::Comparison(comparison) => store.create_comparison(owner, comparison).await,
        }
    }
}
