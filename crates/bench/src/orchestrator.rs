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
use llm_contracts::ToolDeclaration;
use rand::Rng;
use relay::{FunctionDispatcher, FunctionRegistry, Gateway};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinError;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::audit::{AuditHandle, AuditRecord, AuditStore, AuditWriter, RunSnapshot};
use crate::comparison::Comparator;
use crate::config::BenchConfig;
use crate::error::{BenchError, BenchResult};
use crate::executor::VariationExecutor;
use crate::jobs::{InMemoryJobStore, JobStore};
use crate::logging::{log_comparison_failure, log_run_event, log_variation_outcome};
use crate::model::{
    ApiConfiguration, ExecutionLog, ExecutionRequest, ExecutionResult, ExecutionRun, JobStatus,
    LogLevel, PollResponse, RunStatus, SubmitResponse, VariationResult,
};
use crate::validation::validate_request;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorSettings {
    #[serde(default = "default_jitter_min_ms")]
    pub jitter_min_ms: u64,
    #[serde(default = "default_jitter_max_ms")]
    pub jitter_max_ms: u64,
}

fn default_jitter_min_ms() -> u64 {
    100
}

fn default_jitter_max_ms() -> u64 {
    200
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            jitter_min_ms: default_jitter_min_ms(),
            jitter_max_ms: default_jitter_max_ms(),
        }
    }
}

impl OrchestratorSettings {
    /// No delay at all.
    pub fn without_jitter() -> Self {
        Self {
            jitter_min_ms: 0,
            jitter_max_ms: 0,
        }
    }

    fn jitter_delay(&self) -> Duration {
        let upper = self.jitter_max_ms.max(self.jitter_min_ms);
        let millis = rand::thread_rng().gen_range(self.jitter_min_ms..=upper);
        Duration::from_millis(millis)
    }
}

/// Drives multi-variation runs from submission to scored result.
///
/// Variations run strictly one after another with a jittered pause between
/// provider calls. Every step is mirrored to the audit trail through the
/// single [`AuditWriter`] task; audit failures never abort a run.
pub struct Orchestrator {
    dispatcher: Arc<FunctionDispatcher>,
    executor: VariationExecutor,
    audit: AuditHandle,
    jobs: Arc<dyn JobStore>,
    comparator: Comparator,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(
        gateway: Arc<Gateway>,
        dispatcher: Arc<FunctionDispatcher>,
        audit: AuditHandle,
        jobs: Arc<dyn JobStore>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            executor: VariationExecutor::new(gateway, Arc::clone(&dispatcher), audit.clone()),
            dispatcher,
            audit,
            jobs,
            comparator: Comparator::default(),
            settings,
        }
    }

    /// Wires gateway, built-in functions and the audit writer from config.
    /// Must be called inside a tokio runtime.
    pub fn from_config(config: &BenchConfig, store: Arc<dyn AuditStore>) -> BenchResult<Self> {
        let gateway = Gateway::from_config(&config.gateway)?;
        let registry = FunctionRegistry::with_builtins(&config.functions)?;
        let dispatcher = FunctionDispatcher::new(
            registry,
            Duration::from_secs(config.functions.timeout_seconds),
        );
        let audit = AuditWriter::spawn(store, config.audit.channel_capacity);

        Ok(Self::new(
            Arc::new(gateway),
            Arc::new(dispatcher),
            audit,
            Arc::new(InMemoryJobStore::new()),
            config.orchestrator.clone(),
        ))
    }

    pub fn with_comparator(mut self, comparator: Comparator) -> Self {
        self.comparator = comparator;
        self
    }

    pub fn audit(&self) -> &AuditHandle {
        &self.audit
    }

    /// Validates and runs to completion on the caller's task.
    pub async fn execute(&self, owner: &str, request: ExecutionRequest) -> BenchResult<ExecutionResult> {
        validate_request(&request)?;
        Ok(self.run(owner, request, None).await)
    }

    /// Validates, then runs in the background. The returned id is a job id
    /// for [`Orchestrator::poll`].
    pub async fn submit(
        self: &Arc<Self>,
        owner: &str,
        request: ExecutionRequest,
    ) -> BenchResult<SubmitResponse> {
        validate_request(&request)?;

        let job = JobStatus::pending(owner);
        let job_id = job.id;
        self.jobs.put(job).await;
        info!(job_id = %job_id, run = %request.run_name, "Run submitted");

        let this = Arc::clone(self);
        let owner = owner.to_string();
        tokio::spawn(async move {
            let worker = {
                let this = Arc::clone(&this);
                let owner = owner.clone();
                tokio::spawn(async move { this.run(&owner, request, Some(job_id)).await })
            };
            let joined = worker.await;
            this.finish_job(&owner, job_id, joined).await;
        });

        Ok(SubmitResponse {
            run_id: job_id,
            status: RunStatus::Pending,
        })
    }

    /// Answers by job id first. A job is forgotten once its terminal state
    /// has been returned; after that the run id answers from the audit trail.
    pub async fn poll(&self, owner: &str, id: Uuid) -> BenchResult<PollResponse> {
        if let Some(job) = self.jobs.get(id).await.filter(|job| job.owner == owner) {
            if job.status.is_terminal() {
                self.jobs.delete(id).await;
            }
            return Ok(PollResponse {
                status: job.status,
                run_id: job.run_id,
                error: job.error,
                result: job.result.map(|result| *result),
            });
        }

        let snapshot = self
            .audit
            .load_run(owner, id)
            .await?
            .ok_or(BenchError::NotFound(id))?;
        let status = snapshot.run.status;
        let error = snapshot.run.error_message.clone();
        let result = (status == RunStatus::Completed).then(|| rebuild_result(snapshot));
        Ok(PollResponse {
            status,
            run_id: Some(id),
            error,
            result,
        })
    }

    pub async fn fetch_result(&self, owner: &str, run_id: Uuid) -> BenchResult<ExecutionResult> {
        let snapshot = self
            .audit
            .load_run(owner, run_id)
            .await?
            .ok_or(BenchError::NotFound(run_id))?;
        Ok(rebuild_result(snapshot))
    }

    #[instrument(skip(self, request), fields(run = %request.run_name))]
    async fn run(&self, owner: &str, request: ExecutionRequest, job_id: Option<Uuid>) -> ExecutionResult {
        let started = Instant::now();

        let mut run = ExecutionRun::new(&request);
        self.audit
            .record_best_effort(owner, AuditRecord::Run(run.clone()))
            .await;
        log_run_event(
            run.id,
            "created",
            json!({ "configurations": request.configurations.len() }),
        );

        if let Some(job_id) = job_id {
            if let Some(mut job) = self.jobs.get(job_id).await {
                job.run_id = Some(run.id);
                job.status = RunStatus::Running;
                self.jobs.put(job).await;
            }
        }

        run.status = RunStatus::Running;
        run.started_at = Some(Utc::now());
        self.audit
            .record_best_effort(owner, AuditRecord::RunUpdate(run.clone()))
            .await;
        self.log(
            owner,
            run.id,
            None,
            LogLevel::Info,
            "Run started",
            json!({
                "configurations": request.configurations.len(),
                "function_calling": request.enable_function_calling,
            }),
        )
        .await;

        let shared_tools = if request.enable_function_calling {
            self.shared_tools(&request)
        } else {
            Vec::new()
        };

        let total = request.configurations.len();
        let mut results: Vec<VariationResult> = Vec::with_capacity(total);
        for (index, spec) in request.configurations.iter().enumerate() {
            let mut spec = spec.clone();
            if request.enable_function_calling {
                attach_tools(&mut spec.settings.tools, &shared_tools);
            } else {
                spec.settings.tools.clear();
            }

            let configuration = ApiConfiguration::new(run.id, &spec);
            self.audit
                .record_best_effort(owner, AuditRecord::Configuration(configuration.clone()))
                .await;

            let result = self
                .executor
                .execute(
                    owner,
                    &configuration,
                    &request.base_prompt,
                    request.context.as_deref(),
                )
                .await;

            let succeeded = result.succeeded();
            log_variation_outcome(run.id, &configuration.name, succeeded, result.execution_time_ms);
            self.log(
                owner,
                run.id,
                Some(configuration.id),
                if succeeded { LogLevel::Info } else { LogLevel::Error },
                format!(
                    "Variation {} {}",
                    configuration.name,
                    if succeeded { "succeeded" } else { "failed" }
                ),
                json!({
                    "execution_time_ms": result.execution_time_ms,
                    "function_call": result.function_call.as_ref().map(|c| c.function_name.clone()),
                    "error": result.response.error_message,
                }),
            )
            .await;
            results.push(result);

            if index + 1 < total {
                let delay = self.settings.jitter_delay();
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
        }

        let success_count = results.iter().filter(|r| r.succeeded()).count();
        let error_count = results.len() - success_count;

        let comparison = match self.comparator.compare(run.id, &results) {
            Ok(comparison) => {
                self.audit
                    .record_best_effort(owner, AuditRecord::Comparison(comparison.clone()))
                    .await;
                self.log(
                    owner,
                    run.id,
                    Some(comparison.best_configuration_id),
                    LogLevel::Info,
                    "Comparison complete",
                    json!({ "notes": comparison.analysis_notes }),
                )
                .await;
                Some(comparison)
            }
            Err(e) => {
                log_comparison_failure(run.id, &e);
                self.log(
                    owner,
                    run.id,
                    None,
                    LogLevel::Warn,
                    "Comparison skipped",
                    json!({ "reason": e.to_string() }),
                )
                .await;
                None
            }
        };

        let total_time_ms = started.elapsed().as_millis() as u64;
        run.status = RunStatus::Completed;
        run.total_time_ms = Some(total_time_ms);
        run.completed_at = Some(Utc::now());
        self.audit
            .record_best_effort(owner, AuditRecord::RunUpdate(run.clone()))
            .await;
        self.log(
            owner,
            run.id,
            None,
            LogLevel::Info,
            "Run completed",
            json!({
                "success_count": success_count,
                "error_count": error_count,
                "total_time_ms": total_time_ms,
                "best_configuration_id": comparison.as_ref().map(|c| c.best_configuration_id),
            }),
        )
        .await;
        info!(
            run_id = %run.id,
            success_count,
            error_count,
            total_time_ms,
            "Run completed"
        );

        ExecutionResult {
            run,
            results,
            comparison,
            success_count,
            error_count,
            total_time_ms,
        }
    }

    /// The request's own tool list, or the built-in declarations when the
    /// caller enabled function calling without naming any.
    fn shared_tools(&self, request: &ExecutionRequest) -> Vec<ToolDeclaration> {
        if request.tools.is_empty() {
            self.dispatcher.registry().declarations()
        } else {
            request.tools.clone()
        }
    }

    async fn finish_job(
        &self,
        owner: &str,
        job_id: Uuid,
        joined: Result<ExecutionResult, JoinError>,
    ) {
        let Some(mut job) = self.jobs.get(job_id).await else {
            return;
        };
        job.completed_at = Some(Utc::now());

        match joined {
            Ok(result) => {
                job.status = result.run.status;
                job.run_id = Some(result.run.id);
                job.result = Some(Box::new(result));
            }
            Err(e) => {
                let message = format!("run task aborted: {e}");
                error!(job_id = %job_id, "{}", message);
                job.status = RunStatus::Failed;
                job.error = Some(message.clone());
                if let Some(run_id) = job.run_id {
                    self.mark_run_failed(owner, run_id, message).await;
                }
            }
        }

        self.jobs.put(job).await;
    }

    async fn mark_run_failed(&self, owner: &str, run_id: Uuid, message: String) {
        match self.audit.load_run(owner, run_id).await {
            Ok(Some(snapshot)) => {
                let mut run = snapshot.run;
                run.status = RunStatus::Failed;
                run.error_message = Some(message);
                run.completed_at = Some(Utc::now());
                self.audit
                    .record_best_effort(owner, AuditRecord::RunUpdate(run))
                    .await;
            }
            Ok(None) => {}
            Err(e) => error!(run_id = %run_id, "Could not load run to mark it failed: {}", e),
        }
    }

    async fn log(
        &self,
        owner: &str,
        run_id: Uuid,
        configuration_id: Option<Uuid>,
        level: LogLevel,
        message: impl Into<String>,
        details: Value,
    ) {
        self.audit
            .record_best_effort(
                owner,
                AuditRecord::Log(ExecutionLog::new(
                    run_id,
                    configuration_id,
                    level,
                    message,
                    details,
                )),
            )
            .await;
    }
}

/// Appends `shared` declarations whose names are not already present.
fn attach_tools(tools: &mut Vec<ToolDeclaration>, shared: &[ToolDeclaration]) {
    let mut names: HashSet<String> = tools.iter().map(|t| t.name.clone()).collect();
    for tool in shared {
        if names.insert(tool.name.clone()) {
            tools.push(tool.clone());
        }
    }
}

/// Reassembles per-variation results from audit rows. The final response of
/// a variation is the last one recorded against any of its requests.
fn rebuild_result(snapshot: RunSnapshot) -> ExecutionResult {
    let RunSnapshot {
        run,
        configurations,
        requests,
        responses,
        function_calls,
        comparison,
        ..
    } = snapshot;

    let mut results = Vec::with_capacity(configurations.len());
    for configuration in configurations {
        let owned: Vec<_> = requests
            .iter()
            .filter(|r| r.configuration_id == configuration.id)
            .collect();
        let Some(primary) = owned
            .iter()
            .find(|r| r.function_name.is_none())
            .or_else(|| owned.first())
        else {
            continue;
        };
        let request_ids: HashSet<Uuid> = owned.iter().map(|r| r.id).collect();

        let Some(response) = responses
            .iter()
            .filter(|r| request_ids.contains(&r.request_id))
            .last()
            .cloned()
        else {
            continue;
        };
        let function_call = function_calls
            .iter()
            .find(|c| c.request_id == primary.id)
            .cloned();
        let execution_time_ms = (response.created_at - primary.created_at)
            .num_milliseconds()
            .max(0) as u64;

        results.push(VariationResult {
            configuration,
            request: (*primary).clone(),
            response,
            function_call,
            execution_time_ms,
        });
    }

    let success_count = results.iter().filter(|r| r.succeeded()).count();
    let error_count = results.len() - success_count;
    let total_time_ms = run.total_time_ms.unwrap_or_default();

    ExecutionResult {
        run,
        results,
        comparison,
        success_count,
        error_count,
        total_time_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tool(name: &str) -> ToolDeclaration {
        ToolDeclaration {
            name: name.to_string(),
            description: format!("{name} tool"),
            parameters: json!({"type": "object"}),
        }
    }

    #[test]
    fn test_attach_tools_skips_duplicates() {
        let mut tools = vec![tool("get_weather")];
        attach_tools(&mut tools, &[tool("get_weather"), tool("query_graph")]);
        let names: Vec<_> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["get_weather", "query_graph"]);
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let settings = OrchestratorSettings::default();
        for _ in 0..50 {
            let delay = settings.jitter_delay().as_millis() as u64;
            assert!((100..=200).contains(&delay));
        }
        assert!(OrchestratorSettings::without_jitter().jitter_delay().is_zero());
    }
}
