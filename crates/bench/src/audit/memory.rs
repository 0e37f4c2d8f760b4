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
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{AuditStore, RunSnapshot};
use crate::error::PersistenceError;
use crate::model::{
    ApiConfiguration, ApiRequest, ApiResponse, ComparisonResult, ExecutionLog, ExecutionRun,
    FunctionCallRecord,
};

#[derive(Default)]
struct Tables {
    runs: HashMap<Uuid, (String, ExecutionRun)>,
    configurations: Vec<(String, ApiConfiguration)>,
    requests: Vec<(String, ApiRequest)>,
    responses: Vec<(String, ApiResponse)>,
    function_calls: Vec<(String, FunctionCallRecord)>,
    logs: Vec<(String, ExecutionLog)>,
    comparisons: HashMap<Uuid, (String, ComparisonResult)>,
}

fn owned_by<'a, T>(rows: &'a [(String, T)], owner: &'a str) -> impl Iterator<Item = &'a T> + 'a {
    rows.iter()
        .filter(move |(row_owner, _)| row_owner == owner)
        .map(|(_, row)| row)
}

#[derive(Default)]
pub struct InMemoryAuditStore {
    tables: RwLock<Tables>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn run_count(&self) -> usize {
        self.tables.read().await.runs.len()
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn create_run(&self, owner: &str, run: &ExecutionRun) -> Result<(), PersistenceError> {
        let mut tables = self.tables.write().await;
        if tables.runs.contains_key(&run.id) {
            return Err(PersistenceError::Backend(format!(
                "execution run {} already exists",
                run.id
            )));
        }
        tables.runs.insert(run.id, (owner.to_string(), run.clone()));
        Ok(())
    }

    async fn update_run(&self, owner: &str, run: &ExecutionRun) -> Result<(), PersistenceError> {
        let mut tables = self.tables.write().await;
        match tables.runs.get_mut(&run.id) {
            Some((row_owner, row)) if row_owner == owner => {
                *row = run.clone();
                Ok(())
            }
            _ => Err(PersistenceError::NotFound(format!("execution run {}", run.id))),
        }
    }

    async fn create_configuration(
        &self,
        owner: &str,
        configuration: &ApiConfiguration,
    ) -> Result<(), PersistenceError> {
        self.tables
            .write()
            .await
            .configurations
            .push((owner.to_string(), configuration.clone()));
        Ok(())
    }

    async fn create_request(
        &self,
        owner: &str,
        request: &ApiRequest,
    ) -> Result<(), PersistenceError> {
        self.tables
            .write()
            .await
            .requests
            .push((owner.to_string(), request.clone()));
        Ok(())
    }

    async fn create_response(
        &self,
        owner: &str,
        response: &ApiResponse,
    ) -> Result<(), PersistenceError> {
        self.tables
            .write()
            .await
            .responses
            .push((owner.to_string(), response.clone()));
        Ok(())
    }

    async fn create_function_call(
        &self,
        owner: &str,
        call: &FunctionCallRecord,
    ) -> Result<(), PersistenceError> {
        self.tables
            .write()
            .await
            .function_calls
            .push((owner.to_string(), call.clone()));
        Ok(())
    }

    async fn create_log(&self, owner: &str, log: &ExecutionLog) -> Result<(), PersistenceError> {
        self.tables
            .write()
            .await
            .logs
            .push((owner.to_string(), log.clone()));
        Ok(())
    }

    async fn create_comparison(
        &self,
        owner: &str,
        comparison: &ComparisonResult,
    ) -> Result<(), PersistenceError> {
        self.tables
            .write()
            .await
            .comparisons
            .insert(comparison.run_id, (owner.to_string(), comparison.clone()));
        Ok(())
    }

    async fn load_run(
        &self,
        owner: &str,
        run_id: Uuid,
    ) -> Result<Option<RunSnapshot>, PersistenceError> {
        let tables = self.tables.read().await;
        let run = match tables.runs.get(&run_id) {
            Some((row_owner, run)) if row_owner == owner => run.clone(),
            _ => return Ok(None),
        };

        let configurations: Vec<_> = owned_by(&tables.configurations, owner)
            .filter(|c| c.run_id == run_id)
            .cloned()
            .collect();
        let requests: Vec<_> = owned_by(&tables.requests, owner)
            .filter(|r| r.run_id == run_id)
            .cloned()
            .collect();
        let request_ids: HashSet<Uuid> = requests.iter().map(|r| r.id).collect();
        let responses = owned_by(&tables.responses, owner)
            .filter(|r| request_ids.contains(&r.request_id))
            .cloned()
            .collect();
        let function_calls = owned_by(&tables.function_calls, owner)
            .filter(|c| request_ids.contains(&c.request_id))
            .cloned()
            .collect();
        let logs = owned_by(&tables.logs, owner)
            .filter(|l| l.run_id == run_id)
            .cloned()
            .collect();
        let comparison = tables
            .comparisons
            .get(&run_id)
            .filter(|(row_owner, _)| row_owner == owner)
            .map(|(_, c)| c.clone());

        Ok(Some(RunSnapshot {
            run,
            configurations,
            requests,
            responses,
            function_calls,
            logs,
            comparison,
        }))
    }
}
