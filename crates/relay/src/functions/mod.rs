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

pub mod acknowledge;
pub mod error;
pub mod graph;
pub mod registry;
pub mod weather;

use async_trait::async_trait;
use llm_contracts::ToolDeclaration;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use error::DispatchError;
pub use graph::GraphQueryHandler;
pub use registry::{FunctionDispatcher, FunctionRegistry};
pub use weather::WeatherHandler;

/// One capability the model may call by name.
#[async_trait]
pub trait FunctionHandler: Send + Sync {
    fn name(&self) -> &str;

    fn declaration(&self) -> ToolDeclaration;

    async fn execute(&self, args: &Value) -> Result<Value, DispatchError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStatus {
    Success,
    /// The handler answered with a fallback payload carrying an `error` field.
    Degraded,
    Error,
    Timeout,
}

impl DispatchStatus {
    pub fn is_usable(&self) -> bool {
        matches!(self, DispatchStatus::Success | DispatchStatus::Degraded)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchOutcome {
    pub function_name: String,
    pub arguments: Value,
    pub result: Value,
    pub status: DispatchStatus,
    pub error: Option<String>,
    pub latency_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionSettings {
    #[serde(default)]
    pub weather_api_key: Option<String>,
    #[serde(default = "default_weather_endpoint")]
    pub weather_endpoint: String,
    #[serde(default)]
    pub neo4j_uri: Option<String>,
    #[serde(default = "default_neo4j_user")]
    pub neo4j_user: String,
    #[serde(default)]
    pub neo4j_password: String,
    #[serde(default = "default_graph_limit")]
    pub default_graph_limit: u32,
    #[serde(default = "default_function_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_weather_endpoint() -> String {
    "https://api.openweathermap.org/data/2.5/weather".to_string()
}

fn default_neo4j_user() -> String {
    "neo4j".to_string()
}

fn default_graph_limit() -> u32 {
    10
}

fn default_function_timeout_seconds() -> u64 {
    15
}

impl Default for FunctionSettings {
    fn default() -> Self {
        Self {
            weather_api_key: None,
            weather_endpoint: default_weather_endpoint(),
            neo4j_uri: None,
            neo4j_user: default_neo4j_user(),
            neo4j_password: String::new(),
            default_graph_limit: default_graph_limit(),
            timeout_seconds: default_function_timeout_seconds(),
        }
    }
}
