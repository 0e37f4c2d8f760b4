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

use llm_contracts::ToolDeclaration;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::acknowledge::acknowledge;
use super::{
    DispatchError, DispatchOutcome, DispatchStatus, FunctionHandler, FunctionSettings,
    GraphQueryHandler, WeatherHandler,
};

#[derive(Default)]
pub struct FunctionRegistry {
    handlers: HashMap<String, Arc<dyn FunctionHandler>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the weather and graph-query capabilities.
    pub fn with_builtins(settings: &FunctionSettings) -> Result<Self, DispatchError> {
        let mut registry = Self::new();
        registry.register(Arc::new(WeatherHandler::new(
            settings.weather_api_key.clone(),
            settings.weather_endpoint.clone(),
            Duration::from_secs(settings.timeout_seconds),
        )?));
        registry.register(Arc::new(GraphQueryHandler::from_settings(settings)));
        Ok(registry)
    }

    pub fn register(&mut self, handler: Arc<dyn FunctionHandler>) {
        let name = handler.name().to_string();
        if self.handlers.insert(name.clone(), handler).is_some() {
            warn!(function = %name, "Replaced previously registered function handler");
        } else {
            debug!(function = %name, "Registered function handler");
        }
    }

    pub fn resolve(&self, name: &str) -> Option<Arc<dyn FunctionHandler>> {
        self.handlers.get(name).cloned()
    }

    pub fn declarations(&self) -> Vec<ToolDeclaration> {
        let mut declarations: Vec<_> = self.handlers.values().map(|h| h.declaration()).collect();
        declarations.sort_by(|a, b| a.name.cmp(&b.name));
        declarations
    }
}

/// Executes model-requested functions. Every call yields an outcome; failures
/// are folded into the result payload instead of being returned as errors.
pub struct FunctionDispatcher {
    registry: FunctionRegistry,
    timeout: Duration,
}

impl FunctionDispatcher {
    pub fn new(registry: FunctionRegistry, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    pub async fn execute(&self, name: &str, args: &Value) -> DispatchOutcome {
        let started = Instant::now();

        let Some(handler) = self.registry.resolve(name) else {
            info!(function = name, "Unregistered function requested, acknowledging");
            return DispatchOutcome {
                function_name: name.to_string(),
                arguments: args.clone(),
                result: acknowledge(name, args),
                status: DispatchStatus::Success,
                error: None,
                latency_ms: started.elapsed().as_millis() as u64,
            };
        };

        let (result, status, error) =
            match tokio::time::timeout(self.timeout, handler.execute(args)).await {
                Ok(Ok(result)) => match result.get("error").and_then(Value::as_str) {
                    Some(reason) => {
                        let reason = reason.to_string();
                        (result, DispatchStatus::Degraded, Some(reason))
                    }
                    None => (result, DispatchStatus::Success, None),
                },
                Ok(Err(e)) => {
                    warn!(function = name, "Function execution failed: {}", e);
                    (json!({ "error": e.to_string() }), DispatchStatus::Error, Some(e.to_string()))
                }
                Err(_) => {
                    let e = DispatchError::Timeout(self.timeout.as_secs());
                    warn!(function = name, "Function execution timed out");
                    (json!({ "error": e.to_string() }), DispatchStatus::Timeout, Some(e.to_string()))
                }
            };

        let latency_ms = started.elapsed().as_millis() as u64;
        debug!(function = name, ?status, latency_ms, "Function dispatched");

        DispatchOutcome {
            function_name: name.to_string(),
            arguments: args.clone(),
            result,
            status,
            error,
            latency_ms,
        }
    }
}
