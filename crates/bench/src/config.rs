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

use llm_contracts::GatewayConfig;
use relay::FunctionSettings;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::error::{BenchError, BenchResult};
use crate::orchestrator::OrchestratorSettings;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BenchConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub functions: FunctionSettings,
    #[serde(default)]
    pub orchestrator: OrchestratorSettings,
    #[serde(default)]
    pub audit: AuditSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditSettings {
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_channel_capacity() -> usize {
    256
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl BenchConfig {
    pub fn from_toml_str(raw: &str) -> BenchResult<Self> {
        let config: BenchConfig =
            toml::from_str(raw).map_err(|e| BenchError::Config(e.to_string()))?;
        config.check()?;
        Ok(config)
    }

    /// Reads the optional TOML file, then lets the process environment
    /// override credentials and endpoints.
    pub fn load(path: Option<&Path>) -> BenchResult<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|e| {
                    BenchError::Config(format!("failed to read {}: {e}", path.display()))
                })?;
                Self::from_toml_str(&raw)?
            }
            None => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = lookup("ANTHROPIC_API_KEY") {
            self.gateway.anthropic.api_key = Some(key);
        }
        if let Some(endpoint) = lookup("ANTHROPIC_ENDPOINT") {
            self.gateway.anthropic.endpoint = Some(endpoint);
        }
        if let Some(key) = lookup("OPENAI_API_KEY") {
            self.gateway.openai.api_key = Some(key);
        }
        if let Some(endpoint) = lookup("OPENAI_ENDPOINT") {
            self.gateway.openai.endpoint = Some(endpoint);
        }
        if let Some(key) = lookup("OPENWEATHER_API_KEY") {
            self.functions.weather_api_key = Some(key);
        }
        if let Some(uri) = lookup("NEO4J_URI") {
            self.functions.neo4j_uri = Some(uri);
        }
        if let Some(user) = lookup("NEO4J_USER") {
            self.functions.neo4j_user = user;
        }
        if let Some(password) = lookup("NEO4J_PASSWORD") {
            self.functions.neo4j_password = password;
        }

        debug!(
            anthropic = self.gateway.anthropic.api_key().is_some(),
            openai = self.gateway.openai.api_key().is_some(),
            weather = self.functions.weather_api_key.is_some(),
            graph = self.functions.neo4j_uri.is_some(),
            "Resolved credential sources"
        );
    }

    fn check(&self) -> BenchResult<()> {
        let jitter = &self.orchestrator;
        if jitter.jitter_min_ms > jitter.jitter_max_ms {
            return Err(BenchError::Config(format!(
                "jitter_min_ms ({}) exceeds jitter_max_ms ({})",
                jitter.jitter_min_ms, jitter.jitter_max_ms
            )));
        }
        if self.gateway.timeout_seconds == 0 {
            return Err(BenchError::Config(
                "gateway.timeout_seconds must be greater than zero".to_string(),
            ));
        }
        if self.functions.timeout_seconds == 0 {
            return Err(BenchError::Config(
                "functions.timeout_seconds must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = BenchConfig::default();
        assert_eq!(config.orchestrator.jitter_min_ms, 100);
        assert_eq!(config.orchestrator.jitter_max_ms, 200);
        assert_eq!(config.audit.channel_capacity, 256);
        assert_eq!(config.gateway.timeout_seconds, 30);
        assert!(config.gateway.anthropic.api_key().is_none());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[gateway]
timeout_seconds = 12

[gateway.openai]
api_key = "sk-file"

[orchestrator]
jitter_min_ms = 0
jitter_max_ms = 0

[functions]
default_graph_limit = 25
"#
        )
        .unwrap();

        let config = BenchConfig::from_toml_str(&std::fs::read_to_string(file.path()).unwrap())
            .unwrap();
        assert_eq!(config.gateway.timeout_seconds, 12);
        assert_eq!(config.gateway.openai.api_key(), Some("sk-file"));
        assert_eq!(config.orchestrator.jitter_max_ms, 0);
        assert_eq!(config.functions.default_graph_limit, 25);
        assert_eq!(config.audit.channel_capacity, 256);
    }

    #[test]
    fn test_inverted_jitter_rejected() {
        let raw = "[orchestrator]\njitter_min_ms = 300\njitter_max_ms = 100\n";
        assert!(matches!(
            BenchConfig::from_toml_str(raw),
            Err(BenchError::Config(_))
        ));
    }

    #[test]
    fn test_zero_function_timeout_rejected() {
        let raw = "[functions]\ntimeout_seconds = 0\n";
        match BenchConfig::from_toml_str(raw) {
            Err(BenchError::Config(message)) => assert!(message.contains("functions.timeout_seconds")),
            other => panic!("expected config error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_environment_overrides_file_values() {
        let mut config =
            BenchConfig::from_toml_str("[gateway.anthropic]\napi_key = \"from-file\"\n").unwrap();
        let env: HashMap<&str, &str> = HashMap::from([
            ("ANTHROPIC_API_KEY", "from-env"),
            ("OPENAI_API_KEY", "   "),
            ("NEO4J_URI", "bolt://localhost:7687"),
            ("OPENWEATHER_API_KEY", "weather-key"),
        ]);
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.gateway.anthropic.api_key(), Some("from-env"));
        assert!(config.gateway.openai.api_key().is_none());
        assert_eq!(config.functions.neo4j_uri.as_deref(), Some("bolt://localhost:7687"));
        assert_eq!(config.functions.weather_api_key.as_deref(), Some("weather-key"));
        assert_eq!(config.functions.neo4j_user, "neo4j");
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert!(matches!(
            BenchConfig::load(Some(&missing)),
            Err(BenchError::Config(_))
        ));
    }
}
