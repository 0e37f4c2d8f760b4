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

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub anthropic: ProviderCredentials,
    #[serde(default)]
    pub openai: ProviderCredentials,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_anthropic_version")]
    pub anthropic_version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProviderCredentials {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl ProviderCredentials {
    /// A blank key counts as absent.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty())
    }
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_anthropic_version() -> String {
    "2023-06-01".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            anthropic: ProviderCredentials::default(),
            openai: ProviderCredentials::default(),
            timeout_seconds: default_timeout_seconds(),
            anthropic_version: default_anthropic_version(),
        }
    }
}
