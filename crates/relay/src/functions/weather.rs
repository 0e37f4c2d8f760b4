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
use llm_contracts::ToolDeclaration;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use super::{DispatchError, FunctionHandler};

pub const WEATHER_FUNCTION: &str = "get_weather";

/// Current conditions by location. Any upstream failure degrades to a
/// synthetic report carrying an `error` field.
#[derive(Debug, Clone)]
pub struct WeatherHandler {
    client: Client,
    api_key: Option<String>,
    endpoint: String,
}

impl WeatherHandler {
    pub fn new(
        api_key: Option<String>,
        endpoint: String,
        timeout: Duration,
    ) -> Result<Self, DispatchError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            endpoint,
        })
    }

    pub fn fallback_report(location: &str, reason: &str) -> Value {
        json!({
            "location": location,
            "temperature": 22.0,
            "condition": "partly cloudy",
            "humidity": 60,
            "wind_speed": 3.5,
            "units": "metric",
            "source": "fallback",
            "error": reason
        })
    }

    async fn fetch(&self, api_key: &str, location: &str) -> Result<Value, DispatchError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("q", location), ("appid", api_key), ("units", "metric")])
            .send()
            .await
            .map_err(|e| DispatchError::Upstream(format!("weather request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DispatchError::Upstream(format!(
                "weather service returned {status}"
            )));
        }

        let data: Value = response
            .json()
            .await
            .map_err(|e| {
                DispatchError::Upstream(format!("weather service returned malformed JSON: {e}"))
            })?;

        let temperature = data["main"]["temp"]
            .as_f64()
            .ok_or_else(|| {
                DispatchError::Upstream("weather payload is missing main.temp".to_string())
            })?;

        Ok(json!({
            "location": data["name"].as_str().unwrap_or(location),
            "temperature": temperature,
            "condition": data["weather"][0]["description"].as_str().unwrap_or("unknown"),
            "humidity": data["main"]["humidity"].as_u64().unwrap_or(0),
            "wind_speed": data["wind"]["speed"].as_f64().unwrap_or(0.0),
            "units": "metric",
            "source": "openweathermap"
        }))
    }
}

#[async_trait]
impl FunctionHandler for WeatherHandler {
    fn name(&self) -> &str {
        WEATHER_FUNCTION
    }

    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration {
            name: WEATHER_FUNCTION.to_string(),
            description: "Get the current weather for a location".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "location": {
                        "type": "string",
                        "description": "City name, optionally with country code, e.g. Austin,US"
                    }
                },
                "required": ["location"]
            }),
        }
    }

    async fn execute(&self, args: &Value) -> Result<Value, DispatchError> {
        let location = args["location"]
            .as_str()
            .or_else(|| args["city"].as_str())
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .ok_or_else(|| DispatchError::InvalidArguments("location is required".to_string()))?;

        let Some(api_key) = self.api_key.as_deref() else {
            debug!(location, "No weather API key configured, using fallback report");
            return Ok(Self::fallback_report(
                location,
                "weather API key is not configured",
            ));
        };

        match self.fetch(api_key, location).await {
            Ok(report) => Ok(report),
            Err(e) => {
                warn!(location, "Weather lookup failed, using fallback report: {}", e);
                Ok(Self::fallback_report(location, &e.to_string()))
            }
        }
    }
}
