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

use relay::functions::weather::WeatherHandler;
use relay::{DispatchStatus, FunctionDispatcher, FunctionRegistry, FunctionSettings};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn dispatcher(settings: &FunctionSettings) -> FunctionDispatcher {
    FunctionDispatcher::new(
        FunctionRegistry::with_builtins(settings).unwrap(),
        Duration::from_secs(5),
    )
}

#[tokio::test]
async fn test_weather_without_key_degrades() {
    let dispatcher = dispatcher(&FunctionSettings::default());

    let outcome = dispatcher
        .execute("get_weather", &json!({"location": "Austin"}))
        .await;

    assert_eq!(outcome.status, DispatchStatus::Degraded);
    assert_eq!(outcome.result["location"], "Austin");
    assert!(outcome.result["temperature"].is_number());
    assert!(outcome.result["condition"].is_string());
    assert!(outcome.result["error"].as_str().is_some_and(|e| !e.is_empty()));
    assert!(outcome.error.is_some());
}

#[tokio::test]
async fn test_weather_live_lookup() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/weather"))
        .and(query_param("q", "Austin"))
        .and(query_param("appid", "weather-key"))
        .and(query_param("units", "metric"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "Austin",
            "main": {"temp": 31.4, "humidity": 48},
            "weather": [{"description": "clear sky"}],
            "wind": {"speed": 4.1}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let settings = FunctionSettings {
        weather_api_key: Some("weather-key".to_string()),
        weather_endpoint: format!("{}/weather", server.uri()),
        ..FunctionSettings::default()
    };
    let outcome = dispatcher(&settings)
        .execute("get_weather", &json!({"location": "Austin"}))
        .await;

    assert_eq!(outcome.status, DispatchStatus::Success);
    assert_eq!(outcome.result["temperature"], 31.4);
    assert_eq!(outcome.result["condition"], "clear sky");
    assert!(outcome.result.get("error").is_none());
}

#[tokio::test]
async fn test_weather_upstream_failure_degrades() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/weather"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let handler = WeatherHandler::new(
        Some("bad-key".to_string()),
        format!("{}/weather", server.uri()),
        Duration::from_secs(5),
    )
    .unwrap();
    let mut registry = FunctionRegistry::new();
    registry.register(std::sync::Arc::new(handler));
    let dispatcher = FunctionDispatcher::new(registry, Duration::from_secs(5));

    let outcome = dispatcher
        .execute("get_weather", &json!({"location": "Oslo"}))
        .await;

    assert_eq!(outcome.status, DispatchStatus::Degraded);
    let reason = outcome.result["error"].as_str().unwrap();
    assert!(reason.starts_with("Upstream service failed"));
    assert!(reason.contains("401"));
    assert_eq!(outcome.result["location"], "Oslo");
}

#[tokio::test]
async fn test_unknown_function_is_acknowledged() {
    let dispatcher = dispatcher(&FunctionSettings::default());

    let outcome = dispatcher
        .execute("book_flight", &json!({"to": "Lisbon"}))
        .await;

    assert_eq!(outcome.status, DispatchStatus::Success);
    assert_eq!(outcome.result["status"], "acknowledged");
    assert_eq!(outcome.result["function"], "book_flight");
    assert_eq!(outcome.result["arguments"]["to"], "Lisbon");
}

#[tokio::test]
async fn test_invalid_arguments_become_error_payload() {
    let dispatcher = dispatcher(&FunctionSettings::default());

    let outcome = dispatcher.execute("get_weather", &json!({})).await;

    assert_eq!(outcome.status, DispatchStatus::Error);
    assert!(outcome.result["error"].as_str().unwrap().contains("location"));
}

#[tokio::test]
async fn test_graph_query_without_database_degrades() {
    let dispatcher = dispatcher(&FunctionSettings::default());

    let outcome = dispatcher
        .execute("query_graph", &json!({"query": "MATCH (p:Person) RETURN p", "limit": 5}))
        .await;

    assert_eq!(outcome.status, DispatchStatus::Degraded);
    assert_eq!(outcome.result["query"], "MATCH (p:Person) RETURN p LIMIT 5");
    assert_eq!(outcome.result["records"].as_array().unwrap().len(), 1);
}

/// Needs a live server: set NEO4J_URI (and NEO4J_USER / NEO4J_PASSWORD) to run.
#[tokio::test]
async fn test_graph_query_refuses_writes() {
    let Ok(uri) = std::env::var("NEO4J_URI") else {
        return;
    };
    let settings = FunctionSettings {
        neo4j_uri: Some(uri),
        neo4j_user: std::env::var("NEO4J_USER").unwrap_or_else(|_| "neo4j".to_string()),
        neo4j_password: std::env::var("NEO4J_PASSWORD").unwrap_or_default(),
        ..FunctionSettings::default()
    };
    let dispatcher = dispatcher(&settings);

    let outcome = dispatcher
        .execute(
            "query_graph",
            &json!({"query": "CREATE (n:VaribenchWriteCheck) RETURN n"}),
        )
        .await;

    assert_eq!(outcome.status, DispatchStatus::Degraded);
    assert_eq!(outcome.result["source"], "fallback");
    assert!(outcome.result["error"]
        .as_str()
        .unwrap()
        .starts_with("Backend error"));
}

#[test]
fn test_builtin_declarations() {
    let registry = FunctionRegistry::with_builtins(&FunctionSettings::default()).unwrap();
    let names: Vec<_> = registry
        .declarations()
        .into_iter()
        .map(|d| d.name)
        .collect();
    assert_eq!(names, vec!["get_weather", "query_graph"]);
}
