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
use neo4rs::Graph;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, info};

use super::{DispatchError, FunctionHandler, FunctionSettings};

pub const GRAPH_FUNCTION: &str = "query_graph";

static LIMIT_CLAUSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bLIMIT\s+\S+").unwrap());

/// Appends `LIMIT n` unless the query already bounds its result size.
pub fn with_result_limit(query: &str, limit: u32) -> String {
    let trimmed = query.trim().trim_end_matches(';').trim_end();
    if LIMIT_CLAUSE.is_match(trimmed) {
        trimmed.to_string()
    } else {
        format!("{trimmed} LIMIT {limit}")
    }
}

/// Runs caller-supplied Cypher against neo4j. Connection and driver failures
/// degrade to a single fallback node carrying an `error` field.
pub struct GraphQueryHandler {
    graph: Option<Arc<Graph>>,
    default_limit: u32,
}

impl GraphQueryHandler {
    pub fn new(graph: Option<Arc<Graph>>, default_limit: u32) -> Self {
        Self {
            graph,
            default_limit,
        }
    }

    pub fn from_settings(settings: &FunctionSettings) -> Self {
        let graph = settings.neo4j_uri.as_deref().and_then(|uri| {
            match Graph::new(uri, &settings.neo4j_user, &settings.neo4j_password) {
                Ok(graph) => {
                    info!(uri, "Configured neo4j graph for query_graph");
                    Some(Arc::new(graph))
                }
                Err(e) => {
                    error!(uri, "Failed to configure neo4j graph: {}", e);
                    None
                }
            }
        });
        Self::new(graph, settings.default_graph_limit)
    }

    pub fn fallback_result(query: &str, reason: &str) -> Value {
        json!({
            "records": [{
                "id": "fallback-0",
                "labels": ["Fallback"],
                "properties": { "query": query }
            }],
            "count": 1,
            "query": query,
            "source": "fallback",
            "error": reason
        })
    }

    /// Model-supplied Cypher only ever runs in read access mode, so the server
    /// refuses `CREATE`, `MERGE` and `DELETE`.
    async fn run_query(&self, graph: &Graph, query: &str) -> Result<Vec<Value>, DispatchError> {
        let backend = |e: neo4rs::Error| DispatchError::Backend(e.to_string());
        let mut stream = graph.execute_read(neo4rs::query(query)).await.map_err(backend)?;
        let mut records = Vec::new();
        while let Some(row) = stream.next().await.map_err(backend)? {
            records.push(
                row.to::<Value>()
                    .map_err(|e| DispatchError::Backend(e.to_string()))?,
            );
        }
        Ok(records)
    }
}

#[async_trait]
impl FunctionHandler for GraphQueryHandler {
    fn name(&self) -> &str {
        GRAPH_FUNCTION
    }

    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration {
            name: GRAPH_FUNCTION.to_string(),
            description: "Run a read-only Cypher query against the knowledge graph".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "Cypher query" },
                    "limit": { "type": "integer", "description": "Maximum rows to return" }
                },
                "required": ["query"]
            }),
        }
    }

    async fn execute(&self, args: &Value) -> Result<Value, DispatchError> {
        let raw_query = args["query"]
            .as_str()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| DispatchError::InvalidArguments("query is required".to_string()))?;
        let limit = args["limit"]
            .as_u64()
            .map(|l| l as u32)
            .filter(|l| *l > 0)
            .unwrap_or(self.default_limit);
        let query = with_result_limit(raw_query, limit);

        let Some(graph) = self.graph.as_deref() else {
            debug!(%query, "No graph database configured, using fallback result");
            return Ok(Self::fallback_result(
                &query,
                "graph database is not configured",
            ));
        };

        match self.run_query(graph, &query).await {
            Ok(records) => Ok(json!({
                "count": records.len(),
                "records": records,
                "query": query,
                "source": "neo4j"
            })),
            Err(e) => {
                error!(%query, "Graph query failed, using fallback result: {}", e);
                Ok(Self::fallback_result(&query, &e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_appended_when_missing() {
        assert_eq!(
            with_result_limit("MATCH (n:Person) RETURN n;", 10),
            "MATCH (n:Person) RETURN n LIMIT 10"
        );
    }

    #[test]
    fn test_existing_limit_kept() {
        assert_eq!(
            with_result_limit("MATCH (n) RETURN n limit 3", 10),
            "MATCH (n) RETURN n limit 3"
        );
    }

    #[test]
    fn test_parameterised_limit_kept() {
        assert_eq!(
            with_result_limit("MATCH (n) RETURN n LIMIT $max", 10),
            "MATCH (n) RETURN n LIMIT $max"
        );
        assert_eq!(
            with_result_limit("MATCH (n) RETURN n LIMIT toInteger(5);", 10),
            "MATCH (n) RETURN n LIMIT toInteger(5)"
        );
    }

    #[test]
    fn test_limit_word_inside_identifier_ignored() {
        assert_eq!(
            with_result_limit("MATCH (n:RateLimited) RETURN n", 5),
            "MATCH (n:RateLimited) RETURN n LIMIT 5"
        );
    }

    #[tokio::test]
    async fn test_unconfigured_graph_falls_back() {
        let handler = GraphQueryHandler::new(None, 25);
        let result = handler
            .execute(&json!({"query": "MATCH (n) RETURN n"}))
            .await
            .unwrap();
        assert_eq!(result["count"], 1);
        assert_eq!(result["query"], "MATCH (n) RETURN n LIMIT 25");
        assert!(result["error"].as_str().is_some_and(|e| !e.is_empty()));
    }

    #[tokio::test]
    async fn test_missing_query_rejected() {
        let handler = GraphQueryHandler::new(None, 10);
        let err = handler.execute(&json!({})).await.unwrap_err();
        assert!(matches!(err, DispatchError::InvalidArguments(_)));
    }
}
