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

use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum BenchError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid configuration '{variation}': {reason}")]
    InvalidConfiguration { variation: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Run or job {0} not found")]
    NotFound(Uuid),

    #[error("Gateway error: {0}")]
    Gateway(#[from] llm_contracts::LLMError),

    #[error("Function registry error: {0}")]
    Functions(#[from] relay::DispatchError),
}

pub type BenchResult<T> = Result<T, BenchError>;

#[derive(Error, Debug, Clone)]
pub enum PersistenceError {
    #[error("Audit store unavailable: {0}")]
    Unavailable(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Audit backend error: {0}")]
    Backend(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ComparisonError {
    #[error("No successful variations to compare")]
    NoSuccessfulResults,

    #[error("Comparator has no scoring functions")]
    NoScorers,
}
