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

pub mod audit;
pub mod comparison;
pub mod config;
pub mod error;
pub mod executor;
pub mod jobs;
pub mod logging;
pub mod model;
pub mod orchestrator;
pub mod validation;

pub use audit::{AuditHandle, AuditRecord, AuditStore, AuditWriter, InMemoryAuditStore, RunSnapshot};
pub use comparison::{Comparator, ScoreFn};
pub use config::BenchConfig;
pub use error::{BenchError, BenchResult, ComparisonError, PersistenceError};
pub use executor::VariationExecutor;
pub use jobs::{InMemoryJobStore, JobStore};
pub use model::*;
pub use orchestrator::{Orchestrator, OrchestratorSettings};
