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

use serde_json::Value;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub fn log_run_event(run_id: Uuid, event: &str, payload: Value) {
    debug!(
        run_id = %run_id,
        event = event,
        payload = %serde_json::to_string(&payload).unwrap_or_else(|_| "{}".to_string()),
        "Run event"
    );
}

pub fn log_variation_outcome(run_id: Uuid, variation: &str, succeeded: bool, latency_ms: u64) {
    if succeeded {
        info!(
            run_id = %run_id,
            variation = variation,
            latency_ms = latency_ms,
            "Variation completed"
        );
    } else {
        warn!(
            run_id = %run_id,
            variation = variation,
            latency_ms = latency_ms,
            "Variation failed"
        );
    }
}

pub fn log_persistence_failure(kind: &str, error: &dyn std::error::Error) {
    error!(
        record = kind,
        error = %error,
        "Audit write failed"
    );
}

pub fn log_comparison_failure(run_id: Uuid, error: &dyn std::error::Error) {
    warn!(
        run_id = %run_id,
        error = %error,
        "Comparison skipped"
    );
}
