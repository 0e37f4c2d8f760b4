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

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("Upstream service failed: {0}")]
    Upstream(String),
    #[error("Function timed out after {0} seconds")]
    Timeout(u64),
    #[error("Backend error: {0}")]
    Backend(String),
    #[error("HTTP request failed")]
    Http(#[from] reqwest::Error),
}
