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

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};
use uuid::Uuid;

use super::{AuditRecord, AuditStore, RunSnapshot};
use crate::error::PersistenceError;
use crate::logging::log_persistence_failure;

type Reply<T> = oneshot::Sender<Result<T, PersistenceError>>;

enum AuditCommand {
    Write {
        owner: String,
        record: AuditRecord,
        reply: Reply<()>,
    },
    Load {
        owner: String,
        run_id: Uuid,
        reply: Reply<Option<RunSnapshot>>,
    },
}

/// Single task that owns the audit store. All reads and writes from every
/// run pass through its queue one at a time.
pub struct AuditWriter;

impl AuditWriter {
    pub fn spawn(store: Arc<dyn AuditStore>, capacity: usize) -> AuditHandle {
        let (tx, mut rx) = mpsc::channel::<AuditCommand>(capacity.max(1));

        tokio::spawn(async move {
            info!("Audit writer started");
            while let Some(command) = rx.recv().await {
                match command {
                    AuditCommand::Write {
                        owner,
                        record,
                        reply,
                    } => {
                        let outcome = record.apply(store.as_ref(), &owner).await;
                        debug!(kind = record.kind(), ok = outcome.is_ok(), "Audit write applied");
                        let _ = reply.send(outcome);
                    }
                    AuditCommand::Load {
                        owner,
                        run_id,
                        reply,
                    } => {
                        let _ = reply.send(store.load_run(&owner, run_id).await);
                    }
                }
            }
            info!("Audit writer stopped");
        });

        AuditHandle { tx }
    }
}

#[derive(Clone)]
pub struct AuditHandle {
    tx: mpsc::Sender<AuditCommand>,
}

impl AuditHandle {
    /// Queues a record and waits until the store has applied it.
    pub async fn record(&self, owner: &str, record: AuditRecord) -> Result<(), PersistenceError> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(AuditCommand::Write {
                owner: owner.to_string(),
                record,
                reply,
            })
            .await
            .map_err(|_| PersistenceError::Unavailable("audit writer has shut down".to_string()))?;
        response.await.map_err(|_| {
            PersistenceError::Unavailable("audit writer dropped the request".to_string())
        })?
    }

    /// Like [`AuditHandle::record`], but failures only reach the operator log.
    pub async fn record_best_effort(&self, owner: &str, record: AuditRecord) {
        let kind = record.kind();
        if let Err(e) = self.record(owner, record).await {
            log_persistence_failure(kind, &e);
        }
    }

    pub async fn load_run(
        &self,
        owner: &str,
        run_id: Uuid,
    ) -> Result<Option<RunSnapshot>, PersistenceError> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(AuditCommand::Load {
                owner: owner.to_string(),
                run_id,
                reply,
            })
            .await
            .map_err(|_| PersistenceError::Unavailable("audit writer has shut down".to_string()))?;
        response.await.map_err(|_| {
            PersistenceError::Unavailable("audit writer dropped the request".to_string())
        })?
    }
}
