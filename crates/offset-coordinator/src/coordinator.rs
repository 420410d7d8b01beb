use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use gatehouse_core_types::{Token, TokenOffset};
use gatehouse_persistence::PersistenceHandle;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::CoordinatorConfig;
use crate::error::OffsetError;
use crate::metrics;
use crate::worker::{OffsetReply, OffsetResult, TokenOffsetWorker, WorkerCommand, WorkerExit};

#[derive(Debug)]
pub(crate) struct WorkerHandle {
    mailbox: mpsc::UnboundedSender<WorkerCommand>,
    generation: u64,
}

/// Pending answer to one offset request.
pub struct OffsetReceiver {
    token: Token,
    rx: oneshot::Receiver<OffsetResult>,
}

impl OffsetReceiver {
    pub fn token(&self) -> &Token {
        &self.token
    }

    pub async fn recv(self) -> OffsetResult {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(OffsetError::WorkerLost(self.token)),
        }
    }
}

/// Keeps at most one live worker per token and routes messages to it.
///
/// Must be created inside a tokio runtime; the reaper task runs until the
/// coordinator is dropped.
pub struct OffsetCoordinator {
    workers: Arc<DashMap<Token, WorkerHandle>>,
    store: PersistenceHandle<TokenOffset>,
    config: CoordinatorConfig,
    generation: AtomicU64,
    exit_tx: mpsc::UnboundedSender<WorkerExit>,
    reaper: Mutex<Option<JoinHandle<()>>>,
}

impl OffsetCoordinator {
    pub fn new(store: PersistenceHandle<TokenOffset>, config: CoordinatorConfig) -> Arc<Self> {
        let workers: Arc<DashMap<Token, WorkerHandle>> = Arc::new(DashMap::new());
        let (exit_tx, mut exit_rx) = mpsc::unbounded_channel::<WorkerExit>();

        let reaped = Arc::clone(&workers);
        let reaper = tokio::spawn(async move {
            while let Some(exit) = exit_rx.recv().await {
                let removed = reap(&reaped, &exit);
                debug!(
                    token = %exit.token,
                    generation = exit.generation,
                    delivered = exit.delivered,
                    removed,
                    "worker reaped"
                );
            }
        });

        info!(worker_timeout = ?config.worker_timeout, "offset coordinator started");
        Arc::new(Self {
            workers,
            store,
            config,
            generation: AtomicU64::new(0),
            exit_tx,
            reaper: Mutex::new(Some(reaper)),
        })
    }

    /// Asks for the offset of `token`, joining the existing worker if one is live.
    pub fn request_offset(&self, token: Token) -> OffsetReceiver {
        metrics::record_request();
        let (reply_to, rx) = oneshot::channel();

        match self.workers.entry(token.clone()) {
            Entry::Occupied(mut entry) => {
                let sent = entry
                    .get()
                    .mailbox
                    .send(WorkerCommand::GetOffset { reply_to });
                match sent {
                    Ok(()) => debug!(token = %token, "joined in-flight worker"),
                    // terminated but not yet reaped
                    Err(mpsc::error::SendError(WorkerCommand::GetOffset { reply_to })) => {
                        let handle = self.spawn_worker(token.clone(), reply_to);
                        entry.insert(handle);
                    }
                    Err(_) => {}
                }
            }
            Entry::Vacant(entry) => {
                let handle = self.spawn_worker(token.clone(), reply_to);
                entry.insert(handle);
            }
        }

        OffsetReceiver { token, rx }
    }

    pub async fn get_offset(&self, token: Token) -> OffsetResult {
        self.request_offset(token).recv().await
    }

    /// Pushes a newly written offset to the worker waiting on its token.
    ///
    /// Returns `false` when no live worker is waiting.
    pub fn offset_available(&self, offset: TokenOffset) -> bool {
        let Some(handle) = self.workers.get(&offset.token) else {
            debug!(token = %offset.token, "no worker waiting for offset");
            return false;
        };
        handle
            .mailbox
            .send(WorkerCommand::SetOffset { offset })
            .is_ok()
    }

    pub fn cancel(&self, token: &Token, reason: impl Into<String>) -> bool {
        let Some(handle) = self.workers.get(token) else {
            return false;
        };
        handle
            .mailbox
            .send(WorkerCommand::Cancel {
                reason: reason.into(),
            })
            .is_ok()
    }

    /// Cancels every live worker. Their subscribers receive a cancellation error.
    pub fn shutdown(&self) -> usize {
        let mut cancelled = 0;
        for handle in self.workers.iter() {
            let command = WorkerCommand::Cancel {
                reason: "coordinator shutting down".into(),
            };
            if handle.mailbox.send(command).is_ok() {
                cancelled += 1;
            }
        }
        info!(cancelled, "offset coordinator shutting down");
        cancelled
    }

    pub fn active_workers(&self) -> usize {
        self.workers.len()
    }

    pub fn has_worker(&self, token: &Token) -> bool {
        self.workers.contains_key(token)
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    fn spawn_worker(&self, token: Token, reply_to: OffsetReply) -> WorkerHandle {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let (worker, mailbox) = TokenOffsetWorker::new(
            token,
            generation,
            Arc::clone(&self.store),
            self.config.worker_timeout,
            reply_to,
        );
        let exit_tx = self.exit_tx.clone();
        metrics::worker_started();
        tokio::spawn(async move {
            let exit = worker.run().await;
            metrics::worker_finished();
            let _ = exit_tx.send(exit);
        });
        WorkerHandle {
            mailbox,
            generation,
        }
    }
}

impl Drop for OffsetCoordinator {
    fn drop(&mut self) {
        if let Some(reaper) = self.reaper.lock().take() {
            reaper.abort();
        }
    }
}

/// Removes the mapping for an exited worker unless a newer worker replaced it.
pub(crate) fn reap(workers: &DashMap<Token, WorkerHandle>, exit: &WorkerExit) -> bool {
    workers
        .remove_if(&exit.token, |_, handle| handle.generation == exit.generation)
        .is_some()
}

#[cfg(test)]
pub(crate) fn handle_for_test(generation: u64) -> WorkerHandle {
    let (mailbox, _rx) = mpsc::unbounded_channel();
    WorkerHandle {
        mailbox,
        generation,
    }
}
