use std::time::Duration;

use gatehouse_core_types::{Token, TokenOffset};
use gatehouse_persistence::PersistenceHandle;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, timeout_at, Instant};
use tracing::{debug, warn};

use crate::error::OffsetError;
use crate::metrics;

pub type OffsetResult = Result<TokenOffset, OffsetError>;
pub type OffsetReply = oneshot::Sender<OffsetResult>;

#[derive(Debug)]
pub enum WorkerCommand {
    /// Subscribe another reply destination to this token's offset.
    GetOffset { reply_to: OffsetReply },
    /// The offset became known, either from the store or pushed by a writer.
    SetOffset { offset: TokenOffset },
    Cancel { reason: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerState {
    Resolving,
    Delivering,
    Terminated,
}

/// Sent by a worker once it has terminated and replied to everyone.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkerExit {
    pub token: Token,
    pub generation: u64,
    pub delivered: bool,
}

/// Resolves the offset of exactly one token and answers every subscriber once.
pub(crate) struct TokenOffsetWorker {
    token: Token,
    generation: u64,
    store: PersistenceHandle<TokenOffset>,
    timeout: Duration,
    state: WorkerState,
    mailbox: mpsc::UnboundedReceiver<WorkerCommand>,
    self_tx: mpsc::UnboundedSender<WorkerCommand>,
    subscribers: Vec<OffsetReply>,
    outcome: Option<OffsetResult>,
}

impl TokenOffsetWorker {
    pub(crate) fn new(
        token: Token,
        generation: u64,
        store: PersistenceHandle<TokenOffset>,
        timeout: Duration,
        first: OffsetReply,
    ) -> (Self, mpsc::UnboundedSender<WorkerCommand>) {
        let (tx, mailbox) = mpsc::unbounded_channel();
        let worker = Self {
            token,
            generation,
            store,
            timeout,
            state: WorkerState::Resolving,
            mailbox,
            self_tx: tx.clone(),
            subscribers: vec![first],
            outcome: None,
        };
        (worker, tx)
    }

    pub(crate) async fn run(mut self) -> WorkerExit {
        let deadline = Instant::now() + self.timeout;
        debug!(token = %self.token, generation = self.generation, "worker resolving");

        let lookup = timeout_at(deadline, self.store.get(self.token.as_str())).await;
        match lookup {
            Ok(Ok(Some(offset))) => {
                // "found": goes through the mailbox like an external push
                let _ = self.self_tx.send(WorkerCommand::SetOffset { offset });
            }
            Ok(Ok(None)) => {
                debug!(token = %self.token, "offset not yet written, awaiting push");
            }
            Ok(Err(err)) => {
                warn!(token = %self.token, %err, "offset lookup failed");
                self.fail(OffsetError::Persistence(err));
            }
            Err(_) => self.time_out(),
        }

        while self.state != WorkerState::Terminated {
            tokio::select! {
                command = self.mailbox.recv() => match command {
                    Some(command) => self.handle(command),
                    None => self.fail(OffsetError::WorkerLost(self.token.clone())),
                },
                _ = sleep_until(deadline) => self.time_out(),
            }
        }

        self.drain();
        WorkerExit {
            token: self.token,
            generation: self.generation,
            delivered: matches!(self.outcome, Some(Ok(_))),
        }
    }

    fn handle(&mut self, command: WorkerCommand) {
        match command {
            WorkerCommand::GetOffset { reply_to } => self.subscribers.push(reply_to),
            WorkerCommand::SetOffset { offset } => {
                if offset.token != self.token {
                    warn!(
                        token = %self.token,
                        other = %offset.token,
                        "ignoring offset for a different token"
                    );
                    return;
                }
                self.state = WorkerState::Delivering;
                self.deliver(Ok(offset));
            }
            WorkerCommand::Cancel { reason } => {
                debug!(token = %self.token, %reason, "worker cancelled");
                self.fail(OffsetError::Cancelled {
                    token: self.token.clone(),
                    reason,
                });
            }
        }
    }

    fn time_out(&mut self) {
        warn!(token = %self.token, after = ?self.timeout, "worker timed out while resolving");
        self.fail(OffsetError::TimedOut {
            token: self.token.clone(),
            after: self.timeout,
        });
    }

    fn fail(&mut self, err: OffsetError) {
        self.deliver(Err(err));
    }

    /// Answers every subscriber with `result` and terminates.
    fn deliver(&mut self, result: OffsetResult) {
        for reply_to in self.subscribers.drain(..) {
            reply(reply_to, result.clone());
        }
        self.outcome = Some(result);
        self.state = WorkerState::Terminated;
    }

    /// Closes the mailbox and answers requests that were queued before it closed.
    fn drain(&mut self) {
        self.mailbox.close();
        let Some(outcome) = self.outcome.clone() else {
            return;
        };
        while let Ok(command) = self.mailbox.try_recv() {
            if let WorkerCommand::GetOffset { reply_to } = command {
                reply(reply_to, outcome.clone());
            }
        }
    }
}

fn reply(reply_to: OffsetReply, result: OffsetResult) {
    metrics::record_reply(result.is_ok());
    if reply_to.send(result).is_err() {
        debug!("offset subscriber went away before the reply");
    }
}
