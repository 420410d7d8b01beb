use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::trace;

use crate::{BusError, Committed, Envelope, Event, EventLog, LogHandle};

/// Single-partition in-memory topic suitable for one process.
pub struct InMemoryTopic<E>
where
    E: Event,
{
    name: String,
    log: RwLock<Vec<Committed<E>>>,
    end_tx: watch::Sender<i64>,
    closed: AtomicBool,
}

impl<E> InMemoryTopic<E>
where
    E: Event,
{
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        let (end_tx, _) = watch::channel(0);
        Arc::new(Self {
            name: name.into(),
            log: RwLock::new(Vec::new()),
            end_tx,
            closed: AtomicBool::new(false),
        })
    }

    /// Stops accepting publishes and wakes every reader.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.end_tx.send_modify(|_| {});
    }

    pub fn len(&self) -> usize {
        self.log.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.read().is_empty()
    }

    pub fn read_from(&self, offset: i64) -> Vec<Committed<E>> {
        let start = usize::try_from(offset.max(0)).unwrap_or(usize::MAX);
        let log = self.log.read();
        log.get(start..).map(<[_]>::to_vec).unwrap_or_default()
    }
}

#[async_trait]
impl<E> EventLog<E> for InMemoryTopic<E>
where
    E: Event,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn publish(&self, envelope: Envelope<E>) -> Result<i64, BusError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BusError::Closed(self.name.clone()));
        }
        let offset = {
            let mut log = self.log.write();
            let offset = log.len() as i64;
            log.push(Committed { offset, envelope });
            offset
        };
        trace!(topic = %self.name, offset, "published");
        self.end_tx.send_replace(offset + 1);
        Ok(offset)
    }

    fn read(&self, offset: i64) -> Option<Committed<E>> {
        let index = usize::try_from(offset).ok()?;
        self.log.read().get(index).cloned()
    }

    fn end_offset(&self) -> i64 {
        self.log.read().len() as i64
    }

    fn watch_end(&self) -> watch::Receiver<i64> {
        self.end_tx.subscribe()
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Sequential consumer of a log from a given offset.
///
/// Every committed entry is yielded exactly once and in order; `next` waits
/// for new entries and returns `None` once the log is closed and drained.
pub struct TopicReader<E>
where
    E: Event,
{
    log: LogHandle<E>,
    next: i64,
    end_rx: watch::Receiver<i64>,
}

impl<E> TopicReader<E>
where
    E: Event,
{
    pub fn new(log: LogHandle<E>, from: i64) -> Self {
        let end_rx = log.watch_end();
        Self {
            log,
            next: from.max(0),
            end_rx,
        }
    }

    /// Reader positioned after everything already written.
    pub fn tail(log: LogHandle<E>) -> Self {
        let from = log.end_offset();
        Self::new(log, from)
    }

    pub fn position(&self) -> i64 {
        self.next
    }

    pub async fn next(&mut self) -> Option<Committed<E>> {
        loop {
            self.end_rx.borrow_and_update();
            if let Some(entry) = self.log.read(self.next) {
                self.next += 1;
                return Some(entry);
            }
            if self.log.is_closed() {
                return None;
            }
            if self.end_rx.changed().await.is_err() {
                return None;
            }
        }
    }
}
