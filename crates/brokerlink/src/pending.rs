//! Table of requests waiting for a response
//!
//! The reader task and every caller meet here. All operations run under one
//! lock, so registering, delivering and draining on shutdown are serialized
//! against each other: once [`PendingRequests::close_all`] has run, nothing
//! can register again and no waiter is left behind. A [`ResponseWaiter`]
//! dropped before its response arrives takes its entry with it.

use crate::{BrokerError, CloseReason, Result};
use brokerlink_proto::CorrelationId;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tokio::sync::{oneshot, Mutex};
use tracing::debug;

/// What a waiting caller is woken up with
type Delivery = std::result::Result<Bytes, CloseReason>;

#[derive(Debug, Default)]
struct PendingState {
    waiters: HashMap<CorrelationId, oneshot::Sender<Delivery>>,
    closed: Option<CloseReason>,
}

impl PendingState {
    /// Remove `correlation_id` if its waiter is gone
    ///
    /// A live entry under the same id belongs to a later registration.
    fn remove_abandoned(&mut self, correlation_id: CorrelationId) {
        let abandoned = self
            .waiters
            .get(&correlation_id)
            .is_some_and(|sender| sender.is_closed());
        if abandoned {
            self.waiters.remove(&correlation_id);
            debug!("Removed abandoned request {}", correlation_id);
        }
    }
}

/// Guarded map from correlation id to the caller waiting on it
#[derive(Debug, Default)]
pub struct PendingRequests {
    state: Arc<Mutex<PendingState>>,
}

/// One-shot handle a caller blocks on until its response or shutdown
///
/// Dropping the waiter, or the future returned by [`wait`](Self::wait),
/// before the response arrives removes its table entry.
#[derive(Debug)]
pub struct ResponseWaiter {
    correlation_id: CorrelationId,
    rx: oneshot::Receiver<Delivery>,
    table: Weak<Mutex<PendingState>>,
    finished: bool,
}

impl ResponseWaiter {
    /// Correlation id this waiter was registered under
    pub fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    /// Wait for the response payload
    ///
    /// Fails with [`BrokerError::Closed`] if the table was drained first.
    pub async fn wait(mut self) -> Result<Bytes> {
        let delivery = (&mut self.rx).await;
        self.finished = true;

        match delivery {
            Ok(Ok(payload)) => Ok(payload),
            Ok(Err(reason)) => Err(BrokerError::Closed(reason)),
            Err(_) => Err(BrokerError::Closed(CloseReason::Dropped)),
        }
    }
}

impl Drop for ResponseWaiter {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        // Marks the sender closed so the entry is recognisable as ours
        self.rx.close();

        let Some(table) = self.table.upgrade() else {
            return;
        };
        let correlation_id = self.correlation_id;

        if let Ok(mut state) = table.try_lock() {
            state.remove_abandoned(correlation_id);
            return;
        }
        if let Ok(handle) = Handle::try_current() {
            handle.spawn(async move {
                table.lock().await.remove_abandoned(correlation_id);
            });
        }
    }
}

impl PendingRequests {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a waiter for `correlation_id`
    ///
    /// Fails with [`BrokerError::CorrelationConflict`] if the id is already
    /// pending, and with [`BrokerError::Closed`] once the table has been
    /// drained.
    pub async fn register(&self, correlation_id: CorrelationId) -> Result<ResponseWaiter> {
        let mut state = self.state.lock().await;

        if let Some(reason) = &state.closed {
            return Err(BrokerError::Closed(reason.clone()));
        }
        if state.waiters.contains_key(&correlation_id) {
            return Err(BrokerError::CorrelationConflict(correlation_id));
        }

        let (tx, rx) = oneshot::channel();
        state.waiters.insert(correlation_id, tx);

        Ok(ResponseWaiter {
            correlation_id,
            rx,
            table: Arc::downgrade(&self.state),
            finished: false,
        })
    }

    /// Hand `payload` to the waiter registered under `correlation_id`
    ///
    /// The entry is removed before the payload is sent, so each id is
    /// delivered at most once. Fails with [`BrokerError::OrphanResponse`] when
    /// nobody is waiting for the id, including callers that gave up.
    pub async fn deliver(&self, correlation_id: CorrelationId, payload: Bytes) -> Result<()> {
        let sender = {
            let mut state = self.state.lock().await;
            state.waiters.remove(&correlation_id)
        };

        match sender {
            Some(sender) => sender
                .send(Ok(payload))
                .map_err(|_| BrokerError::OrphanResponse(correlation_id)),
            None => Err(BrokerError::OrphanResponse(correlation_id)),
        }
    }

    /// Drop the entry for `correlation_id` without delivering anything
    ///
    /// Returns whether an entry was removed.
    pub async fn cancel(&self, correlation_id: CorrelationId) -> bool {
        self.state.lock().await.waiters.remove(&correlation_id).is_some()
    }

    /// Fail every pending waiter with `reason` and refuse new registrations
    ///
    /// Only the first call records its reason; later calls drain nothing and
    /// return 0. Returns the number of waiters released.
    pub async fn close_all(&self, reason: CloseReason) -> usize {
        let mut state = self.state.lock().await;
        if state.closed.is_some() {
            return 0;
        }

        let released = state.waiters.len();
        for (_, sender) in state.waiters.drain() {
            let _ = sender.send(Err(reason.clone()));
        }
        state.closed = Some(reason);

        debug!("Released {} pending requests", released);
        released
    }

    /// Number of requests currently waiting
    pub async fn len(&self) -> usize {
        self.state.lock().await.waiters.len()
    }

    /// Whether no request is waiting
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Whether [`close_all`](Self::close_all) has run
    pub async fn is_closed(&self) -> bool {
        self.state.lock().await.closed.is_some()
    }
}
