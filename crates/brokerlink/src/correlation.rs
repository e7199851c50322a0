//! Correlation id allocation

use brokerlink_proto::CorrelationId;
use tokio::sync::Mutex;
use tracing::debug;

/// First id handed out, and the value the counter wraps back to
pub const FIRST_CORRELATION_ID: CorrelationId = 1;

#[derive(Debug)]
struct IdState {
    next: CorrelationId,
    stopped: bool,
}

/// Cycling source of correlation ids for one connection
///
/// Ids start at 1 and increase by one per caller. The counter wraps back to 1
/// before reaching `i32::MAX`, so 0 and `i32::MAX` are never handed out. After
/// [`shutdown`](Self::shutdown) no further ids are produced.
#[derive(Debug)]
pub struct CorrelationIds {
    state: Mutex<IdState>,
}

impl Default for CorrelationIds {
    fn default() -> Self {
        Self::new()
    }
}

impl CorrelationIds {
    /// Create a source starting at 1
    pub fn new() -> Self {
        Self::starting_at(FIRST_CORRELATION_ID)
    }

    /// Create a source whose next id is `next`
    ///
    /// Values outside `1..i32::MAX` are replaced by 1.
    pub fn starting_at(next: CorrelationId) -> Self {
        let next = if (FIRST_CORRELATION_ID..CorrelationId::MAX).contains(&next) {
            next
        } else {
            FIRST_CORRELATION_ID
        };

        Self {
            state: Mutex::new(IdState {
                next,
                stopped: false,
            }),
        }
    }

    /// Take the next id, or `None` once the source has been shut down
    pub async fn next(&self) -> Option<CorrelationId> {
        let mut state = self.state.lock().await;
        if state.stopped {
            return None;
        }

        let id = state.next;
        state.next += 1;
        if state.next == CorrelationId::MAX {
            state.next = FIRST_CORRELATION_ID;
        }
        Some(id)
    }

    /// Stop producing ids permanently
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        if !state.stopped {
            debug!("Correlation id source stopped at {}", state.next);
            state.stopped = true;
        }
    }

    /// Whether [`shutdown`](Self::shutdown) has been called
    pub async fn is_shutdown(&self) -> bool {
        self.state.lock().await.stopped
    }
}
