//! Registry of requests awaiting their IN envelope.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

use crate::error::{TunnelError, TunnelResult};
use crate::observability::metrics;
use crate::wire::RequestId;

type Waiters = DashMap<RequestId, oneshot::Sender<String>>;

/// Thread-safe map from request id to the waiter blocked on it.
///
/// Cloning is cheap and every clone shares the same entries.
#[derive(Clone, Default)]
pub struct PendingRegistry {
    waiters: Arc<Waiters>,
    max_pending: Option<usize>,
}

impl PendingRegistry {
    /// Create an unbounded registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry that refuses new entries beyond `max_pending`.
    pub fn with_limit(max_pending: usize) -> Self {
        Self {
            waiters: Arc::new(DashMap::new()),
            max_pending: Some(max_pending),
        }
    }

    /// Insert a pending entry for `request_id`.
    pub fn register(&self, request_id: RequestId) -> TunnelResult<PendingHandle> {
        if let Some(max) = self.max_pending {
            // Soft cap: concurrent registrations may overshoot by a few entries.
            if self.waiters.len() >= max {
                tracing::warn!(pending = max, "Pending request limit reached");
                return Err(TunnelError::TooManyPending(max));
            }
        }

        let (tx, rx) = oneshot::channel();
        match self.waiters.entry(request_id.clone()) {
            Entry::Occupied(_) => return Err(TunnelError::DuplicateRequestId(request_id)),
            Entry::Vacant(slot) => {
                slot.insert(tx);
            }
        }
        metrics::record_pending(self.waiters.len());

        tracing::trace!(request_id = %request_id, "Registered pending request");
        Ok(PendingHandle {
            request_id,
            rx,
            waiters: Arc::clone(&self.waiters),
        })
    }

    /// Remove the entry for `request_id` and hand `payload` to its waiter.
    ///
    /// Returns `NotFound` when the id was never registered, already resolved,
    /// timed out, or its waiter went away.
    pub fn resolve(&self, request_id: &RequestId, payload: String) -> TunnelResult<()> {
        let (_, tx) = self
            .waiters
            .remove(request_id)
            .ok_or_else(|| TunnelError::NotFound(request_id.clone()))?;
        metrics::record_pending(self.waiters.len());

        tx.send(payload)
            .map_err(|_| TunnelError::NotFound(request_id.clone()))
    }

    /// Whether `request_id` is still awaiting a reply.
    pub fn contains(&self, request_id: &RequestId) -> bool {
        self.waiters.contains_key(request_id)
    }

    /// Number of in-flight requests.
    pub fn len(&self) -> usize {
        self.waiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }

    /// Drop every entry. Their waiters fail with `Shutdown`.
    pub fn cancel_all(&self) -> usize {
        let count = self.waiters.len();
        self.waiters.clear();
        metrics::record_pending(0);
        count
    }
}

/// The caller's side of a pending entry.
///
/// Dropping the handle without waiting (caller cancelled) removes the entry,
/// so a reply arriving later is reported as `NotFound`.
#[derive(Debug)]
pub struct PendingHandle {
    request_id: RequestId,
    rx: oneshot::Receiver<String>,
    waiters: Arc<Waiters>,
}

impl PendingHandle {
    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    /// Suspend until the entry is resolved or `timeout` elapses.
    pub async fn wait(mut self, timeout: Duration) -> TunnelResult<String> {
        match tokio::time::timeout(timeout, &mut self.rx).await {
            Ok(Ok(payload)) => Ok(payload),
            Ok(Err(_)) => Err(TunnelError::Shutdown),
            Err(_) => {
                if self.waiters.remove(&self.request_id).is_none() {
                    // Whoever removed the entry now owns the sender and sends
                    // or drops it without yielding, so this await is short.
                    return match (&mut self.rx).await {
                        Ok(payload) => Ok(payload),
                        Err(_) => Err(TunnelError::Shutdown),
                    };
                }
                metrics::record_pending(self.waiters.len());
                Err(TunnelError::TimedOut {
                    request_id: self.request_id.clone(),
                    after: timeout,
                })
            }
        }
    }
}

impl Drop for PendingHandle {
    fn drop(&mut self) {
        if self.waiters.remove(&self.request_id).is_some() {
            tracing::debug!(request_id = %self.request_id, "Pending request abandoned");
            metrics::record_pending(self.waiters.len());
        }
    }
}
