//! Request/response correlation.
//!
//! Every outbound request registers a waiter keyed by its id; the socket task
//! feeds inbound `res` frames back here. A waiter leaves the map exactly once:
//! matching response, caller timeout, or connection-closed sweep.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::oneshot;

use gatelink_core::error::GatewayError;
use gatelink_core::frame::ResponseFrame;
use serde_json::Value;

type Outcome = Result<Value, GatewayError>;

/// Pending-request table for one client.
///
/// Responses may arrive in any order relative to issuance; correlation is
/// solely by id, never by send order.
#[derive(Default)]
pub struct RequestCorrelator {
    pending: Mutex<HashMap<String, oneshot::Sender<Outcome>>>,
}

impl RequestCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a waiter for `id`. The caller must either await the returned
    /// receiver via [`wait`](Self::wait) or [`discard`](Self::discard) it.
    pub fn register(&self, id: &str) -> oneshot::Receiver<Outcome> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(id.to_string(), tx);
        rx
    }

    /// Await the waiter with a deadline. Expiry removes the entry so a late
    /// response for this id gets dropped instead of settling a ghost.
    pub async fn wait(
        &self,
        id: &str,
        rx: oneshot::Receiver<Outcome>,
        timeout: Duration,
    ) -> Outcome {
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            // Sender dropped without settling; only happens if the waiter was
            // discarded out from under us.
            Ok(Err(_)) => Err(GatewayError::Closed("request waiter dropped".into())),
            Err(_) => {
                self.discard(id);
                Err(GatewayError::Timeout {
                    ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Settle the waiter matching an inbound `res` frame. Unknown, late or
    /// duplicate ids are dropped silently.
    pub fn settle(&self, frame: ResponseFrame) {
        let Some(tx) = self.pending.lock().unwrap().remove(&frame.id) else {
            tracing::debug!(id = %frame.id, "response for unknown or settled request");
            return;
        };
        let _ = tx.send(frame.into_result().map_err(GatewayError::from));
    }

    /// Remove a waiter without settling it (send failure, caller timeout).
    pub fn discard(&self, id: &str) {
        self.pending.lock().unwrap().remove(id);
    }

    /// Reject every pending waiter with `ConnectionClosed`. Called by the
    /// socket task on teardown so no caller hangs on a dead socket.
    pub fn sweep(&self, reason: &str) {
        let drained: Vec<_> = self.pending.lock().unwrap().drain().collect();
        if !drained.is_empty() {
            tracing::debug!(count = drained.len(), reason, "sweeping pending requests");
        }
        for (_, tx) in drained {
            let _ = tx.send(Err(GatewayError::Closed(reason.to_string())));
        }
    }

    /// Number of requests currently awaiting a response.
    pub fn len(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    /// Returns `true` if no requests are pending.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
