//! Reference-counted session subscriptions and shared-call coalescing.
//!
//! One socket serves many logical viewers (browser tabs on one chat session,
//! SSE columns in a multi-agent view). The registry hands out refcounted
//! listener handles per session key; the event router fans each session's
//! frames out to every live listener. It also single-flights identical
//! "shared" calls so N tabs refreshing the same history issue one RPC.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use gatelink_core::error::GatewayError;
use gatelink_core::frame::EventFrame;

/// What a session listener receives on its channel.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// An event frame addressed to the listener's session.
    Event(EventFrame),
    /// The underlying socket dropped; no further events until a caller
    /// re-establishes the connection.
    Closed { reason: String },
}

struct ListenerEntry {
    id: u64,
    tx: mpsc::UnboundedSender<SessionEvent>,
}

#[derive(Default)]
struct Subscription {
    listeners: Vec<ListenerEntry>,
}

type FlightKey = (String, String, String);
type FlightOutcome = Result<Value, GatewayError>;

/// Per-session listener table plus the in-flight shared-call table.
#[derive(Default)]
pub struct SharedClientRegistry {
    subscriptions: Mutex<HashMap<String, Subscription>>,
    inflight: Mutex<HashMap<FlightKey, Vec<oneshot::Sender<FlightOutcome>>>>,
    next_listener_id: AtomicU64,
}

impl SharedClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for `session_key`, bumping its refcount.
    ///
    /// The handle releases on [`SessionHandle::release`] or on drop, so an
    /// aborted HTTP consumer cannot leak a listener.
    pub fn acquire(self: &Arc<Self>, session_key: &str) -> SessionHandle {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscriptions
            .lock()
            .unwrap()
            .entry(session_key.to_string())
            .or_default()
            .listeners
            .push(ListenerEntry { id, tx });
        SessionHandle {
            registry: Arc::clone(self),
            session_key: session_key.to_string(),
            listener_id: id,
            events: rx,
            released: false,
        }
    }

    /// Deliver an event to every listener registered for `session_key`.
    /// Listeners receive frames in call order; each frame once per listener.
    pub fn dispatch(&self, session_key: &str, frame: &EventFrame) {
        let subs = self.subscriptions.lock().unwrap();
        let Some(sub) = subs.get(session_key) else {
            tracing::debug!(session_key, event = %frame.event, "no listeners for event");
            return;
        };
        for listener in &sub.listeners {
            let _ = listener.tx.send(SessionEvent::Event(frame.clone()));
        }
    }

    /// Tell every listener the socket dropped. Subscriptions stay registered;
    /// events resume once some caller re-establishes the connection.
    pub fn notify_closed(&self, reason: &str) {
        let subs = self.subscriptions.lock().unwrap();
        for sub in subs.values() {
            for listener in &sub.listeners {
                let _ = listener.tx.send(SessionEvent::Closed {
                    reason: reason.to_string(),
                });
            }
        }
    }

    /// Number of live listeners for a session key.
    pub fn listener_count(&self, session_key: &str) -> usize {
        self.subscriptions
            .lock()
            .unwrap()
            .get(session_key)
            .map_or(0, |s| s.listeners.len())
    }

    fn release(&self, session_key: &str, listener_id: u64) {
        let mut subs = self.subscriptions.lock().unwrap();
        let Some(sub) = subs.get_mut(session_key) else {
            return;
        };
        sub.listeners.retain(|l| l.id != listener_id);
        // Last release tears the session entry down.
        if sub.listeners.is_empty() {
            subs.remove(session_key);
        }
    }

    /// Single-flight an identical `(session_key, method, params)` call.
    ///
    /// The first caller in becomes the leader and runs `fut`; concurrent
    /// duplicates await the leader's cloned outcome instead of issuing their
    /// own RPC. If the leader is cancelled mid-flight, followers fail with
    /// `Closed` rather than hanging.
    pub async fn coalesce<F>(
        &self,
        session_key: &str,
        method: &str,
        params: &Value,
        fut: F,
    ) -> FlightOutcome
    where
        F: Future<Output = FlightOutcome>,
    {
        let key: FlightKey = (
            session_key.to_string(),
            method.to_string(),
            params.to_string(),
        );

        let follower_rx = {
            let mut inflight = self.inflight.lock().unwrap();
            match inflight.entry(key.clone()) {
                Entry::Occupied(mut occupied) => {
                    let (tx, rx) = oneshot::channel();
                    occupied.get_mut().push(tx);
                    Some(rx)
                }
                Entry::Vacant(vacant) => {
                    vacant.insert(Vec::new());
                    None
                }
            }
        };

        if let Some(rx) = follower_rx {
            return match rx.await {
                Ok(outcome) => outcome,
                Err(_) => Err(GatewayError::Closed("shared call abandoned".into())),
            };
        }

        let mut guard = FlightGuard {
            registry: self,
            key,
            armed: true,
        };
        let outcome = fut.await;
        let followers = self
            .inflight
            .lock()
            .unwrap()
            .remove(&guard.key)
            .unwrap_or_default();
        guard.armed = false;
        for tx in followers {
            let _ = tx.send(outcome.clone());
        }
        outcome
    }
}

/// Removes the in-flight entry if the leader future is dropped before
/// completion, failing followers instead of wedging them.
struct FlightGuard<'a> {
    registry: &'a SharedClientRegistry,
    key: FlightKey,
    armed: bool,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.registry.inflight.lock().unwrap().remove(&self.key);
        }
    }
}

/// One acquired view onto a session's event stream.
pub struct SessionHandle {
    registry: Arc<SharedClientRegistry>,
    session_key: String,
    listener_id: u64,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    released: bool,
}

impl SessionHandle {
    /// The session key this handle is scoped to.
    pub fn session_key(&self) -> &str {
        &self.session_key
    }

    /// Await the next event for this session.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }

    /// Non-blocking poll, mainly for tests and draining.
    pub fn try_next(&mut self) -> Option<SessionEvent> {
        self.events.try_recv().ok()
    }

    /// Drop this listener and decrement the session's refcount.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if !self.released {
            self.released = true;
            self.registry.release(&self.session_key, self.listener_id);
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.release_inner();
    }
}
