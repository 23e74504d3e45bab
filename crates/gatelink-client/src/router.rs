//! Session-scoped event fan-out.

use std::sync::Arc;

use gatelink_core::frame::EventFrame;

use crate::registry::SharedClientRegistry;

/// Routes unsolicited `event` frames to the listeners registered for the
/// event's session scope. Performs no payload transformation; its only job
/// is scoped fan-out in socket-arrival order.
pub struct EventRouter {
    registry: Arc<SharedClientRegistry>,
}

impl EventRouter {
    pub fn new(registry: Arc<SharedClientRegistry>) -> Self {
        Self { registry }
    }

    /// Hand one event frame to the listeners for its session key.
    /// Events with no session key, or with no listeners, are dropped.
    pub fn route(&self, frame: EventFrame) {
        match frame.session_key() {
            Some(key) => {
                let key = key.to_string();
                self.registry.dispatch(&key, &frame);
            }
            None => {
                tracing::debug!(event = %frame.event, "dropping event without session key");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::SessionEvent;
    use serde_json::json;

    fn event(name: &str, payload: serde_json::Value) -> EventFrame {
        EventFrame {
            event: name.into(),
            payload,
            seq: Some(1),
            state_version: None,
        }
    }

    #[tokio::test]
    async fn routes_by_session_key() {
        let registry = Arc::new(SharedClientRegistry::new());
        let router = EventRouter::new(Arc::clone(&registry));
        let mut a = registry.acquire("session-a");
        let mut b = registry.acquire("session-b");

        router.route(event("chat", json!({"sessionKey": "session-a", "text": "hi"})));

        let Some(SessionEvent::Event(ev)) = a.try_next() else {
            panic!("session-a listener missed its event");
        };
        assert_eq!(ev.payload["text"], "hi");
        assert!(b.try_next().is_none());
    }

    #[tokio::test]
    async fn unroutable_events_are_dropped() {
        let registry = Arc::new(SharedClientRegistry::new());
        let router = EventRouter::new(Arc::clone(&registry));
        let mut listener = registry.acquire("session-a");

        // No session key at all, and a key nobody listens to.
        router.route(event("tick", json!({"ts": 1})));
        router.route(event("chat", json!({"sessionKey": "elsewhere"})));

        assert!(listener.try_next().is_none());
    }
}
