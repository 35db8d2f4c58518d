use serde::Serialize;
use tracing::warn;

use crate::{
    dto::{
        session::SessionView,
        sse::{PhaseChangedEvent, ServerEvent, SystemStatus},
    },
    state::{SseHub, session::ControllerSnapshot},
};

const EVENT_PHASE_CHANGED: &str = "phase_changed";
const EVENT_SYSTEM_STATUS: &str = "system_status";

/// Broadcast the session snapshot after an applied transition.
pub fn broadcast_phase_changed(hub: &SseHub, snapshot: &ControllerSnapshot) {
    let payload = PhaseChangedEvent(SessionView::from(snapshot));
    send_event(hub, EVENT_PHASE_CHANGED, &payload);
}

/// Broadcast a degraded mode change.
pub fn broadcast_system_status(hub: &SseHub, degraded: bool) {
    send_event(hub, EVENT_SYSTEM_STATUS, &SystemStatus { degraded });
}

fn send_event(hub: &SseHub, event: &str, payload: &impl Serialize) {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(event) => hub.broadcast(event),
        Err(err) => warn!(event, error = %err, "failed to serialize SSE payload"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_status_is_named_and_serialized() {
        let hub = SseHub::new(4);
        let mut rx = hub.subscribe();

        broadcast_system_status(&hub, true);

        let event = rx.try_recv().unwrap();
        assert_eq!(event.event.as_deref(), Some("system_status"));
        assert_eq!(event.data, r#"{"degraded":true}"#);
    }
}
