// events.rs -- typed event sink handed to callers of the decode loop
//
// Ground: spec.md section 4.6's event kinds and the teacher's callback-trait
// shape (`ClientCallbacks` in cl_ents.rs), generalized from many
// effect-specific methods down to the five event kinds this spec names.
// Delivery is a plain `Vec` drain rather than a trait object with render
// callbacks, since this crate has no renderer to call back into.

use crate::entity::EntityState;
use crate::player::PlayerState;

#[derive(Debug, Clone)]
pub enum EventPayload {
    Console { level: i32, text: String },
    Player(Box<PlayerState>),
    Entity(Box<EntityState>),
    /// `event` names what changed: `connected`, `map_change`, `player_join`,
    /// `player_leave`. `gamedir`/`mapname`/`player_num` are populated where
    /// meaningful for that event and left at their defaults otherwise.
    ServerInfo { event: &'static str, gamedir: String, mapname: String, player_num: i16 },
    Connection { state: &'static str },
}

#[derive(Debug, Clone)]
pub struct Event {
    pub kind: &'static str,
    pub timestamp_ms: u64,
    pub payload: EventPayload,
}

/// Accumulates events produced while decoding one packet. The decode loop
/// never blocks on delivery -- it only ever pushes here -- so a caller
/// draining the sink can't stall the receive path (spec.md section 4.6's
/// "must not block or reenter" rule).
#[derive(Debug, Default)]
pub struct EventSink {
    events: Vec<Event>,
}

impl EventSink {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn push(&mut self, timestamp_ms: u64, payload: EventPayload) {
        let kind = match &payload {
            EventPayload::Console { .. } => "console_message",
            EventPayload::Player(_) => "player_update",
            EventPayload::Entity(_) => "entity_update",
            EventPayload::ServerInfo { .. } => "server_info",
            EventPayload::Connection { .. } => "connection",
        };
        self.events.push(Event { kind, timestamp_ms, payload });
    }

    /// Drains all buffered events in arrival order.
    pub fn drain(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_tags_kind_from_payload() {
        let mut sink = EventSink::new();
        sink.push(1000, EventPayload::Console { level: 3, text: "hi".into() });
        let events = sink.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, "console_message");
    }

    #[test]
    fn drain_empties_the_sink_and_preserves_order() {
        let mut sink = EventSink::new();
        sink.push(1, EventPayload::Connection { state: "connected" });
        sink.push(2, EventPayload::Connection { state: "spawned" });
        let events = sink.drain();
        assert_eq!(events[0].timestamp_ms, 1);
        assert_eq!(events[1].timestamp_ms, 2);
        assert!(sink.is_empty());
    }
}
