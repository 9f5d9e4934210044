//! Conversion of component events into room-level [`SharedEvent`]s.
//!
//! Each component publishes its own typed events. The room forwards them onto
//! one `EventBus<SharedEvent>` that observers and the transport subscribe to.

use lurk_camouflage::SessionEvent;
use lurk_security::ViolationEvent;
use lurk_shared::{DiscoveryEvent, EventBus, SharedEvent};

use crate::interaction::InteractionResult;

/// Maps a session lifecycle event.
#[must_use]
pub fn from_session(event: &SessionEvent) -> SharedEvent {
    match event {
        SessionEvent::Activated(record) => SharedEvent::Activated {
            participant: record.participant,
            disguise_id: record.disguise.id.clone(),
            object_kind: record.disguise.kind().as_str().to_owned(),
            difficulty: record.disguise.difficulty.as_str().to_owned(),
            believability: record.disguise.believability(),
            position: record.position,
            started_at: record.started_at,
            expires_at: record.disguise.expires_at,
        },
        SessionEvent::Deactivated { record, reason } => SharedEvent::Deactivated {
            participant: record.participant,
            disguise_id: record.disguise.id.clone(),
            reason: *reason,
            ended_at: record.ended_at.unwrap_or(record.started_at),
        },
    }
}

/// Maps a movement violation.
#[must_use]
pub fn from_violation(event: &ViolationEvent) -> SharedEvent {
    SharedEvent::Violation {
        participant: event.participant,
        implied_speed: event.implied_speed,
        allowed_speed: event.allowed_speed,
        violations: event.violations,
        timestamp: event.timestamp,
    }
}

/// Maps a delivered discovery.
#[must_use]
pub fn from_discovery(event: &DiscoveryEvent) -> SharedEvent {
    SharedEvent::Discovered {
        discovery: event.clone(),
    }
}

/// Maps a resolved interaction.
#[must_use]
pub fn from_interaction(result: &InteractionResult) -> SharedEvent {
    SharedEvent::InteractionResult {
        seeker: result.seeker,
        target_id: result.target_id.clone(),
        success: result.success,
        confidence: result.confidence,
        discovered: result.discovered,
        timestamp: result.timestamp,
    }
}

/// Forwards every event on `source` to `sink` through `convert`.
pub fn forward<E, F>(source: &EventBus<E>, sink: &EventBus<SharedEvent>, convert: F)
where
    E: 'static,
    F: Fn(&E) -> SharedEvent + Send + Sync + 'static,
{
    let sink = sink.clone();
    source.subscribe(move |event| {
        sink.publish(&convert(event));
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use lurk_shared::{EventType, ParticipantId, Vec3};

    #[test]
    fn test_violation_mapping() {
        let event = ViolationEvent {
            participant: ParticipantId(2),
            requested: Vec3::new(5.0, 0.0, 0.0),
            corrected: Vec3::new(1.0, 0.0, 0.0),
            implied_speed: 5.0,
            allowed_speed: 1.0,
            violations: 3,
            timestamp: 10,
        };
        let shared = from_violation(&event);
        assert_eq!(shared.event_type(), EventType::Violation);
        assert_eq!(shared.participant(), ParticipantId(2));
    }

    #[test]
    fn test_forwarding() {
        let source: EventBus<DiscoveryEvent> = EventBus::new("discovery");
        let sink: EventBus<SharedEvent> = EventBus::new("room");
        let (_, rx) = sink.subscribe_channel(8);
        forward(&source, &sink, from_discovery);

        let event = DiscoveryEvent {
            id: 1,
            participant: ParticipantId(4),
            discoverer: None,
            method: lurk_shared::DiscoveryMethod::Timeout,
            position: Vec3::ZERO,
            timestamp: 5,
            confidence: 1.0,
        };
        source.publish(&event);

        let received = rx.drain();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0], SharedEvent::Discovered { discovery: event });
    }
}
