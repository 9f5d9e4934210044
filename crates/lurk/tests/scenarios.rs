//! End-to-end match scenarios driven through the `Room` facade.

use std::sync::Arc;

use lurk::camouflage::{
    DisguiseGenerator, EnvironmentScanner, GenerationRequest, InMemoryWorld, ObjectKind,
    ScriptedAppearance, SpatialObject,
};
use lurk::shared::events::DeactivationReason;
use lurk::shared::{DiscoveryMethod, EventType, ParticipantId, PlayerAction, SharedEvent, Vec3};
use lurk::{
    InteractionError, InteractionOutcome, ManualClock, MemoryBlobStore, ParticipantProfile,
    ProximityHint, Room, RoomConfig, RoomError,
};

const T0: u64 = 1_700_000_000_000;
const HIDER: ParticipantId = ParticipantId(1);
const SEEKER: ParticipantId = ParticipantId(2);

fn cube(id: u64, kind: ObjectKind, at: Vec3, edge: f32) -> SpatialObject {
    SpatialObject::new(id, kind, at, Vec3::new(edge, edge, edge))
}

fn box_world() -> Vec<SpatialObject> {
    vec![cube(1, ObjectKind::Box, Vec3::new(1.0, 0.0, 1.0), 2.0)]
}

fn box_and_tree_world() -> Vec<SpatialObject> {
    vec![
        cube(1, ObjectKind::Box, Vec3::new(1.0, 0.0, 1.0), 2.0),
        cube(2, ObjectKind::Tree, Vec3::new(-1.0, 0.0, -1.0), 1.5),
    ]
}

struct Harness {
    room: Room,
    clock: ManualClock,
    appearance: Arc<ScriptedAppearance>,
}

fn harness(config: RoomConfig, objects: Vec<SpatialObject>) -> Harness {
    let clock = ManualClock::new(T0);
    let appearance = Arc::new(ScriptedAppearance::new());
    let room = Room::new(
        config,
        Arc::new(InMemoryWorld::with_objects(objects)),
        appearance.clone(),
    )
    .unwrap()
    .with_clock(Arc::new(clock.clone()));
    Harness {
        room,
        clock,
        appearance,
    }
}

/// Probes at distance zero always succeed with these weights.
fn certain_probe_config() -> RoomConfig {
    let mut config = RoomConfig::default();
    config.interaction.base_success = 1.0;
    config.interaction.believability_weight = 0.0;
    config
}

#[test]
fn scenario_a_single_box_yields_box_option() {
    let world = InMemoryWorld::with_objects(box_world());
    let candidates = EnvironmentScanner::default().scan(&world, Vec3::ZERO);
    assert_eq!(candidates.len(), 1);
    assert!(candidates[0].score > 0.0);

    let options = DisguiseGenerator::default().generate(&GenerationRequest::new(
        &candidates,
        Vec3::ZERO,
        T0,
    ));
    assert!(!options.is_empty());
    assert!(options.iter().any(|o| o.kind() == ObjectKind::Box && o.has_tag("box")));

    let mut h = harness(RoomConfig::default(), box_world());
    h.room
        .register_participant(HIDER, ParticipantProfile::hider(Vec3::ZERO))
        .unwrap();
    let preview = h.room.disguise_options(HIDER).unwrap();
    assert_eq!(preview.len(), 1);
    assert_eq!(preview[0].kind(), ObjectKind::Box);
}

#[tokio::test]
async fn scenario_b_proximity_dwell_discovers() {
    let mut h = harness(RoomConfig::default(), box_world());
    let (_, feed) = h.room.subscribe_channel(64);
    h.room
        .register_participant(HIDER, ParticipantProfile::hider(Vec3::ZERO))
        .unwrap();
    h.room
        .register_participant(SEEKER, ParticipantProfile::seeker(Vec3::new(0.5, 0.0, 0.0)))
        .unwrap();
    h.room.activate_disguise(HIDER, None).await.unwrap();
    assert_eq!(h.room.proximity_hint(SEEKER).unwrap(), ProximityHint::Hot);

    h.clock.advance(2_999);
    assert!(h.room.tick().await.discovered.is_empty());

    h.clock.advance(1);
    let report = h.room.tick().await;
    assert_eq!(report.discovered.len(), 1);
    let event = &report.discovered[0];
    assert_eq!(event.participant, HIDER);
    assert_eq!(event.discoverer, Some(SEEKER));
    assert_eq!(event.method, DiscoveryMethod::Proximity);
    assert!((event.confidence - 0.7).abs() < 1e-6);

    assert!(h.room.is_discovered(HIDER));
    assert_eq!(h.room.discovered_participants(), vec![HIDER]);
    assert!(h.room.active_session(HIDER).is_none());
    assert_eq!(
        h.room.session_history().last().and_then(|r| r.end_reason),
        Some(DeactivationReason::Discovered)
    );
    assert_eq!(h.appearance.reverted(), 1);

    // Broadcast waits for the notification delay.
    let before: Vec<_> = feed
        .drain()
        .into_iter()
        .filter(|e| e.event_type() == EventType::Discovered)
        .collect();
    assert!(before.is_empty());

    h.clock.advance(500);
    let report = h.room.tick().await;
    assert_eq!(report.delivered.len(), 1);
    let after: Vec<_> = feed
        .drain()
        .into_iter()
        .filter(|e| e.event_type() == EventType::Discovered)
        .collect();
    assert_eq!(after.len(), 1);
}

#[tokio::test]
async fn scenario_b_separation_cancels_dwell() {
    let mut h = harness(RoomConfig::default(), box_world());
    h.room
        .register_participant(HIDER, ParticipantProfile::hider(Vec3::ZERO))
        .unwrap();
    h.room
        .register_participant(SEEKER, ParticipantProfile::seeker(Vec3::new(0.5, 0.0, 0.0)))
        .unwrap();
    h.room.activate_disguise(HIDER, None).await.unwrap();

    h.clock.advance(2_000);
    let check = h
        .room
        .validate_movement(SEEKER, Vec3::new(4.5, 0.0, 0.0), 1.0)
        .await
        .unwrap();
    assert!(check.accepted);

    h.clock.advance(2_000);
    assert!(h.room.tick().await.discovered.is_empty());
    assert!(!h.room.is_discovered(HIDER));
    assert!(h.room.active_session(HIDER).is_some());
}

#[tokio::test]
async fn scenario_b_redisguising_does_not_reset_dwell() {
    let mut h = harness(RoomConfig::default(), box_and_tree_world());
    h.room
        .register_participant(HIDER, ParticipantProfile::hider(Vec3::ZERO))
        .unwrap();
    h.room
        .register_participant(SEEKER, ParticipantProfile::seeker(Vec3::new(0.5, 0.0, 0.0)))
        .unwrap();
    h.room
        .activate_disguise(HIDER, Some(ObjectKind::Box))
        .await
        .unwrap();

    let kinds = [ObjectKind::Tree, ObjectKind::Box, ObjectKind::Tree];
    let mut discovered_at = None;
    for (round, kind) in kinds.into_iter().enumerate() {
        h.clock.advance(1_500);
        let report = h.room.tick().await;
        if let Some(event) = report.discovered.first() {
            discovered_at = Some((round, event.clone()));
            break;
        }
        h.room.activate_disguise(HIDER, Some(kind)).await.unwrap();
    }

    let (round, event) = discovered_at.expect("seeker stood next to the hider for 3 s");
    assert_eq!(round, 1);
    assert_eq!(event.method, DiscoveryMethod::Proximity);
    assert_eq!(event.discoverer, Some(SEEKER));
    assert!(h.room.is_discovered(HIDER));
    assert!(matches!(
        h.room.activate_disguise(HIDER, Some(ObjectKind::Box)).await,
        Err(RoomError::AlreadyDiscovered(HIDER))
    ));
}

#[tokio::test]
async fn scenario_c_hider_cannot_interact() {
    let mut h = harness(RoomConfig::default(), box_world());
    h.room
        .register_participant(HIDER, ParticipantProfile::hider(Vec3::ZERO))
        .unwrap();
    h.room.register_object("barrel-1", Vec3::new(0.5, 0.0, 0.0)).unwrap();
    let before = h.room.snapshot();

    let err = h.room.start_interaction(HIDER, None).await.unwrap_err();
    assert!(matches!(
        err,
        RoomError::RoleViolation {
            participant: HIDER,
            ..
        }
    ));
    assert_eq!(h.room.snapshot(), before);
    assert_eq!(h.room.interaction_stats().resolved, 0);
}

#[tokio::test]
async fn scenario_d_reactivation_keeps_one_record() {
    let mut h = harness(RoomConfig::default(), box_and_tree_world());
    h.room
        .register_participant(HIDER, ParticipantProfile::hider(Vec3::ZERO))
        .unwrap();

    let first = h
        .room
        .activate_disguise(HIDER, Some(ObjectKind::Box))
        .await
        .unwrap();
    assert_eq!(first.record.disguise.kind(), ObjectKind::Box);

    let second = h
        .room
        .activate_disguise(HIDER, Some(ObjectKind::Tree))
        .await
        .unwrap();
    assert_eq!(second.record.disguise.kind(), ObjectKind::Tree);
    assert_eq!(
        second.replaced.as_ref().map(|r| r.disguise.id.clone()),
        Some(first.record.disguise.id.clone())
    );

    let active = h.room.active_session(HIDER).unwrap();
    assert_eq!(active.disguise.kind(), ObjectKind::Tree);
    assert_eq!(h.room.snapshot().active_sessions.len(), 1);
    assert_eq!(h.room.session_history().count(), 1);
    assert_eq!(h.appearance.applied(), 2);
    assert_eq!(h.appearance.reverted(), 1);
}

#[tokio::test]
async fn scenario_e_overspeed_is_clamped() {
    let mut h = harness(RoomConfig::default(), Vec::new());
    let (_, feed) = h.room.subscribe_channel(8);
    h.room
        .register_participant(
            HIDER,
            ParticipantProfile::hider(Vec3::ZERO).with_base_speed(1.0),
        )
        .unwrap();

    let check = h
        .room
        .validate_movement(HIDER, Vec3::new(5.0, 0.0, 0.0), 1.0)
        .await
        .unwrap();
    assert!(check.violation);
    assert!(!check.accepted);
    assert!(check.position.length() <= 1.0 + 1e-5);
    assert_eq!(h.room.position(HIDER), Some(check.position));
    assert_eq!(h.room.movement_state(HIDER).unwrap().violations, 1);
    assert_eq!(h.room.violation_stats().violations, 1);

    let events = feed.drain();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type(), EventType::Violation);
}

#[tokio::test]
async fn interaction_success_discovers_and_blocks_reactivation() {
    let mut h = harness(certain_probe_config(), box_world());
    h.room
        .register_participant(HIDER, ParticipantProfile::hider(Vec3::ZERO))
        .unwrap();
    h.room
        .register_participant(SEEKER, ParticipantProfile::seeker(Vec3::ZERO))
        .unwrap();
    h.room.activate_disguise(HIDER, None).await.unwrap();

    let outcome = h.room.start_interaction(SEEKER, None).await.unwrap();
    let InteractionOutcome::Resolved(result) = outcome else {
        panic!("expected an immediate result");
    };
    assert!(result.success);
    assert_eq!(result.discovered, Some(HIDER));
    assert!((result.confidence - 1.0).abs() < 1e-6);

    let log = h.room.discovery_log();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].method, DiscoveryMethod::Interaction);
    assert!(h.room.active_session(HIDER).is_none());

    assert_eq!(
        h.room.activate_disguise(HIDER, None).await.unwrap_err(),
        RoomError::AlreadyDiscovered(HIDER)
    );
    assert!(h.room.reset_discovery(HIDER));
    assert!(h.room.activate_disguise(HIDER, None).await.is_ok());
    assert_eq!(h.room.discovery_log().len(), 1);
}

#[tokio::test]
async fn failed_probe_raises_suspicion() {
    let mut config = RoomConfig::default();
    config.interaction.base_success = 0.0;
    let mut h = harness(config, box_world());
    h.room
        .register_participant(HIDER, ParticipantProfile::hider(Vec3::ZERO))
        .unwrap();
    h.room
        .register_participant(SEEKER, ParticipantProfile::seeker(Vec3::new(1.0, 0.0, 0.0)))
        .unwrap();
    h.room.activate_disguise(HIDER, None).await.unwrap();

    let outcome = h.room.start_interaction(SEEKER, None).await.unwrap();
    assert!(matches!(outcome, InteractionOutcome::Resolved(ref r) if !r.success));
    assert!(!h.room.is_discovered(HIDER));

    let targets = h.room.nearby_targets(SEEKER, 3.0).unwrap();
    assert_eq!(targets.len(), 1);
    assert!((targets[0].0.suspicion - 1.2).abs() < 1e-6);

    let err = h.room.start_interaction(SEEKER, None).await.unwrap_err();
    assert!(matches!(
        err,
        RoomError::Interaction(InteractionError::OnCooldown { .. })
    ));
}

#[tokio::test]
async fn pending_probe_resolves_on_tick_and_can_be_cancelled() {
    let mut config = certain_probe_config();
    config.interaction.interaction_duration_ms = 1_000;
    let mut h = harness(config, box_world());
    h.room
        .register_participant(HIDER, ParticipantProfile::hider(Vec3::ZERO))
        .unwrap();
    h.room
        .register_participant(SEEKER, ParticipantProfile::seeker(Vec3::ZERO))
        .unwrap();
    h.room.activate_disguise(HIDER, None).await.unwrap();

    let outcome = h.room.start_interaction(SEEKER, None).await.unwrap();
    assert!(matches!(outcome, InteractionOutcome::Pending(_)));
    assert!(h.room.cancel_interaction(SEEKER));
    assert!(!h.room.cancel_interaction(SEEKER));
    assert_eq!(h.room.interaction_stats().cancelled, 1);

    h.clock.advance(600);
    assert!(matches!(
        h.room.start_interaction(SEEKER, None).await.unwrap(),
        InteractionOutcome::Pending(_)
    ));
    h.clock.advance(999);
    assert!(h.room.tick().await.resolved.is_empty());

    h.clock.advance(1);
    let report = h.room.tick().await;
    assert_eq!(report.resolved.len(), 1);
    assert_eq!(report.discovered.len(), 1);
    assert_eq!(report.discovered[0].method, DiscoveryMethod::Interaction);
}

#[tokio::test]
async fn abrupt_move_next_to_seeker_discovers() {
    let mut h = harness(RoomConfig::default(), box_world());
    h.room
        .register_participant(HIDER, ParticipantProfile::hider(Vec3::ZERO))
        .unwrap();
    h.room
        .register_participant(SEEKER, ParticipantProfile::seeker(Vec3::new(0.0, 0.0, 2.0)))
        .unwrap();
    h.room.activate_disguise(HIDER, None).await.unwrap();

    // Along the locked heading, within the disguised speed cap.
    let check = h
        .room
        .validate_movement(HIDER, Vec3::new(0.0, 0.0, 2.0), 1.0)
        .await
        .unwrap();
    assert!(!check.violation);

    let log = h.room.discovery_log();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].method, DiscoveryMethod::Movement);
    assert_eq!(log[0].discoverer, Some(SEEKER));
    assert!(h.room.active_session(HIDER).is_none());
}

#[tokio::test]
async fn timeout_discovers_long_disguise() {
    let mut config = RoomConfig::default();
    config.discovery.max_disguise_time_ms = 5_000;
    let mut h = harness(config, box_world());
    h.room
        .register_participant(HIDER, ParticipantProfile::hider(Vec3::ZERO))
        .unwrap();
    h.room.activate_disguise(HIDER, None).await.unwrap();

    h.clock.advance(5_000);
    let report = h.room.tick().await;
    assert_eq!(report.discovered.len(), 1);
    assert_eq!(report.discovered[0].method, DiscoveryMethod::Timeout);
    assert_eq!(report.discovered[0].discoverer, None);
    assert!(h.room.active_session(HIDER).is_none());
}

#[tokio::test]
async fn disguise_restrictions_block_actions() {
    let mut h = harness(RoomConfig::default(), box_world());
    h.room
        .register_participant(HIDER, ParticipantProfile::hider(Vec3::ZERO))
        .unwrap();
    assert!(h.room.is_action_allowed(HIDER, PlayerAction::Sprint).unwrap());

    // A lone box at this distance lands in the hard band.
    h.room.activate_disguise(HIDER, None).await.unwrap();
    assert!(!h.room.is_action_allowed(HIDER, PlayerAction::Sprint).unwrap());
    assert!(!h.room.is_action_allowed(HIDER, PlayerAction::Jump).unwrap());

    assert!(h.room.deactivate_disguise(HIDER).await.unwrap());
    assert!(h.room.is_action_allowed(HIDER, PlayerAction::Jump).unwrap());
}

#[tokio::test]
async fn failed_apply_leaves_no_session() {
    let mut h = harness(RoomConfig::default(), box_world());
    h.room
        .register_participant(HIDER, ParticipantProfile::hider(Vec3::ZERO))
        .unwrap();
    h.appearance.fail_next_apply(1);

    let err = h.room.activate_disguise(HIDER, None).await.unwrap_err();
    assert!(matches!(err, RoomError::Camouflage(_)));
    assert!(h.room.active_session(HIDER).is_none());
    assert!(!h.room.movement_state(HIDER).unwrap().is_restricted);
    assert!(h.room.nearby_targets(HIDER, 5.0).unwrap().is_empty());
}

#[tokio::test]
async fn events_reach_subscribers_and_snapshot_persists() {
    let mut h = harness(RoomConfig::default(), box_world());
    let names = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = Arc::clone(&names);
    let id = h.room.subscribe(move |event: &SharedEvent| sink.lock().push(event.name()));

    h.room
        .register_participant(HIDER, ParticipantProfile::hider(Vec3::ZERO))
        .unwrap();
    h.room.activate_disguise(HIDER, None).await.unwrap();
    h.room.deactivate_disguise(HIDER).await.unwrap();
    assert_eq!(*names.lock(), vec!["activated", "deactivated"]);

    assert!(h.room.unsubscribe(id));
    h.room.activate_disguise(HIDER, None).await.unwrap();
    assert_eq!(names.lock().len(), 2);

    let store = MemoryBlobStore::new();
    h.room.persist(&store, "room/1").await.unwrap();
    let loaded = lurk::load_snapshot(&store, "room/1", 100)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loaded.active_sessions.len(), 1);
    assert_eq!(loaded.history.len(), 1);
    assert_eq!(loaded, h.room.snapshot());
}
