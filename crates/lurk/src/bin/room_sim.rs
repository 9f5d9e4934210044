//! # Room Simulation Binary
//!
//! Plays a scripted match against the in-memory collaborators:
//! two hiders disguise, one seeker sweeps the room probing as it goes.
//!
//! Usage: `room_sim [config.toml]`

use std::sync::Arc;

use lurk::camouflage::{InMemoryWorld, ObjectKind, ScriptedAppearance, SpatialObject};
use lurk::shared::{EventType, ParticipantId, SharedEvent, Vec3};
use lurk::{ManualClock, MemoryBlobStore, ParticipantProfile, Room, RoomConfig};

const TICK_MS: u64 = 250;
const MATCH_MS: u64 = 30_000;
const PROBE_EVERY_MS: u64 = 2_000;

fn build_world() -> InMemoryWorld {
    let mut objects = Vec::new();
    let layout = [
        (ObjectKind::Crate, Vec3::new(1.0, 0.0, 1.0), 1.5),
        (ObjectKind::Barrel, Vec3::new(-1.5, 0.0, 0.5), 1.0),
        (ObjectKind::Bush, Vec3::new(6.5, 0.0, 1.0), 1.2),
        (ObjectKind::Tree, Vec3::new(7.0, 0.0, -2.0), 2.5),
        (ObjectKind::Rock, Vec3::new(5.0, 0.0, -1.0), 0.8),
        (ObjectKind::Chair, Vec3::new(-4.0, 0.0, 3.0), 0.7),
        (ObjectKind::Table, Vec3::new(-3.0, 0.0, 3.5), 1.6),
        (ObjectKind::Wall, Vec3::new(0.0, 0.0, -6.0), 4.0),
    ];
    for (i, (kind, position, edge)) in layout.into_iter().enumerate() {
        objects.push(SpatialObject::new(
            i as u64 + 1,
            kind,
            position,
            Vec3::new(edge, edge, edge),
        ));
    }
    InMemoryWorld::with_objects(objects)
}

fn step_toward(from: Vec3, to: Vec3, max_step: f32) -> Vec3 {
    let delta = to - from;
    let distance = delta.length();
    if distance <= max_step || distance == 0.0 {
        to
    } else {
        from + delta * (max_step / distance)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = match std::env::args().nth(1) {
        Some(path) => RoomConfig::load(path)?,
        None => RoomConfig::default(),
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;
    runtime.block_on(run(config))
}

async fn run(config: RoomConfig) -> Result<(), Box<dyn std::error::Error>> {
    let clock = ManualClock::new(1_700_000_000_000);
    let appearance = Arc::new(ScriptedAppearance::new());
    let mut room = Room::new(config, Arc::new(build_world()), appearance.clone())?
        .with_clock(Arc::new(clock.clone()));

    let (_, feed) = room.subscribe_channel(256);
    room.subscribe_to(EventType::Discovered, |event| {
        if let SharedEvent::Discovered { discovery } = event {
            println!(
                "  >> {} discovered by {:?} ({:?}, confidence {:.2})",
                discovery.participant, discovery.discoverer, discovery.method, discovery.confidence
            );
        }
    });

    let hiders = [
        (ParticipantId(1), Vec3::new(0.0, 0.0, 0.0)),
        (ParticipantId(2), Vec3::new(6.0, 0.0, 0.0)),
    ];
    let seeker = ParticipantId(10);

    println!("╔══════════════════════════════════════════════════════════════════╗");
    println!("║                      LURK ROOM SIMULATION                        ║");
    println!("╠══════════════════════════════════════════════════════════════════╣");
    println!("║  2 hiders, 1 seeker, {MATCH_MS} ms match, {TICK_MS} ms ticks              ║");
    println!("╚══════════════════════════════════════════════════════════════════╝");
    println!();

    for (id, position) in hiders {
        room.register_participant(id, ParticipantProfile::hider(position).with_skill(0.5))?;
        let options = room.disguise_options(id)?;
        println!("{id} offered {} option(s):", options.len());
        for option in &options {
            println!(
                "    {:<8} believability {:.2} ({}, {} ms)",
                option.kind().as_str(),
                option.believability(),
                option.difficulty,
                option.duration_ms
            );
        }
        let activation = room.activate_disguise(id, None).await?;
        println!(
            "{id} is now a {} until t+{} ms",
            activation.record.disguise.kind(),
            activation.record.disguise.expires_at - activation.record.started_at
        );
    }

    room.register_participant(
        seeker,
        ParticipantProfile::seeker(Vec3::new(-5.0, 0.0, 0.0)).with_base_speed(3.0),
    )?;
    println!();

    let dt = TICK_MS as f32 / 1_000.0;
    let mut elapsed = 0;
    while elapsed < MATCH_MS {
        clock.advance(TICK_MS);
        elapsed += TICK_MS;

        let current = room.position(seeker).unwrap_or(Vec3::ZERO);
        let goal = hiders
            .iter()
            .find(|(id, _)| !room.is_discovered(*id))
            .map_or(current, |(_, p)| *p);
        let next = step_toward(current, goal, 2.0 * dt);
        room.validate_movement(seeker, next, dt).await?;

        if elapsed % PROBE_EVERY_MS == 0 {
            match room.start_interaction(seeker, None).await {
                Ok(outcome) => println!("t+{elapsed:>5} ms probe: {outcome:?}"),
                Err(err) => println!("t+{elapsed:>5} ms probe: {err}"),
            }
        }

        room.tick().await;
    }

    let store = MemoryBlobStore::new();
    room.persist(&store, "room/sim").await?;

    let events = feed.drain();
    let stats = room.violation_stats();
    let interactions = room.interaction_stats();

    println!();
    println!("╔══════════════════════════════════════════════════════════════════╗");
    println!("║                         MATCH RESULTS                            ║");
    println!("╚══════════════════════════════════════════════════════════════════╝");
    println!();
    println!("┌─ DISCOVERY ──────────────────────────────────────────────────────┐");
    println!("│ Discovered:         {:?}", room.discovered_participants());
    for event in room.discovery_log() {
        println!(
            "│   #{} {} via {:?} at t+{} ms",
            event.id,
            event.participant,
            event.method,
            event.timestamp - 1_700_000_000_000
        );
    }
    println!("└──────────────────────────────────────────────────────────────────┘");
    println!("┌─ INTERACTIONS ───────────────────────────────────────────────────┐");
    println!("│ Resolved:           {}", interactions.resolved);
    println!("│ Successes:          {}", interactions.successes);
    println!("│ Discoveries:        {}", interactions.discoveries);
    println!("└──────────────────────────────────────────────────────────────────┘");
    println!("┌─ MOVEMENT ───────────────────────────────────────────────────────┐");
    println!("│ Checks:             {}", stats.checks);
    println!("│ Violations:         {}", stats.violations);
    println!("└──────────────────────────────────────────────────────────────────┘");
    println!("┌─ SESSIONS ───────────────────────────────────────────────────────┐");
    for record in room.session_history() {
        println!(
            "│ {} as {:<8} ended {:?}",
            record.participant,
            record.disguise.kind().as_str(),
            record.end_reason
        );
    }
    println!("│ Appearance calls:   {}", appearance.calls().len());
    println!("│ Events on the feed: {}", events.len());
    println!("│ Snapshot blobs:     {}", store.len());
    println!("└──────────────────────────────────────────────────────────────────┘");
    Ok(())
}
