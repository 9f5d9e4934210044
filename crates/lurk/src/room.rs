//! # Room Facade
//!
//! One [`Room`] per match. It owns every component and is the only thing
//! callers talk to:
//!
//! ```text
//!             ┌──────────────────────── Room ────────────────────────┐
//! caller ───> │ role checks ─> DisguiseSessionManager (scan/generate)│
//!             │            ─> MovementRestrictor                     │
//!             │            ─> InteractionGateway                     │
//!             │            ─> DiscoveryEngine ──> teardown on find   │
//!             │                                                      │
//!             │ component buses ──> EventBus<SharedEvent> ──> observers
//!             └──────────────────────────────────────────────────────┘
//! ```
//!
//! Operations run to completion on `&mut self`; the only suspension points
//! are appearance and storage calls. State is committed after those calls
//! return, never before.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;
use std::sync::Arc;

use lurk_camouflage::{
    Activation, ActivationRequest, AppearanceSnapshot, AppearanceTransformer,
    DisguiseSessionManager, DisguiseSessionRecord, GeneratedDisguise, ObjectKind, WorldQuery,
};
use lurk_security::{MovementCheck, MovementRestrictor, MovementState, ViolationStats};
use lurk_shared::events::DeactivationReason;
use lurk_shared::{
    DiscoveryEvent, DiscoveryMethod, EventBus, EventReceiver, EventType, ParticipantId,
    PlayerAction, Role, SharedEvent, SubscriptionId, TimestampMs, Vec3,
};

use crate::clock::{Clock, SystemClock};
use crate::config::RoomConfig;
use crate::discovery::{DiscoveryEngine, ProximityHint};
use crate::error::{RoomError, RoomResult};
use crate::events;
use crate::interaction::{
    InteractionGateway, InteractionOutcome, InteractionResult, InteractionStats,
    InteractionTarget, TargetKind,
};
use crate::persistence::{save_snapshot, BlobStore, RoomSnapshot};

/// How a participant joins the room.
#[derive(Clone, Debug, PartialEq)]
pub struct ParticipantProfile {
    /// Gameplay role.
    pub role: Role,
    /// Starting position.
    pub position: Vec3,
    /// Base movement speed; `None` uses the restrictor default.
    pub base_speed: Option<f32>,
    /// Appearance restored when a disguise ends.
    pub appearance: AppearanceSnapshot,
    /// Skill estimate in `[0, 1]`, used to tune disguise options.
    pub skill: Option<f32>,
}

impl ParticipantProfile {
    fn with_role(role: Role, position: Vec3) -> Self {
        Self {
            role,
            position,
            base_speed: None,
            appearance: AppearanceSnapshot::default(),
            skill: None,
        }
    }

    /// Hider at `position`.
    #[must_use]
    pub fn hider(position: Vec3) -> Self {
        Self::with_role(Role::Hider, position)
    }

    /// Seeker at `position`.
    #[must_use]
    pub fn seeker(position: Vec3) -> Self {
        Self::with_role(Role::Seeker, position)
    }

    /// Spectator at `position`.
    #[must_use]
    pub fn spectator(position: Vec3) -> Self {
        Self::with_role(Role::Spectator, position)
    }

    /// Sets the base speed.
    #[must_use]
    pub fn with_base_speed(mut self, speed: f32) -> Self {
        self.base_speed = Some(speed);
        self
    }

    /// Sets the appearance to restore on teardown.
    #[must_use]
    pub fn with_appearance(mut self, appearance: AppearanceSnapshot) -> Self {
        self.appearance = appearance;
        self
    }

    /// Sets the skill estimate.
    #[must_use]
    pub fn with_skill(mut self, skill: f32) -> Self {
        self.skill = Some(skill);
        self
    }
}

#[derive(Clone, Debug)]
struct Participant {
    role: Role,
    position: Vec3,
    appearance: AppearanceSnapshot,
    skill: Option<f32>,
}

/// What one [`Room::tick`] did.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TickReport {
    /// Tick time.
    pub now: TimestampMs,
    /// Pending probes resolved.
    pub resolved: Vec<InteractionResult>,
    /// Discoveries logged.
    pub discovered: Vec<DiscoveryEvent>,
    /// Participants whose disguise expired.
    pub expired: Vec<ParticipantId>,
    /// Discovery broadcasts delivered.
    pub delivered: Vec<DiscoveryEvent>,
}

/// Per-match state container.
pub struct Room {
    config: RoomConfig,
    clock: Arc<dyn Clock>,
    rng: ChaCha8Rng,
    participants: HashMap<ParticipantId, Participant>,
    sessions: DisguiseSessionManager,
    restrictor: MovementRestrictor,
    gateway: InteractionGateway,
    discovery: DiscoveryEngine,
    events: EventBus<SharedEvent>,
    ticks: u64,
    last_maintenance: Option<TimestampMs>,
}

impl std::fmt::Debug for Room {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Room")
            .field("participants", &self.participants.len())
            .field("sessions", &self.sessions)
            .field("ticks", &self.ticks)
            .finish_non_exhaustive()
    }
}

impl Room {
    /// Creates a room.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if `config` fails validation.
    pub fn new(
        config: RoomConfig,
        world: Arc<dyn WorldQuery>,
        appearance: Arc<dyn AppearanceTransformer>,
    ) -> RoomResult<Self> {
        config.validate()?;

        let sessions = DisguiseSessionManager::new(config.session.clone(), world, appearance)
            .with_scanner(config.scanner.clone())
            .with_generator(config.generator.clone());
        let restrictor = MovementRestrictor::new(config.movement.clone());
        let gateway = InteractionGateway::new(config.interaction.clone());
        let discovery = DiscoveryEngine::new(config.discovery.clone());

        let bus = EventBus::new("room");
        events::forward(sessions.events(), &bus, events::from_session);
        events::forward(restrictor.events(), &bus, events::from_violation);
        events::forward(gateway.events(), &bus, events::from_interaction);
        events::forward(discovery.events(), &bus, events::from_discovery);

        tracing::info!(seed = config.rng_seed, "room created");

        Ok(Self {
            rng: ChaCha8Rng::seed_from_u64(config.rng_seed),
            config,
            clock: Arc::new(SystemClock),
            participants: HashMap::new(),
            sessions,
            restrictor,
            gateway,
            discovery,
            events: bus,
            ticks: 0,
            last_maintenance: None,
        })
    }

    /// Replaces the time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Room configuration.
    #[must_use]
    pub fn config(&self) -> &RoomConfig {
        &self.config
    }

    /// Current room time.
    #[must_use]
    pub fn now(&self) -> TimestampMs {
        self.clock.now_ms()
    }

    // =========================================================================
    // Participants
    // =========================================================================

    /// Adds a participant.
    ///
    /// # Errors
    ///
    /// - `AlreadyRegistered` if the id is taken
    /// - `InvalidInput` for a non-finite position
    /// - `Movement` for a bad base speed
    pub fn register_participant(
        &mut self,
        participant: ParticipantId,
        profile: ParticipantProfile,
    ) -> RoomResult<()> {
        if self.participants.contains_key(&participant) {
            return Err(RoomError::AlreadyRegistered(participant));
        }
        if !profile.position.is_finite() {
            return Err(RoomError::InvalidInput(format!(
                "non-finite position for {participant}"
            )));
        }

        self.restrictor
            .register_participant(participant, profile.base_speed)?;
        if profile.role == Role::Seeker {
            let now = self.now();
            self.discovery.track_seeker(participant, profile.position, now);
        }

        self.participants.insert(
            participant,
            Participant {
                role: profile.role,
                position: profile.position,
                appearance: profile.appearance,
                skill: profile.skill,
            },
        );
        tracing::info!(%participant, role = %profile.role, "participant joined");
        Ok(())
    }

    /// Removes a participant, ending any disguise and pending probe.
    /// Returns `false` if the id was unknown.
    pub async fn unregister_participant(&mut self, participant: ParticipantId) -> bool {
        if !self.participants.contains_key(&participant) {
            return false;
        }
        let now = self.now();

        self.gateway.cancel_interaction(participant);
        self.teardown(participant, DeactivationReason::Unregistered, now)
            .await;
        self.restrictor.unregister_participant(participant);
        self.gateway.remove_participant(participant);
        self.discovery.forget(participant);
        self.sessions.forget_cache(participant);
        self.participants.remove(&participant);

        tracing::info!(%participant, "participant left");
        true
    }

    /// Role of a registered participant.
    #[must_use]
    pub fn role(&self, participant: ParticipantId) -> Option<Role> {
        self.participants.get(&participant).map(|p| p.role)
    }

    /// Server-side position of a registered participant.
    #[must_use]
    pub fn position(&self, participant: ParticipantId) -> Option<Vec3> {
        self.participants.get(&participant).map(|p| p.position)
    }

    /// Number of registered participants.
    #[must_use]
    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    // =========================================================================
    // Disguises
    // =========================================================================

    /// Disguise options the hider would be offered where they stand.
    ///
    /// # Errors
    ///
    /// `UnknownParticipant` or `RoleViolation` for non-hiders.
    pub fn disguise_options(
        &mut self,
        participant: ParticipantId,
    ) -> RoomResult<Vec<GeneratedDisguise>> {
        let (position, skill) = {
            let p = self.require_role(participant, Role::Hider, "preview disguises")?;
            (p.position, p.skill)
        };
        let now = self.now();
        Ok(self
            .sessions
            .generate_options(participant, position, skill, now))
    }

    /// Disguises a hider, replacing any current disguise.
    ///
    /// # Errors
    ///
    /// - `UnknownParticipant` / `RoleViolation` for non-hiders
    /// - `AlreadyDiscovered` until the hider's discovery is reset
    /// - `Camouflage` when nothing qualifies or the appearance call fails
    pub async fn activate_disguise(
        &mut self,
        participant: ParticipantId,
        preferred_kind: Option<ObjectKind>,
    ) -> RoomResult<Activation> {
        let (position, appearance, skill) = {
            let p = self.require_role(participant, Role::Hider, "activate a disguise")?;
            (p.position, p.appearance.clone(), p.skill)
        };
        if self.discovery.is_discovered(participant) {
            return Err(RoomError::AlreadyDiscovered(participant));
        }

        let now = self.now();
        let mut request = ActivationRequest::new(participant, position, appearance, now);
        if let Some(kind) = preferred_kind {
            request = request.with_preferred_kind(kind);
        }
        if let Some(skill) = skill {
            request = request.with_skill(skill);
        }

        let had_session = self.sessions.is_active(participant);
        let activation = match self.sessions.activate(request).await {
            Ok(activation) => activation,
            Err(err) => {
                // A failed apply after replacement leaves the hider undisguised.
                if had_session && !self.sessions.is_active(participant) {
                    self.release_disguise_state(participant);
                }
                return Err(err.into());
            }
        };

        let record = &activation.record;
        let target_id = InteractionTarget::participant_target_id(participant);
        let mut target = InteractionTarget::disguised(
            participant,
            record.position,
            record.disguise.believability(),
        );
        if activation.replaced.is_some() {
            // Same hider under a new disguise: dwell timers and suspicion stay.
            if let Some(previous) = self.gateway.target(&target_id) {
                target = target.with_suspicion(previous.suspicion);
            }
            self.restrictor.remove_restrictions(participant)?;
            self.discovery
                .retarget_hider(participant, record.position, record.started_at);
        } else {
            self.release_disguise_state(participant);
            self.discovery
                .track_hider(participant, record.position, record.started_at);
        }
        self.restrictor
            .apply_restrictions(participant, &record.restrictions)?;
        self.gateway.register_target(target)?;

        Ok(activation)
    }

    /// Ends the hider's disguise. Returns `false` if none was active.
    ///
    /// # Errors
    ///
    /// - `UnknownParticipant` for unknown ids
    /// - `Camouflage` if the revert fails; the disguise stays active
    pub async fn deactivate_disguise(&mut self, participant: ParticipantId) -> RoomResult<bool> {
        if !self.participants.contains_key(&participant) {
            return Err(RoomError::UnknownParticipant(participant));
        }
        let now = self.now();
        match self.sessions.deactivate(participant, now).await? {
            Some(_) => {
                self.release_disguise_state(participant);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// The participant's live session, if any.
    #[must_use]
    pub fn active_session(&self, participant: ParticipantId) -> Option<&DisguiseSessionRecord> {
        self.sessions.active_session(participant)
    }

    /// Ended sessions, oldest first.
    pub fn session_history(&self) -> impl Iterator<Item = &DisguiseSessionRecord> {
        self.sessions.history()
    }

    // =========================================================================
    // Objects and interactions
    // =========================================================================

    /// Registers a static inspectable object.
    ///
    /// # Errors
    ///
    /// `InvalidInput` for an empty id, a non-finite position or an id in the
    /// `participant:` namespace.
    pub fn register_object(&mut self, id: impl Into<String>, position: Vec3) -> RoomResult<()> {
        let target = InteractionTarget::object(id, position);
        if InteractionTarget::is_participant_target_id(&target.id) {
            return Err(RoomError::InvalidInput(format!(
                "target id '{}' is reserved",
                target.id
            )));
        }
        self.gateway.register_target(target)?;
        Ok(())
    }

    /// Removes a static object. Returns `false` if no such object exists.
    pub fn unregister_object(&mut self, id: &str) -> bool {
        match self.gateway.target(id) {
            Some(target) if target.kind == TargetKind::Object => {
                self.gateway.unregister_target(id)
            }
            _ => false,
        }
    }

    /// Probes a target, or the nearest one when `target_id` is `None`.
    ///
    /// # Errors
    ///
    /// - `UnknownParticipant` / `RoleViolation` for non-seekers; nothing is mutated
    /// - `Interaction` for cooldowns, unknown targets or nothing in reach
    pub async fn start_interaction(
        &mut self,
        seeker: ParticipantId,
        target_id: Option<&str>,
    ) -> RoomResult<InteractionOutcome> {
        let position = self
            .require_role(seeker, Role::Seeker, "start an interaction")?
            .position;
        let now = self.now();

        let outcome =
            self.gateway
                .start_interaction(seeker, position, target_id, now, &mut self.rng)?;
        if let InteractionOutcome::Resolved(result) = &outcome {
            self.apply_interaction(result).await;
        }
        Ok(outcome)
    }

    /// Aborts a pending probe. Safe when idle.
    pub fn cancel_interaction(&mut self, seeker: ParticipantId) -> bool {
        self.gateway.cancel_interaction(seeker)
    }

    /// Targets within `radius` of the participant, nearest first.
    ///
    /// # Errors
    ///
    /// `UnknownParticipant` for unknown ids.
    pub fn nearby_targets(
        &self,
        participant: ParticipantId,
        radius: f32,
    ) -> RoomResult<Vec<(InteractionTarget, f32)>> {
        let position = self
            .participants
            .get(&participant)
            .ok_or(RoomError::UnknownParticipant(participant))?
            .position;
        Ok(self
            .gateway
            .targets_within(position, radius)
            .into_iter()
            .map(|(target, distance)| (target.clone(), distance))
            .collect())
    }

    /// Probe counters.
    #[must_use]
    pub fn interaction_stats(&self) -> InteractionStats {
        self.gateway.stats()
    }

    // =========================================================================
    // Movement
    // =========================================================================

    /// Validates a move from the stored position and commits the result.
    ///
    /// A disguised hider who moves abruptly near a seeker may be discovered,
    /// which ends the disguise.
    ///
    /// # Errors
    ///
    /// `UnknownParticipant`, or `Movement` for non-finite input.
    pub async fn validate_movement(
        &mut self,
        participant: ParticipantId,
        requested: Vec3,
        dt: f32,
    ) -> RoomResult<MovementCheck> {
        let (role, current) = self
            .participants
            .get(&participant)
            .map(|p| (p.role, p.position))
            .ok_or(RoomError::UnknownParticipant(participant))?;
        let now = self.now();

        let check = self
            .restrictor
            .validate_movement(participant, current, requested, dt, now)?;
        if let Some(p) = self.participants.get_mut(&participant) {
            p.position = check.position;
        }

        match role {
            Role::Seeker => {
                self.discovery
                    .update_seeker_position(participant, check.position, now);
            }
            Role::Hider if self.sessions.is_active(participant) => {
                let target_id = InteractionTarget::participant_target_id(participant);
                self.gateway.update_target_position(&target_id, check.position);
                if self
                    .discovery
                    .update_hider_position(participant, check.position, now, &mut self.rng)
                    .is_some()
                {
                    self.teardown(participant, DeactivationReason::Discovered, now)
                        .await;
                }
            }
            _ => {}
        }
        Ok(check)
    }

    /// True unless the participant's disguise forbids `action`.
    ///
    /// # Errors
    ///
    /// `UnknownParticipant` for unknown ids.
    pub fn is_action_allowed(
        &self,
        participant: ParticipantId,
        action: PlayerAction,
    ) -> RoomResult<bool> {
        if !self.participants.contains_key(&participant) {
            return Err(RoomError::UnknownParticipant(participant));
        }
        Ok(self.restrictor.is_action_allowed(participant, action)?)
    }

    /// Movement state of a participant.
    #[must_use]
    pub fn movement_state(&self, participant: ParticipantId) -> Option<&MovementState> {
        self.restrictor.state(participant)
    }

    /// Aggregate violation counters.
    #[must_use]
    pub fn violation_stats(&self) -> ViolationStats {
        self.restrictor.violation_stats()
    }

    // =========================================================================
    // Discovery
    // =========================================================================

    /// Hot/warm/cold hint for a seeker.
    ///
    /// # Errors
    ///
    /// `UnknownParticipant` / `RoleViolation` for non-seekers.
    pub fn proximity_hint(&self, seeker: ParticipantId) -> RoomResult<ProximityHint> {
        self.require_role(seeker, Role::Seeker, "request a proximity hint")?;
        Ok(self.discovery.proximity_hint(seeker))
    }

    /// True if the participant is currently discovered.
    #[must_use]
    pub fn is_discovered(&self, participant: ParticipantId) -> bool {
        self.discovery.is_discovered(participant)
    }

    /// Discovered participants, ascending.
    #[must_use]
    pub fn discovered_participants(&self) -> Vec<ParticipantId> {
        self.discovery.discovered()
    }

    /// Every discovery so far, oldest first.
    #[must_use]
    pub fn discovery_log(&self) -> &[DiscoveryEvent] {
        self.discovery.log()
    }

    /// Clears one participant's discovered flag. The log is kept.
    pub fn reset_discovery(&mut self, participant: ParticipantId) -> bool {
        self.discovery.reset(participant)
    }

    /// Clears every discovered flag. The log is kept.
    pub fn reset_all_discoveries(&mut self) {
        self.discovery.reset_all();
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Runs one maintenance pass: pending probes, dwell timers, timeouts,
    /// disguise expiry and delayed broadcasts.
    pub async fn tick(&mut self) -> TickReport {
        let now = self.now();
        self.ticks += 1;
        let mut report = TickReport {
            now,
            ..TickReport::default()
        };

        report.resolved = self.gateway.resolve_due(now, &mut self.rng);
        for result in &report.resolved {
            if let Some(event) = self.apply_interaction(result).await {
                report.discovered.push(event);
            }
        }

        let passive = self.discovery.tick(now);
        for event in &passive.discovered {
            self.teardown(event.participant, DeactivationReason::Discovered, now)
                .await;
        }
        report.discovered.extend(passive.discovered);
        report.delivered = passive.delivered;

        for participant in self.sessions.expired(now) {
            if self
                .sessions
                .force_teardown(participant, DeactivationReason::Expired, now)
                .await
                .is_some()
            {
                self.release_disguise_state(participant);
                report.expired.push(participant);
            }
        }

        let maintenance_due = self.last_maintenance.map_or(true, |last| {
            now.saturating_sub(last) >= self.config.maintenance_interval_ms
        });
        if maintenance_due {
            self.sessions.prune_cache(now);
            self.last_maintenance = Some(now);
        }

        if !report.discovered.is_empty() || !report.expired.is_empty() {
            tracing::debug!(
                tick = self.ticks,
                discovered = report.discovered.len(),
                expired = report.expired.len(),
                "room tick"
            );
        }
        report
    }

    /// Maintenance passes run so far.
    #[must_use]
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    // =========================================================================
    // Events
    // =========================================================================

    /// Room event bus.
    #[must_use]
    pub fn events(&self) -> &EventBus<SharedEvent> {
        &self.events
    }

    /// Subscribes to every room event.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&SharedEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(listener)
    }

    /// Subscribes to one event type.
    pub fn subscribe_to<F>(&self, event_type: EventType, listener: F) -> SubscriptionId
    where
        F: Fn(&SharedEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(move |event: &SharedEvent| {
            if event.event_type() == event_type {
                listener(event);
            }
        })
    }

    /// Hands a bounded receiver to a transport.
    #[must_use]
    pub fn subscribe_channel(&self, capacity: usize) -> (SubscriptionId, EventReceiver<SharedEvent>) {
        self.events.subscribe_channel(capacity)
    }

    /// Removes a subscriber.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Serializable view of the room.
    #[must_use]
    pub fn snapshot(&self) -> RoomSnapshot {
        let mut active_sessions: Vec<DisguiseSessionRecord> =
            self.sessions.active_sessions().cloned().collect();
        active_sessions.sort_by_key(|r| r.participant);

        RoomSnapshot {
            taken_at: self.now(),
            ticks: self.ticks,
            discoveries: self.discovery.log().to_vec(),
            discovered: self.discovery.discovered(),
            active_sessions,
            history: self.sessions.history().cloned().collect(),
            violations: self.restrictor.violation_stats(),
            interactions: self.gateway.stats(),
        }
    }

    /// Writes a snapshot to `store` under `key`.
    ///
    /// # Errors
    ///
    /// `Persistence` on encoding, backend or timeout failures.
    pub async fn persist(&self, store: &dyn BlobStore, key: &str) -> RoomResult<()> {
        let snapshot = self.snapshot();
        save_snapshot(
            store,
            key,
            &snapshot,
            self.config.session.collaborator_timeout_ms,
        )
        .await?;
        Ok(())
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn require_role(
        &self,
        participant: ParticipantId,
        role: Role,
        operation: &'static str,
    ) -> RoomResult<&Participant> {
        let p = self
            .participants
            .get(&participant)
            .ok_or(RoomError::UnknownParticipant(participant))?;
        if p.role != role {
            tracing::warn!(%participant, role = %p.role, operation, "role violation");
            return Err(RoomError::RoleViolation {
                participant,
                role: p.role,
                operation,
            });
        }
        Ok(p)
    }

    /// Feeds a resolved probe back into discovery.
    async fn apply_interaction(&mut self, result: &InteractionResult) -> Option<DiscoveryEvent> {
        if let Some(hider) = result.discovered {
            let position = self
                .participants
                .get(&hider)
                .map_or(Vec3::ZERO, |p| p.position);
            return self
                .discover(
                    hider,
                    Some(result.seeker),
                    position,
                    DiscoveryMethod::Interaction,
                    result.confidence,
                    result.timestamp,
                )
                .await;
        }

        if !result.success && result.target_kind == Some(TargetKind::DisguisedParticipant) {
            if let Some(hider) = self
                .gateway
                .target(&result.target_id)
                .and_then(|t| t.participant)
            {
                self.discovery.record_failed_interaction(hider);
            }
        }
        None
    }

    async fn discover(
        &mut self,
        participant: ParticipantId,
        discoverer: Option<ParticipantId>,
        position: Vec3,
        method: DiscoveryMethod,
        confidence: f32,
        now: TimestampMs,
    ) -> Option<DiscoveryEvent> {
        let event = self.discovery.process_discovery(
            participant,
            discoverer,
            position,
            method,
            confidence,
            now,
        )?;
        self.teardown(participant, DeactivationReason::Discovered, now)
            .await;
        Some(event)
    }

    async fn teardown(
        &mut self,
        participant: ParticipantId,
        reason: DeactivationReason,
        now: TimestampMs,
    ) {
        self.sessions.force_teardown(participant, reason, now).await;
        self.release_disguise_state(participant);
    }

    /// Drops restrictions, the gateway target and dwell tracking.
    fn release_disguise_state(&mut self, participant: ParticipantId) {
        if self.restrictor.state(participant).is_some() {
            if let Err(err) = self.restrictor.remove_restrictions(participant) {
                tracing::warn!(%participant, error = %err, "could not lift restrictions");
            }
        }
        self.gateway
            .unregister_target(&InteractionTarget::participant_target_id(participant));
        self.discovery.untrack_hider(participant);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use lurk_camouflage::{InMemoryWorld, ScriptedAppearance, SpatialObject};

    const HIDER: ParticipantId = ParticipantId(1);
    const SEEKER: ParticipantId = ParticipantId(2);

    fn room_with(objects: Vec<SpatialObject>) -> (Room, ManualClock, Arc<ScriptedAppearance>) {
        let clock = ManualClock::new(1_000);
        let appearance = Arc::new(ScriptedAppearance::new());
        let room = Room::new(
            RoomConfig::default(),
            Arc::new(InMemoryWorld::with_objects(objects)),
            appearance.clone(),
        )
        .unwrap()
        .with_clock(Arc::new(clock.clone()));
        (room, clock, appearance)
    }

    fn crate_world() -> Vec<SpatialObject> {
        vec![SpatialObject::new(
            1,
            ObjectKind::Crate,
            Vec3::new(1.0, 0.0, 1.0),
            Vec3::new(2.0, 2.0, 2.0),
        )]
    }

    fn crate_and_tree_world() -> Vec<SpatialObject> {
        vec![
            SpatialObject::new(
                1,
                ObjectKind::Crate,
                Vec3::new(1.0, 0.0, 1.0),
                Vec3::new(2.0, 2.0, 2.0),
            ),
            SpatialObject::new(
                2,
                ObjectKind::Tree,
                Vec3::new(-1.0, 0.0, -1.0),
                Vec3::new(1.5, 1.5, 1.5),
            ),
        ]
    }

    #[test]
    fn test_register_twice() {
        let (mut room, _, _) = room_with(Vec::new());
        room.register_participant(HIDER, ParticipantProfile::hider(Vec3::ZERO))
            .unwrap();
        assert_eq!(
            room.register_participant(HIDER, ParticipantProfile::seeker(Vec3::ZERO)),
            Err(RoomError::AlreadyRegistered(HIDER))
        );
        assert_eq!(room.role(HIDER), Some(Role::Hider));
    }

    #[tokio::test]
    async fn test_activation_wires_components() {
        let (mut room, _, appearance) = room_with(crate_world());
        room.register_participant(HIDER, ParticipantProfile::hider(Vec3::ZERO))
            .unwrap();

        let activation = room.activate_disguise(HIDER, None).await.unwrap();
        assert_eq!(activation.record.disguise.kind(), ObjectKind::Crate);
        assert_eq!(appearance.applied(), 1);

        let target = InteractionTarget::participant_target_id(HIDER);
        assert!(room.gateway.target(&target).is_some());
        assert!(room.discovery.is_tracking_hider(HIDER));
        assert!(room.movement_state(HIDER).unwrap().is_restricted);

        assert!(room.deactivate_disguise(HIDER).await.unwrap());
        assert!(room.gateway.target(&target).is_none());
        assert!(!room.discovery.is_tracking_hider(HIDER));
        assert!(!room.movement_state(HIDER).unwrap().is_restricted);
        assert!(!room.deactivate_disguise(HIDER).await.unwrap());
    }

    #[tokio::test]
    async fn test_spectator_cannot_disguise() {
        let (mut room, _, _) = room_with(crate_world());
        room.register_participant(ParticipantId(9), ParticipantProfile::spectator(Vec3::ZERO))
            .unwrap();
        let err = room
            .activate_disguise(ParticipantId(9), None)
            .await
            .unwrap_err();
        assert!(err.is_role_violation());
        assert!(room.active_session(ParticipantId(9)).is_none());
    }

    #[tokio::test]
    async fn test_unregister_tears_down() {
        let (mut room, _, appearance) = room_with(crate_world());
        room.register_participant(HIDER, ParticipantProfile::hider(Vec3::ZERO))
            .unwrap();
        room.activate_disguise(HIDER, None).await.unwrap();

        assert!(room.unregister_participant(HIDER).await);
        assert_eq!(appearance.reverted(), 1);
        assert!(room.active_session(HIDER).is_none());
        assert!(room.movement_state(HIDER).is_none());
        assert_eq!(
            room.session_history().last().and_then(|r| r.end_reason),
            Some(DeactivationReason::Unregistered)
        );
        assert!(!room.unregister_participant(HIDER).await);
    }

    #[tokio::test]
    async fn test_expiry_on_tick() {
        let (mut room, clock, _) = room_with(crate_world());
        room.register_participant(HIDER, ParticipantProfile::hider(Vec3::ZERO))
            .unwrap();
        let activation = room.activate_disguise(HIDER, None).await.unwrap();

        clock.set(activation.record.disguise.expires_at);
        let report = room.tick().await;
        assert_eq!(report.expired, vec![HIDER]);
        assert!(room.active_session(HIDER).is_none());
        assert!(!room.is_discovered(HIDER));
    }

    #[test]
    fn test_object_registry() {
        let (mut room, _, _) = room_with(Vec::new());
        room.register_object("crate-7", Vec3::new(1.0, 0.0, 0.0))
            .unwrap();
        assert!(room.register_object("", Vec3::ZERO).is_err());
        assert!(room.unregister_object("crate-7"));
        assert!(!room.unregister_object("crate-7"));
    }

    #[test]
    fn test_participant_namespace_is_reserved() {
        let (mut room, _, _) = room_with(Vec::new());
        room.register_participant(HIDER, ParticipantProfile::hider(Vec3::ZERO))
            .unwrap();

        let own = InteractionTarget::participant_target_id(HIDER);
        assert!(matches!(
            room.register_object(own.clone(), Vec3::ZERO),
            Err(RoomError::InvalidInput(_))
        ));
        assert!(matches!(
            room.register_object("participant:99", Vec3::ZERO),
            Err(RoomError::InvalidInput(_))
        ));
        assert!(room.gateway.target(&own).is_none());
        assert_eq!(room.gateway.target_count(), 0);
    }

    #[tokio::test]
    async fn test_reactivation_keeps_discovery_pressure() {
        let (mut room, clock, _) = room_with(crate_and_tree_world());
        room.register_participant(HIDER, ParticipantProfile::hider(Vec3::ZERO))
            .unwrap();
        room.register_participant(SEEKER, ParticipantProfile::seeker(Vec3::new(0.5, 0.0, 0.0)))
            .unwrap();
        room.activate_disguise(HIDER, Some(ObjectKind::Crate))
            .await
            .unwrap();

        let id = InteractionTarget::participant_target_id(HIDER);
        let raised = room.gateway.target(&id).unwrap().clone().with_suspicion(1.4);
        room.gateway.register_target(raised).unwrap();
        room.discovery.record_failed_interaction(HIDER);
        let suspicion = room.discovery.suspicion(HIDER).unwrap();

        clock.advance(2_000);
        let second = room
            .activate_disguise(HIDER, Some(ObjectKind::Tree))
            .await
            .unwrap();
        assert!(second.replaced.is_some());
        assert_eq!(room.discovery.dwell_timer_count(), 1);
        assert!((room.discovery.suspicion(HIDER).unwrap() - suspicion).abs() < f32::EPSILON);
        let target = room.gateway.target(&id).unwrap();
        assert!((target.suspicion - 1.4).abs() < f32::EPSILON);
        assert!(
            (target.believability - second.record.disguise.believability()).abs() < f32::EPSILON
        );
        assert!(room.movement_state(HIDER).unwrap().is_restricted);

        clock.advance(1_000);
        let report = room.tick().await;
        assert_eq!(report.discovered.len(), 1);
        assert_eq!(report.discovered[0].discoverer, Some(SEEKER));
        assert!(room.is_discovered(HIDER));
    }

    #[tokio::test]
    async fn test_failed_replacement_releases_everything() {
        let (mut room, _, appearance) = room_with(crate_and_tree_world());
        room.register_participant(HIDER, ParticipantProfile::hider(Vec3::ZERO))
            .unwrap();
        room.activate_disguise(HIDER, Some(ObjectKind::Crate))
            .await
            .unwrap();
        assert!(room.discovery.is_tracking_hider(HIDER));

        appearance.fail_next_apply(1);
        let err = room
            .activate_disguise(HIDER, Some(ObjectKind::Tree))
            .await
            .unwrap_err();
        assert!(matches!(err, RoomError::Camouflage(_)));

        assert!(room.active_session(HIDER).is_none());
        assert!(!room.movement_state(HIDER).unwrap().is_restricted);
        assert!(room
            .gateway
            .target(&InteractionTarget::participant_target_id(HIDER))
            .is_none());
        assert!(!room.discovery.is_tracking_hider(HIDER));
        assert_eq!(
            room.session_history().last().and_then(|r| r.end_reason),
            Some(DeactivationReason::Replaced)
        );
    }

    #[test]
    fn test_subscribe_to_filters() {
        let (room, _, _) = room_with(Vec::new());
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        room.subscribe_to(EventType::Violation, move |e| sink.lock().push(e.name()));

        room.events().publish(&SharedEvent::Violation {
            participant: HIDER,
            implied_speed: 5.0,
            allowed_speed: 1.0,
            violations: 1,
            timestamp: 0,
        });
        room.events().publish(&SharedEvent::InteractionResult {
            seeker: SEEKER,
            target_id: "x".into(),
            success: false,
            confidence: 0.1,
            discovered: None,
            timestamp: 0,
        });
        assert_eq!(*seen.lock(), vec!["violation"]);
    }
}
