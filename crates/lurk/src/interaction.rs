//! # Interaction Gateway
//!
//! Seekers actively probe targets: disguised participants and static
//! inspectable objects. One probe is one probabilistic trial.
//!
//! ## Success probability
//!
//! ```text
//! p = base_success x suspicion x distance_factor x (1 - believability_weight x believability)
//! distance_factor = 1 - 0.5 x d / max_distance      (0 beyond max_distance)
//! ```
//!
//! The believability term only applies to disguised participants. Objects
//! can be inspected but never uncover anyone.
//!
//! Role checks live in the room; the gateway trusts its caller.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use lurk_shared::constants::DEFAULT_MAX_INTERACTION_DISTANCE;
use lurk_shared::{clamp_unit, EventBus, ParticipantId, TimestampMs, Vec3};
use thiserror::Error;

use crate::timers::TimerWheel;

/// What sort of thing a target is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    /// A static inspectable object.
    Object,
    /// A hider under an active disguise.
    DisguisedParticipant,
}

/// How the seeker interacted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionType {
    /// Looked at an object.
    Inspect,
    /// Poked something that might be a hider.
    Probe,
}

/// Id prefix reserved for disguised participants.
pub const PARTICIPANT_TARGET_PREFIX: &str = "participant:";

/// Something a seeker can interact with.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InteractionTarget {
    /// Registry id.
    pub id: String,
    /// Object or disguised participant.
    pub kind: TargetKind,
    /// Current position.
    pub position: Vec3,
    /// Linked participant for disguised targets.
    pub participant: Option<ParticipantId>,
    /// Suspicion weight; grows with failed probes.
    pub suspicion: f32,
    /// Disguise believability (0 for objects).
    pub believability: f32,
}

impl InteractionTarget {
    /// Registry id used for a participant's disguise.
    #[must_use]
    pub fn participant_target_id(participant: ParticipantId) -> String {
        format!("{PARTICIPANT_TARGET_PREFIX}{}", participant.0)
    }

    /// True if `id` lies in the participant namespace.
    #[must_use]
    pub fn is_participant_target_id(id: &str) -> bool {
        id.starts_with(PARTICIPANT_TARGET_PREFIX)
    }

    /// Static object target.
    #[must_use]
    pub fn object(id: impl Into<String>, position: Vec3) -> Self {
        Self {
            id: id.into(),
            kind: TargetKind::Object,
            position,
            participant: None,
            suspicion: 1.0,
            believability: 0.0,
        }
    }

    /// Disguised participant target.
    #[must_use]
    pub fn disguised(participant: ParticipantId, position: Vec3, believability: f32) -> Self {
        Self {
            id: Self::participant_target_id(participant),
            kind: TargetKind::DisguisedParticipant,
            position,
            participant: Some(participant),
            suspicion: 1.0,
            believability: clamp_unit(believability),
        }
    }

    /// Sets the suspicion weight.
    #[must_use]
    pub fn with_suspicion(mut self, suspicion: f32) -> Self {
        self.suspicion = suspicion.max(0.0);
        self
    }
}

/// Outcome of one probe.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InteractionResult {
    /// Who probed.
    pub seeker: ParticipantId,
    /// Whether the trial succeeded.
    pub success: bool,
    /// Target registry id.
    pub target_id: String,
    /// Target kind (`None` if the target vanished before resolution).
    pub target_kind: Option<TargetKind>,
    /// Interaction type.
    pub interaction: InteractionType,
    /// Trial probability in `[0, 1]`.
    pub confidence: f32,
    /// Resolution time.
    pub timestamp: TimestampMs,
    /// Participant uncovered by this probe.
    pub discovered: Option<ParticipantId>,
}

/// A probe waiting for its duration to elapse.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PendingInteraction {
    /// Who probes.
    pub seeker: ParticipantId,
    /// Target registry id.
    pub target_id: String,
    /// Seeker position at start.
    pub seeker_position: Vec3,
    /// Start time.
    pub started_at: TimestampMs,
    /// Resolution time.
    pub resolves_at: TimestampMs,
}

/// What `start_interaction` produced.
#[derive(Clone, Debug, PartialEq)]
pub enum InteractionOutcome {
    /// Resolved immediately.
    Resolved(InteractionResult),
    /// Resolves on a later tick.
    Pending(PendingInteraction),
}

/// Gateway errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InteractionError {
    /// Nothing within reach.
    #[error("no target within {max_distance} of {seeker}")]
    NoTargetInRange {
        /// Seeker.
        seeker: ParticipantId,
        /// Reach.
        max_distance: f32,
    },

    /// The named target is not registered.
    #[error("unknown interaction target: {0}")]
    UnknownTarget(String),

    /// The seeker interacted too recently.
    #[error("{seeker} is on cooldown for {remaining_ms} ms")]
    OnCooldown {
        /// Seeker.
        seeker: ParticipantId,
        /// Time left.
        remaining_ms: u64,
    },

    /// The seeker already has a pending probe.
    #[error("{seeker} already has an interaction in flight")]
    AlreadyInteracting {
        /// Seeker.
        seeker: ParticipantId,
    },

    /// Malformed input.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for gateway operations.
pub type InteractionResultOf<T> = Result<T, InteractionError>;

/// Gateway knobs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractionConfig {
    /// Reach of a probe.
    pub max_distance: f32,
    /// Success chance at point blank against a zero-believability target.
    pub base_success: f32,
    /// How much believability suppresses success.
    pub believability_weight: f32,
    /// Suspicion added to a disguised target by each failed probe.
    pub suspicion_step: f32,
    /// Suspicion ceiling.
    pub max_suspicion: f32,
    /// Probe duration; 0 resolves immediately.
    pub interaction_duration_ms: u64,
    /// Minimum gap between a seeker's probes.
    pub cooldown_ms: u64,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            max_distance: DEFAULT_MAX_INTERACTION_DISTANCE,
            base_success: 0.6,
            believability_weight: 0.7,
            suspicion_step: 0.2,
            max_suspicion: 2.0,
            interaction_duration_ms: 0,
            cooldown_ms: 500,
        }
    }
}

/// Probe counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionStats {
    /// Probes resolved.
    pub resolved: u64,
    /// Probes that succeeded.
    pub successes: u64,
    /// Probes that uncovered a participant.
    pub discoveries: u64,
    /// Probes cancelled before resolution.
    pub cancelled: u64,
}

/// Target registry plus probe resolution.
pub struct InteractionGateway {
    config: InteractionConfig,
    targets: HashMap<String, InteractionTarget>,
    pending: HashMap<ParticipantId, PendingInteraction>,
    timers: TimerWheel<ParticipantId>,
    last_attempt: HashMap<ParticipantId, TimestampMs>,
    stats: InteractionStats,
    events: EventBus<InteractionResult>,
}

impl fmt::Debug for InteractionGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InteractionGateway")
            .field("targets", &self.targets.len())
            .field("pending", &self.pending.len())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl Default for InteractionGateway {
    fn default() -> Self {
        Self::new(InteractionConfig::default())
    }
}

impl InteractionGateway {
    /// Creates a gateway.
    #[must_use]
    pub fn new(config: InteractionConfig) -> Self {
        Self {
            config,
            targets: HashMap::new(),
            pending: HashMap::new(),
            timers: TimerWheel::new(),
            last_attempt: HashMap::new(),
            stats: InteractionStats::default(),
            events: EventBus::new("interaction"),
        }
    }

    /// Current config.
    #[must_use]
    pub fn config(&self) -> &InteractionConfig {
        &self.config
    }

    /// Resolved-probe stream.
    #[must_use]
    pub fn events(&self) -> &EventBus<InteractionResult> {
        &self.events
    }

    /// Counters.
    #[must_use]
    pub fn stats(&self) -> InteractionStats {
        self.stats
    }

    /// Registers or replaces a target.
    ///
    /// # Errors
    ///
    /// `InvalidInput` for an empty id or non-finite position.
    pub fn register_target(&mut self, target: InteractionTarget) -> InteractionResultOf<()> {
        if target.id.is_empty() || !target.position.is_finite() {
            return Err(InteractionError::InvalidInput(format!(
                "bad target '{}'",
                target.id
            )));
        }
        self.targets.insert(target.id.clone(), target);
        Ok(())
    }

    /// Removes a target and cancels probes aimed at it.
    /// Returns `false` if it was not registered.
    pub fn unregister_target(&mut self, id: &str) -> bool {
        if self.targets.remove(id).is_none() {
            return false;
        }
        let aimed: Vec<ParticipantId> = self
            .pending
            .values()
            .filter(|p| p.target_id == id)
            .map(|p| p.seeker)
            .collect();
        for seeker in aimed {
            self.pending.remove(&seeker);
            self.timers.cancel(&seeker);
        }
        true
    }

    /// Drops everything tied to a participant: its disguise target, its
    /// pending probe and its cooldown.
    pub fn remove_participant(&mut self, participant: ParticipantId) {
        self.unregister_target(&InteractionTarget::participant_target_id(participant));
        self.pending.remove(&participant);
        self.timers.cancel(&participant);
        self.last_attempt.remove(&participant);
    }

    /// Moves a target.
    pub fn update_target_position(&mut self, id: &str, position: Vec3) -> bool {
        match self.targets.get_mut(id) {
            Some(target) if position.is_finite() => {
                target.position = position;
                true
            }
            _ => false,
        }
    }

    /// Looks up a target.
    #[must_use]
    pub fn target(&self, id: &str) -> Option<&InteractionTarget> {
        self.targets.get(id)
    }

    /// Number of registered targets.
    #[must_use]
    pub fn target_count(&self) -> usize {
        self.targets.len()
    }

    /// Targets within `radius` of `position`, nearest first.
    #[must_use]
    pub fn targets_within(&self, position: Vec3, radius: f32) -> Vec<(&InteractionTarget, f32)> {
        let mut hits: Vec<(&InteractionTarget, f32)> = self
            .targets
            .values()
            .map(|t| (t, t.position.distance(position)))
            .filter(|(_, d)| *d <= radius)
            .collect();
        hits.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.id.cmp(&b.0.id)));
        hits
    }

    /// Pending probe of `seeker`.
    #[must_use]
    pub fn pending(&self, seeker: ParticipantId) -> Option<&PendingInteraction> {
        self.pending.get(&seeker)
    }

    /// Chance that a probe from `distance` succeeds against `target`.
    #[must_use]
    pub fn success_probability(&self, target: &InteractionTarget, distance: f32) -> f32 {
        let max = self.config.max_distance;
        if max <= 0.0 || distance.is_nan() || distance > max {
            return 0.0;
        }
        let distance_factor = 1.0 - 0.5 * distance / max;
        let cover = match target.kind {
            TargetKind::DisguisedParticipant => {
                1.0 - self.config.believability_weight * target.believability
            }
            TargetKind::Object => 1.0,
        };
        clamp_unit(self.config.base_success * target.suspicion * distance_factor * cover)
    }

    /// Starts a probe.
    ///
    /// With no `target_id`, the nearest target within reach is used.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` for a non-finite position
    /// - `OnCooldown` if the seeker probed too recently
    /// - `AlreadyInteracting` if a probe is pending
    /// - `UnknownTarget` for an unregistered id
    /// - `NoTargetInRange` if nothing (or the named target) is out of reach
    pub fn start_interaction<R: Rng + ?Sized>(
        &mut self,
        seeker: ParticipantId,
        position: Vec3,
        target_id: Option<&str>,
        now: TimestampMs,
        rng: &mut R,
    ) -> InteractionResultOf<InteractionOutcome> {
        if !position.is_finite() {
            return Err(InteractionError::InvalidInput(format!(
                "non-finite position for {seeker}"
            )));
        }

        if let Some(&last) = self.last_attempt.get(&seeker) {
            let elapsed = now.saturating_sub(last);
            if elapsed < self.config.cooldown_ms {
                return Err(InteractionError::OnCooldown {
                    seeker,
                    remaining_ms: self.config.cooldown_ms - elapsed,
                });
            }
        }

        if self.pending.contains_key(&seeker) {
            return Err(InteractionError::AlreadyInteracting { seeker });
        }

        let max_distance = self.config.max_distance;
        let out_of_range = InteractionError::NoTargetInRange {
            seeker,
            max_distance,
        };
        let target_id = match target_id {
            Some(id) => {
                let target = self
                    .targets
                    .get(id)
                    .ok_or_else(|| InteractionError::UnknownTarget(id.to_owned()))?;
                if target.position.distance(position) > max_distance {
                    return Err(out_of_range);
                }
                target.id.clone()
            }
            None => self
                .targets_within(position, max_distance)
                .first()
                .map(|(t, _)| t.id.clone())
                .ok_or(out_of_range)?,
        };

        self.last_attempt.insert(seeker, now);

        if self.config.interaction_duration_ms == 0 {
            return Ok(InteractionOutcome::Resolved(
                self.resolve(seeker, position, &target_id, now, rng),
            ));
        }

        let pending = PendingInteraction {
            seeker,
            target_id,
            seeker_position: position,
            started_at: now,
            resolves_at: now.saturating_add(self.config.interaction_duration_ms),
        };
        self.timers.schedule(seeker, pending.resolves_at);
        self.pending.insert(seeker, pending.clone());
        tracing::debug!(%seeker, target = %pending.target_id, "interaction pending");
        Ok(InteractionOutcome::Pending(pending))
    }

    /// Aborts the seeker's pending probe. Safe when idle; returns whether
    /// anything was cancelled.
    pub fn cancel_interaction(&mut self, seeker: ParticipantId) -> bool {
        self.timers.cancel(&seeker);
        let cancelled = self.pending.remove(&seeker).is_some();
        if cancelled {
            self.stats.cancelled += 1;
        }
        cancelled
    }

    /// Resolves every pending probe due at `now`.
    pub fn resolve_due<R: Rng + ?Sized>(
        &mut self,
        now: TimestampMs,
        rng: &mut R,
    ) -> Vec<InteractionResult> {
        let mut results = Vec::new();
        for seeker in self.timers.due(now) {
            if let Some(p) = self.pending.remove(&seeker) {
                results.push(self.resolve(p.seeker, p.seeker_position, &p.target_id, now, rng));
            }
        }
        results
    }

    fn resolve<R: Rng + ?Sized>(
        &mut self,
        seeker: ParticipantId,
        position: Vec3,
        target_id: &str,
        now: TimestampMs,
        rng: &mut R,
    ) -> InteractionResult {
        let (probability, kind, participant) = match self.targets.get(target_id) {
            Some(target) => (
                self.success_probability(target, target.position.distance(position)),
                Some(target.kind),
                target.participant,
            ),
            None => (0.0, None, None),
        };

        let success = probability > 0.0 && rng.gen_bool(f64::from(probability));

        let discovered = match kind {
            Some(TargetKind::DisguisedParticipant) if success => participant,
            _ => None,
        };

        if !success && kind == Some(TargetKind::DisguisedParticipant) {
            let step = self.config.suspicion_step;
            let ceiling = self.config.max_suspicion;
            if let Some(target) = self.targets.get_mut(target_id) {
                target.suspicion = (target.suspicion + step).min(ceiling);
            }
        }

        let interaction = match kind {
            Some(TargetKind::Object) => InteractionType::Inspect,
            _ => InteractionType::Probe,
        };

        let result = InteractionResult {
            seeker,
            success,
            target_id: target_id.to_owned(),
            target_kind: kind,
            interaction,
            confidence: probability,
            timestamp: now,
            discovered,
        };

        self.stats.resolved += 1;
        if success {
            self.stats.successes += 1;
        }
        if discovered.is_some() {
            self.stats.discoveries += 1;
        }

        tracing::debug!(
            %seeker,
            target = %target_id,
            success,
            probability,
            "interaction resolved"
        );
        self.events.publish(&result);
        result
    }
}
