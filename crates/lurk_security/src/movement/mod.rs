//! # Movement Restrictor
//!
//! Server-side enforcement of the limits implied by an active disguise.
//!
//! ## Checks (in order)
//!
//! - **Speed**: implied speed `|requested - current| / dt` above
//!   `current_speed * (1 + tolerance)` is a violation. The move is clamped to
//!   `current_speed * dt` along the requested direction.
//! - **Direction**: the lateral part of the (possibly clamped) move is scaled
//!   by the tightest lateral cap. See [`direction`] for the geometry.
//!
//! A clamped move never implies more speed than the cap, and a direction cap
//! only ever shortens a move, so the returned position always satisfies the
//! speed limit.

pub mod direction;

use std::collections::HashMap;

use lurk_shared::{
    EventBus, MovementRestriction, ParticipantId, PlayerAction, TimestampMs, Vec3,
};
use lurk_shared::constants::{DEFAULT_BASE_SPEED, DEFAULT_SPEED_TOLERANCE};
use serde::{Deserialize, Serialize};

use crate::error::{MovementError, MovementResult};
use crate::stats::{StatsAccumulator, ViolationStats};

/// Configuration for movement validation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestrictorConfig {
    /// Fractional slack above the current speed before a move is a violation.
    pub speed_tolerance: f32,
    /// Base speed used when a participant registers without one.
    pub default_base_speed: f32,
}

impl Default for RestrictorConfig {
    fn default() -> Self {
        Self {
            speed_tolerance: DEFAULT_SPEED_TOLERANCE,
            default_base_speed: DEFAULT_BASE_SPEED,
        }
    }
}

/// Movement state of one participant.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MovementState {
    /// Participant this state belongs to.
    pub participant: ParticipantId,
    /// Undisguised speed (units/sec).
    pub base_speed: f32,
    /// Speed currently allowed (units/sec).
    pub current_speed: f32,
    /// Active restrictions, empty when undisguised.
    pub restrictions: Vec<MovementRestriction>,
    /// True while any restriction is active.
    pub is_restricted: bool,
    /// Overspeed violations so far.
    pub violations: u32,
    /// Horizontal unit heading of the last accepted move.
    pub heading: Vec3,
    /// Heading captured when the current restrictions were applied.
    pub locked_heading: Vec3,
}

impl MovementState {
    fn new(participant: ParticipantId, base_speed: f32) -> Self {
        Self {
            participant,
            base_speed,
            current_speed: base_speed,
            restrictions: Vec::new(),
            is_restricted: false,
            violations: 0,
            heading: Vec3::Z,
            locked_heading: Vec3::Z,
        }
    }

    /// Tightest speed multiplier among the active restrictions (1.0 if none).
    #[must_use]
    pub fn speed_multiplier(&self) -> f32 {
        self.restrictions
            .iter()
            .filter_map(MovementRestriction::speed_multiplier)
            .fold(1.0, f32::min)
    }

    /// Tightest lateral cap among the active restrictions, if any.
    #[must_use]
    pub fn lateral_cap(&self) -> Option<f32> {
        self.restrictions
            .iter()
            .filter_map(MovementRestriction::lateral_cap)
            .reduce(f32::min)
    }

    /// Returns true unless an active restriction forbids `action`.
    #[must_use]
    pub fn allows(&self, action: PlayerAction) -> bool {
        !self.restrictions.iter().any(|r| r.forbids(action))
    }
}

/// Outcome of validating one movement request.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MovementCheck {
    /// Position the participant ends up at.
    pub position: Vec3,
    /// True if the request was honoured unchanged.
    pub accepted: bool,
    /// True if the request broke the speed cap.
    pub violation: bool,
    /// Speed implied by the original request (units/sec).
    pub implied_speed: f32,
    /// Speed the participant was allowed (units/sec).
    pub allowed_speed: f32,
}

/// Published on every overspeed violation.
#[derive(Clone, Debug, PartialEq)]
pub struct ViolationEvent {
    /// Offending participant.
    pub participant: ParticipantId,
    /// Position the participant asked for.
    pub requested: Vec3,
    /// Position the participant was given.
    pub corrected: Vec3,
    /// Speed implied by the request.
    pub implied_speed: f32,
    /// Speed the participant is allowed.
    pub allowed_speed: f32,
    /// Violations for this participant including this one.
    pub violations: u32,
    /// When it happened.
    pub timestamp: TimestampMs,
}

/// Movement restrictor.
pub struct MovementRestrictor {
    /// Configuration.
    config: RestrictorConfig,
    /// Per-participant state.
    states: HashMap<ParticipantId, MovementState>,
    /// Aggregate counters.
    stats: StatsAccumulator,
    /// Violation stream.
    events: EventBus<ViolationEvent>,
}

impl MovementRestrictor {
    /// Creates a new restrictor.
    #[must_use]
    pub fn new(config: RestrictorConfig) -> Self {
        Self {
            config,
            states: HashMap::new(),
            stats: StatsAccumulator::default(),
            events: EventBus::new("movement"),
        }
    }

    /// Violation event stream.
    #[must_use]
    pub fn events(&self) -> &EventBus<ViolationEvent> {
        &self.events
    }

    /// Registers a participant (or resets an existing one) at `base_speed`.
    ///
    /// `None` uses the configured default base speed.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for a negative or non-finite speed.
    pub fn register_participant(
        &mut self,
        participant: ParticipantId,
        base_speed: Option<f32>,
    ) -> MovementResult<()> {
        let base_speed = base_speed.unwrap_or(self.config.default_base_speed);
        if !base_speed.is_finite() || base_speed < 0.0 {
            return Err(MovementError::InvalidInput(format!(
                "base speed {base_speed} for {participant}"
            )));
        }
        self.states
            .insert(participant, MovementState::new(participant, base_speed));
        Ok(())
    }

    /// Drops a participant's state. Returns `false` if it was unknown.
    pub fn unregister_participant(&mut self, participant: ParticipantId) -> bool {
        self.states.remove(&participant).is_some()
    }

    /// Returns the movement state of a participant.
    #[must_use]
    pub fn state(&self, participant: ParticipantId) -> Option<&MovementState> {
        self.states.get(&participant)
    }

    /// Replaces the participant's restrictions.
    ///
    /// Returns the new current speed. The heading at this moment becomes the
    /// locked axis for direction caps.
    ///
    /// # Errors
    ///
    /// Returns `UnknownParticipant` if the participant is not registered.
    pub fn apply_restrictions(
        &mut self,
        participant: ParticipantId,
        restrictions: &[MovementRestriction],
    ) -> MovementResult<f32> {
        let state = self
            .states
            .get_mut(&participant)
            .ok_or(MovementError::UnknownParticipant(participant))?;

        state.restrictions = restrictions.to_vec();
        state.is_restricted = !state.restrictions.is_empty();
        state.current_speed = state.base_speed * state.speed_multiplier();
        state.locked_heading = state.heading;

        tracing::debug!(
            participant = %participant,
            current_speed = state.current_speed,
            restrictions = state.restrictions.len(),
            "movement restrictions applied"
        );
        Ok(state.current_speed)
    }

    /// Clears all restrictions and restores base speed.
    ///
    /// # Errors
    ///
    /// Returns `UnknownParticipant` if the participant is not registered.
    pub fn remove_restrictions(&mut self, participant: ParticipantId) -> MovementResult<()> {
        let state = self
            .states
            .get_mut(&participant)
            .ok_or(MovementError::UnknownParticipant(participant))?;

        state.restrictions.clear();
        state.is_restricted = false;
        state.current_speed = state.base_speed;
        Ok(())
    }

    /// Returns true unless the participant's restrictions forbid `action`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownParticipant` if the participant is not registered.
    pub fn is_action_allowed(
        &self,
        participant: ParticipantId,
        action: PlayerAction,
    ) -> MovementResult<bool> {
        self.states
            .get(&participant)
            .map(|s| s.allows(action))
            .ok_or(MovementError::UnknownParticipant(participant))
    }

    /// Validates a movement request.
    ///
    /// # Arguments
    ///
    /// * `current` - Server's record of the participant's position
    /// * `requested` - Position the client asks for
    /// * `dt` - Seconds since the previous accepted move
    /// * `now` - Current time (for the violation event)
    ///
    /// A non-positive or non-finite `dt` keeps the participant in place
    /// without counting a violation.
    ///
    /// # Errors
    ///
    /// Returns `UnknownParticipant` or `InvalidInput` for non-finite positions.
    pub fn validate_movement(
        &mut self,
        participant: ParticipantId,
        current: Vec3,
        requested: Vec3,
        dt: f32,
        now: TimestampMs,
    ) -> MovementResult<MovementCheck> {
        if !current.is_finite() || !requested.is_finite() {
            return Err(MovementError::InvalidInput(format!(
                "non-finite position for {participant}"
            )));
        }

        let tolerance = self.config.speed_tolerance.max(0.0);
        let state = self
            .states
            .get_mut(&participant)
            .ok_or(MovementError::UnknownParticipant(participant))?;
        let allowed_speed = state.current_speed;

        if !dt.is_finite() || dt <= 0.0 {
            self.stats.record_check(current != requested);
            return Ok(MovementCheck {
                position: current,
                accepted: current == requested,
                violation: false,
                implied_speed: 0.0,
                allowed_speed,
            });
        }

        let requested_delta = requested - current;
        let implied_speed = requested_delta.length() / dt;
        let violation = implied_speed > allowed_speed * (1.0 + tolerance);

        let mut delta = if violation {
            // Clamp along the requested direction to the plain cap.
            requested_delta
                .normalized()
                .map_or(Vec3::ZERO, |dir| dir * (allowed_speed * dt))
        } else {
            requested_delta
        };

        if let Some(cap) = state.lateral_cap() {
            delta = direction::cap_lateral(delta, state.locked_heading, cap);
        }

        let position = current + delta;
        let accepted = !violation && position == requested;

        if let Some(heading) = delta.horizontal().normalized() {
            state.heading = heading;
        }

        self.stats.record_check(!accepted);

        if violation {
            state.violations += 1;
            let ratio = if allowed_speed > 0.0 {
                implied_speed / allowed_speed
            } else {
                f32::INFINITY
            };
            self.stats.record_violation(ratio);

            tracing::warn!(
                participant = %participant,
                implied_speed,
                allowed_speed,
                violations = state.violations,
                "movement violation corrected"
            );

            let event = ViolationEvent {
                participant,
                requested,
                corrected: position,
                implied_speed,
                allowed_speed,
                violations: state.violations,
                timestamp: now,
            };
            self.events.publish(&event);
        }

        Ok(MovementCheck {
            position,
            accepted,
            violation,
            implied_speed,
            allowed_speed,
        })
    }

    /// Aggregate violation statistics.
    #[must_use]
    pub fn violation_stats(&self) -> ViolationStats {
        let per_participant: HashMap<ParticipantId, u32> = self
            .states
            .iter()
            .map(|(id, s)| (*id, s.violations))
            .collect();
        self.stats.snapshot(&per_participant)
    }

    /// Resets every counter (per-participant and aggregate).
    pub fn reset_violations(&mut self) {
        for state in self.states.values_mut() {
            state.violations = 0;
        }
        self.stats.reset();
    }
}

impl Default for MovementRestrictor {
    fn default() -> Self {
        Self::new(RestrictorConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    const P: ParticipantId = ParticipantId(1);

    fn restrictor_with(speed: f32) -> MovementRestrictor {
        let mut r = MovementRestrictor::default();
        r.register_participant(P, Some(speed)).unwrap();
        r
    }

    #[test]
    fn test_speed_multiplier_uses_tightest() {
        let mut r = restrictor_with(5.0);
        let speed = r
            .apply_restrictions(
                P,
                &[
                    MovementRestriction::Speed { multiplier: 0.5 },
                    MovementRestriction::Speed { multiplier: 0.2 },
                ],
            )
            .unwrap();
        assert!((speed - 1.0).abs() < 1e-6);
        assert!(r.state(P).unwrap().is_restricted);
    }

    #[test]
    fn test_overspeed_is_clamped_and_counted() {
        let mut r = restrictor_with(1.0);
        r.apply_restrictions(P, &[MovementRestriction::Speed { multiplier: 1.0 }])
            .unwrap();

        // 5 units in 1 second at a cap of 1 unit/sec.
        let check = r
            .validate_movement(P, Vec3::ZERO, Vec3::new(5.0, 0.0, 0.0), 1.0, 0)
            .unwrap();

        assert!(check.violation);
        assert!(!check.accepted);
        assert!(check.position.length() <= 1.0 + 1e-5);
        assert!((check.position.x - 1.0).abs() < 1e-5);
        assert_eq!(r.state(P).unwrap().violations, 1);
    }

    #[test]
    fn test_within_tolerance_is_accepted() {
        let mut r = restrictor_with(1.0);
        let target = Vec3::new(1.05, 0.0, 0.0);
        let check = r.validate_movement(P, Vec3::ZERO, target, 1.0, 0).unwrap();
        assert!(check.accepted);
        assert_eq!(check.position, target);
        assert_eq!(r.state(P).unwrap().violations, 0);
    }

    #[test]
    fn test_zero_speed_disguise_pins_participant() {
        let mut r = restrictor_with(5.0);
        r.apply_restrictions(P, &[MovementRestriction::Speed { multiplier: 0.0 }])
            .unwrap();
        let check = r
            .validate_movement(P, Vec3::ZERO, Vec3::new(0.1, 0.0, 0.0), 1.0, 0)
            .unwrap();
        assert!(check.violation);
        assert_eq!(check.position, Vec3::ZERO);
    }

    #[test]
    fn test_remove_restrictions_restores_base_speed() {
        let mut r = restrictor_with(4.0);
        r.apply_restrictions(P, &[MovementRestriction::Speed { multiplier: 0.25 }])
            .unwrap();
        r.remove_restrictions(P).unwrap();
        let state = r.state(P).unwrap();
        assert!(!state.is_restricted);
        assert!((state.current_speed - 4.0).abs() < 1e-6);
    }

    #[test]
    fn test_action_restrictions() {
        let mut r = restrictor_with(4.0);
        r.apply_restrictions(P, &[MovementRestriction::Action { action: PlayerAction::Jump }])
            .unwrap();
        assert!(!r.is_action_allowed(P, PlayerAction::Jump).unwrap());
        assert!(r.is_action_allowed(P, PlayerAction::Sprint).unwrap());
        assert!(r.is_action_allowed(ParticipantId(99), PlayerAction::Jump).is_err());
    }

    #[test]
    fn test_non_positive_dt_keeps_position() {
        let mut r = restrictor_with(4.0);
        let check = r
            .validate_movement(P, Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0), 0.0, 0)
            .unwrap();
        assert_eq!(check.position, Vec3::ZERO);
        assert!(!check.violation);
    }

    #[test]
    fn test_unknown_participant() {
        let mut r = MovementRestrictor::default();
        let err = r
            .validate_movement(P, Vec3::ZERO, Vec3::X, 1.0, 0)
            .unwrap_err();
        assert_eq!(err, MovementError::UnknownParticipant(P));
    }

    #[test]
    fn test_violation_event_and_stats() {
        let mut r = restrictor_with(1.0);
        let seen = Arc::new(AtomicU32::new(0));
        let s = Arc::clone(&seen);
        r.events().subscribe(move |e: &ViolationEvent| {
            s.store(e.violations, Ordering::SeqCst);
        });

        for _ in 0..3 {
            r.validate_movement(P, Vec3::ZERO, Vec3::new(10.0, 0.0, 0.0), 1.0, 42)
                .unwrap();
        }
        r.validate_movement(P, Vec3::ZERO, Vec3::new(0.5, 0.0, 0.0), 1.0, 43)
            .unwrap();

        assert_eq!(seen.load(Ordering::SeqCst), 3);
        let stats = r.violation_stats();
        assert_eq!(stats.checks, 4);
        assert_eq!(stats.violations, 3);
        assert_eq!(stats.offenders, vec![(P, 3)]);
        assert!((stats.worst_overspeed_ratio - 10.0).abs() < 1e-4);

        r.reset_violations();
        assert_eq!(r.violation_stats().violations, 0);
        assert_eq!(r.state(P).unwrap().violations, 0);
    }
}
