//! # Discovery Engine
//!
//! Passive detection of disguised hiders, plus the single funnel every
//! discovery goes through.
//!
//! ## Channels
//!
//! | channel | trigger | confidence |
//! |---|---|---|
//! | proximity | a seeker stays within `proximity_radius` for `proximity_dwell_ms` | `proximity_confidence` |
//! | movement | a hider moves more than `movement_sensitivity` in one step near a seeker | computed penalty x distance weight |
//! | timeout | a disguise outlives `max_disguise_time_ms` | `timeout_confidence` |
//! | interaction | reported by the gateway through the room | probe probability |
//!
//! ## Idempotence
//!
//! [`DiscoveryEngine::process_discovery`] is a no-op for a participant already
//! in the discovered set. The first discovery wins; later ones are dropped
//! until [`DiscoveryEngine::reset`].
//!
//! Broadcasts are delayed by `notification_delay_ms` and delivered from
//! [`DiscoveryEngine::tick`].

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

use lurk_shared::constants::{
    DEFAULT_MAX_DISGUISE_TIME_MS, DEFAULT_MOVEMENT_SENSITIVITY, DEFAULT_NOTIFICATION_DELAY_MS,
    DEFAULT_PROXIMITY_CONFIDENCE, DEFAULT_PROXIMITY_DWELL_MS, DEFAULT_PROXIMITY_RADIUS,
};
use lurk_shared::{clamp_unit, DiscoveryEvent, DiscoveryMethod, EventBus, ParticipantId, TimestampMs, Vec3};

use crate::timers::TimerWheel;

/// Discovery knobs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Seeker-hider distance that starts a dwell timer.
    pub proximity_radius: f32,
    /// Dwell time before a proximity discovery.
    pub proximity_dwell_ms: u64,
    /// Confidence of proximity discoveries.
    pub proximity_confidence: f32,
    /// Per-step displacement above which movement is suspicious.
    pub movement_sensitivity: f32,
    /// Penalty gained per sensitivity-length of excess displacement.
    pub movement_penalty_scale: f32,
    /// Enables timeout discoveries.
    pub enable_timeout: bool,
    /// Maximum disguise age before a timeout discovery.
    pub max_disguise_time_ms: u64,
    /// Confidence of timeout discoveries.
    pub timeout_confidence: f32,
    /// Delay between a discovery and its broadcast.
    pub notification_delay_ms: u64,
    /// Suspicion added by each failed probe.
    pub suspicion_step: f32,
    /// Suspicion ceiling.
    pub max_suspicion: f32,
    /// Hint distances: hot, warm, cold.
    pub hint_ranges: [f32; 3],
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            proximity_radius: DEFAULT_PROXIMITY_RADIUS,
            proximity_dwell_ms: DEFAULT_PROXIMITY_DWELL_MS,
            proximity_confidence: DEFAULT_PROXIMITY_CONFIDENCE,
            movement_sensitivity: DEFAULT_MOVEMENT_SENSITIVITY,
            movement_penalty_scale: 0.5,
            enable_timeout: true,
            max_disguise_time_ms: DEFAULT_MAX_DISGUISE_TIME_MS,
            timeout_confidence: 1.0,
            notification_delay_ms: DEFAULT_NOTIFICATION_DELAY_MS,
            suspicion_step: 0.1,
            max_suspicion: 0.5,
            hint_ranges: [2.0, 5.0, 10.0],
        }
    }
}

/// How close the nearest undiscovered disguised hider is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProximityHint {
    /// Within the hot range.
    Hot,
    /// Within the warm range.
    Warm,
    /// Within the cold range.
    Cold,
    /// Nobody nearby.
    None,
}

#[derive(Clone, Debug)]
struct TrackedHider {
    position: Vec3,
    disguised_since: TimestampMs,
    suspicion: f32,
}

/// Outcome of one [`DiscoveryEngine::tick`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DiscoveryTick {
    /// Discoveries logged this tick.
    pub discovered: Vec<DiscoveryEvent>,
    /// Broadcasts delivered this tick.
    pub delivered: Vec<DiscoveryEvent>,
}

type Pair = (ParticipantId, ParticipantId);

/// Passive detection and the discovery log.
pub struct DiscoveryEngine {
    config: DiscoveryConfig,
    seekers: HashMap<ParticipantId, Vec3>,
    hiders: HashMap<ParticipantId, TrackedHider>,
    /// Keyed by (seeker, hider).
    dwell: TimerWheel<Pair>,
    discovered: BTreeSet<ParticipantId>,
    log: Vec<DiscoveryEvent>,
    next_id: u64,
    notifications: TimerWheel<u64>,
    outbox: HashMap<u64, DiscoveryEvent>,
    events: EventBus<DiscoveryEvent>,
}

impl fmt::Debug for DiscoveryEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscoveryEngine")
            .field("seekers", &self.seekers.len())
            .field("hiders", &self.hiders.len())
            .field("dwell_timers", &self.dwell.len())
            .field("discovered", &self.discovered)
            .field("logged", &self.log.len())
            .finish_non_exhaustive()
    }
}

impl Default for DiscoveryEngine {
    fn default() -> Self {
        Self::new(DiscoveryConfig::default())
    }
}

impl DiscoveryEngine {
    /// Creates an engine.
    #[must_use]
    pub fn new(config: DiscoveryConfig) -> Self {
        Self {
            config,
            seekers: HashMap::new(),
            hiders: HashMap::new(),
            dwell: TimerWheel::new(),
            discovered: BTreeSet::new(),
            log: Vec::new(),
            next_id: 0,
            notifications: TimerWheel::new(),
            outbox: HashMap::new(),
            events: EventBus::new("discovery"),
        }
    }

    /// Current config.
    #[must_use]
    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Delayed discovery broadcasts.
    #[must_use]
    pub fn events(&self) -> &EventBus<DiscoveryEvent> {
        &self.events
    }

    // =========================================================================
    // Tracking
    // =========================================================================

    /// Starts tracking a seeker (or moves a tracked one).
    pub fn track_seeker(&mut self, seeker: ParticipantId, position: Vec3, now: TimestampMs) {
        self.seekers.insert(seeker, position);
        let hiders: Vec<ParticipantId> = self.hiders.keys().copied().collect();
        for hider in hiders {
            self.evaluate_pair(seeker, hider, now);
        }
    }

    /// Stops tracking a seeker and cancels its dwell timers.
    pub fn untrack_seeker(&mut self, seeker: ParticipantId) {
        self.seekers.remove(&seeker);
        self.dwell.cancel_where(|(s, _)| *s == seeker);
    }

    /// Starts tracking a freshly disguised hider.
    ///
    /// Discovered participants are ignored until reset.
    pub fn track_hider(&mut self, hider: ParticipantId, position: Vec3, now: TimestampMs) {
        if self.discovered.contains(&hider) {
            return;
        }
        self.hiders.insert(
            hider,
            TrackedHider {
                position,
                disguised_since: now,
                suspicion: 0.0,
            },
        );
        let seekers: Vec<ParticipantId> = self.seekers.keys().copied().collect();
        for seeker in seekers {
            self.evaluate_pair(seeker, hider, now);
        }
    }

    /// Moves a tracked hider onto a replacement disguise.
    ///
    /// Dwell deadlines, suspicion and disguise age carry over; only pairs
    /// the new position separates are cancelled. Untracked hiders are
    /// tracked from scratch.
    pub fn retarget_hider(&mut self, hider: ParticipantId, position: Vec3, now: TimestampMs) {
        let Some(tracked) = self.hiders.get_mut(&hider) else {
            self.track_hider(hider, position, now);
            return;
        };
        tracked.position = position;
        let seekers: Vec<ParticipantId> = self.seekers.keys().copied().collect();
        for seeker in seekers {
            self.evaluate_pair(seeker, hider, now);
        }
    }

    /// Stops tracking a hider and cancels its dwell timers.
    pub fn untrack_hider(&mut self, hider: ParticipantId) {
        self.hiders.remove(&hider);
        self.dwell.cancel_where(|(_, h)| *h == hider);
    }

    /// True if `hider` is tracked as disguised.
    #[must_use]
    pub fn is_tracking_hider(&self, hider: ParticipantId) -> bool {
        self.hiders.contains_key(&hider)
    }

    /// Number of live dwell timers.
    #[must_use]
    pub fn dwell_timer_count(&self) -> usize {
        self.dwell.len()
    }

    /// Suspicion accumulated by a tracked hider.
    #[must_use]
    pub fn suspicion(&self, hider: ParticipantId) -> Option<f32> {
        self.hiders.get(&hider).map(|h| h.suspicion)
    }

    /// Raises a hider's suspicion after a failed probe.
    pub fn record_failed_interaction(&mut self, hider: ParticipantId) {
        let step = self.config.suspicion_step;
        let ceiling = self.config.max_suspicion;
        if let Some(tracked) = self.hiders.get_mut(&hider) {
            tracked.suspicion = (tracked.suspicion + step).min(ceiling);
            tracing::debug!(%hider, suspicion = tracked.suspicion, "suspicion raised");
        }
    }

    // =========================================================================
    // Position updates
    // =========================================================================

    /// Records a seeker move and re-evaluates its dwell timers.
    pub fn update_seeker_position(&mut self, seeker: ParticipantId, position: Vec3, now: TimestampMs) {
        if self.seekers.contains_key(&seeker) {
            self.track_seeker(seeker, position, now);
        }
    }

    /// Records a hider move. Abrupt moves near seekers may uncover the hider.
    ///
    /// Returns the discovery, if one happened.
    pub fn update_hider_position<R: Rng + ?Sized>(
        &mut self,
        hider: ParticipantId,
        position: Vec3,
        now: TimestampMs,
        rng: &mut R,
    ) -> Option<DiscoveryEvent> {
        let tracked = self.hiders.get_mut(&hider)?;
        let displacement = position.distance(tracked.position);
        tracked.position = position;
        let suspicion = tracked.suspicion;

        let seekers: Vec<ParticipantId> = self.seekers.keys().copied().collect();
        for &seeker in &seekers {
            self.evaluate_pair(seeker, hider, now);
        }

        let penalty = self.movement_penalty(displacement, suspicion);
        if penalty <= 0.0 {
            return None;
        }

        let reach = self.config.proximity_radius * 2.0;
        let mut nearby: Vec<(ParticipantId, f32)> = seekers
            .into_iter()
            .filter_map(|s| self.seekers.get(&s).map(|p| (s, p.distance(position))))
            .filter(|(_, d)| *d <= reach)
            .collect();
        nearby.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));

        for (seeker, distance) in nearby {
            let weight = if reach > 0.0 { 1.0 - distance / reach } else { 0.0 };
            let chance = clamp_unit(penalty * weight);
            if chance > 0.0 && rng.gen_bool(f64::from(chance)) {
                tracing::debug!(%hider, %seeker, displacement, chance, "abrupt movement noticed");
                return self.process_discovery(
                    hider,
                    Some(seeker),
                    position,
                    DiscoveryMethod::Movement,
                    chance,
                    now,
                );
            }
        }
        None
    }

    /// Penalty for one step of `displacement`: zero up to the sensitivity
    /// threshold, then growing with the excess. Suspicion is added on top of
    /// any non-zero penalty.
    #[must_use]
    pub fn movement_penalty(&self, displacement: f32, suspicion: f32) -> f32 {
        let sensitivity = self.config.movement_sensitivity;
        if !displacement.is_finite() || displacement <= sensitivity {
            return 0.0;
        }
        let excess = if sensitivity > 0.0 {
            (displacement - sensitivity) / sensitivity
        } else {
            displacement
        };
        clamp_unit(excess * self.config.movement_penalty_scale + suspicion)
    }

    // =========================================================================
    // Discovery funnel
    // =========================================================================

    /// Logs a discovery unless `participant` is already discovered.
    ///
    /// On first discovery: appends the event, stops tracking the hider and
    /// schedules the broadcast. The caller tears down the session.
    pub fn process_discovery(
        &mut self,
        participant: ParticipantId,
        discoverer: Option<ParticipantId>,
        position: Vec3,
        method: DiscoveryMethod,
        confidence: f32,
        now: TimestampMs,
    ) -> Option<DiscoveryEvent> {
        if !self.discovered.insert(participant) {
            tracing::debug!(%participant, ?method, "already discovered; ignored");
            return None;
        }

        self.next_id += 1;
        let event = DiscoveryEvent {
            id: self.next_id,
            participant,
            discoverer,
            method,
            position,
            timestamp: now,
            confidence: clamp_unit(confidence),
        };
        self.log.push(event.clone());
        self.untrack_hider(participant);

        self.notifications
            .schedule(event.id, now.saturating_add(self.config.notification_delay_ms));
        self.outbox.insert(event.id, event.clone());

        tracing::info!(
            %participant,
            discoverer = ?discoverer,
            ?method,
            confidence = event.confidence,
            "participant discovered"
        );
        Some(event)
    }

    /// Fires due dwell timers and timeouts, then delivers due broadcasts.
    pub fn tick(&mut self, now: TimestampMs) -> DiscoveryTick {
        let mut out = DiscoveryTick::default();

        for (seeker, hider) in self.dwell.due(now) {
            let Some(position) = self.hiders.get(&hider).map(|h| h.position) else {
                continue;
            };
            let confidence = self.config.proximity_confidence;
            if let Some(event) = self.process_discovery(
                hider,
                Some(seeker),
                position,
                DiscoveryMethod::Proximity,
                confidence,
                now,
            ) {
                out.discovered.push(event);
            }
        }

        if self.config.enable_timeout {
            let max_age = self.config.max_disguise_time_ms;
            let mut overdue: Vec<(ParticipantId, Vec3)> = self
                .hiders
                .iter()
                .filter(|(_, h)| now.saturating_sub(h.disguised_since) >= max_age)
                .map(|(id, h)| (*id, h.position))
                .collect();
            overdue.sort_by_key(|(id, _)| *id);
            for (hider, position) in overdue {
                let confidence = self.config.timeout_confidence;
                if let Some(event) = self.process_discovery(
                    hider,
                    None,
                    position,
                    DiscoveryMethod::Timeout,
                    confidence,
                    now,
                ) {
                    out.discovered.push(event);
                }
            }
        }

        out.delivered = self.deliver_notifications(now);
        out
    }

    /// Publishes every broadcast whose delay has elapsed.
    pub fn deliver_notifications(&mut self, now: TimestampMs) -> Vec<DiscoveryEvent> {
        let mut delivered = Vec::new();
        for id in self.notifications.due(now) {
            if let Some(event) = self.outbox.remove(&id) {
                self.events.publish(&event);
                delivered.push(event);
            }
        }
        delivered
    }

    // =========================================================================
    // Queries and resets
    // =========================================================================

    /// True if `participant` is in the discovered set.
    #[must_use]
    pub fn is_discovered(&self, participant: ParticipantId) -> bool {
        self.discovered.contains(&participant)
    }

    /// Discovered participants, ascending.
    #[must_use]
    pub fn discovered(&self) -> Vec<ParticipantId> {
        self.discovered.iter().copied().collect()
    }

    /// Every logged discovery, oldest first.
    #[must_use]
    pub fn log(&self) -> &[DiscoveryEvent] {
        &self.log
    }

    /// Broadcasts still waiting for their delay.
    #[must_use]
    pub fn pending_notifications(&self) -> usize {
        self.outbox.len()
    }

    /// Hint for `seeker` from the nearest undiscovered disguised hider.
    #[must_use]
    pub fn proximity_hint(&self, seeker: ParticipantId) -> ProximityHint {
        let Some(origin) = self.seekers.get(&seeker) else {
            return ProximityHint::None;
        };
        let nearest = self
            .hiders
            .values()
            .map(|h| h.position.distance(*origin))
            .fold(f32::INFINITY, f32::min);
        let [hot, warm, cold] = self.config.hint_ranges;
        if nearest <= hot {
            ProximityHint::Hot
        } else if nearest <= warm {
            ProximityHint::Warm
        } else if nearest <= cold {
            ProximityHint::Cold
        } else {
            ProximityHint::None
        }
    }

    /// Removes `participant` from the discovered set. The log is untouched.
    pub fn reset(&mut self, participant: ParticipantId) -> bool {
        self.discovered.remove(&participant)
    }

    /// Clears the discovered set. The log is untouched.
    pub fn reset_all(&mut self) {
        self.discovered.clear();
    }

    /// Forgets a departing participant entirely.
    pub fn forget(&mut self, participant: ParticipantId) {
        self.untrack_seeker(participant);
        self.untrack_hider(participant);
    }

    fn evaluate_pair(&mut self, seeker: ParticipantId, hider: ParticipantId, now: TimestampMs) {
        let (Some(seeker_pos), Some(tracked)) = (self.seekers.get(&seeker), self.hiders.get(&hider))
        else {
            return;
        };
        let key = (seeker, hider);
        if seeker_pos.distance(tracked.position) <= self.config.proximity_radius {
            if !self.dwell.is_scheduled(&key) {
                self.dwell
                    .schedule(key, now.saturating_add(self.config.proximity_dwell_ms));
            }
        } else {
            self.dwell.cancel(&key);
        }
    }
}
