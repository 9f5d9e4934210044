//! # Disguise Session Manager
//!
//! Owns the scan -> generate pipeline and the per-participant disguise
//! lifecycle. At most one active record exists per participant.
//!
//! ## Activation
//!
//! ```text
//! options (cache or scan+generate) ──none──> NoDisguiseAvailable (nothing touched)
//!        │
//!        ▼
//! tear down existing session (Replaced)
//!        │
//!        ▼
//! appearance.apply() ──fail/timeout──> error, no record
//!        │
//!        ▼
//! commit record, publish Activated
//! ```
//!
//! Restrictions are NOT registered here; the caller forwards
//! `record.restrictions` to the movement restrictor.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use lurk_shared::constants::DEFAULT_COLLABORATOR_TIMEOUT_MS;
use lurk_shared::events::DeactivationReason;
use lurk_shared::{EventBus, MovementRestriction, ParticipantId, TimestampMs, Vec3};

use crate::appearance::{AppearanceSnapshot, AppearanceTransformer};
use crate::error::{CamouflageError, CamouflageResult};
use crate::generator::{DisguiseGenerator, GeneratedDisguise, GenerationRequest, GeneratorConfig};
use crate::object::ObjectKind;
use crate::scanner::{EnvironmentScanner, ScannerConfig};
use crate::world::WorldQuery;

/// Session manager knobs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// How long generated options stay reusable.
    pub cache_ttl_ms: u64,
    /// Position bucket edge for the option cache.
    pub cache_bucket_size: f32,
    /// Budget for each appearance call.
    pub collaborator_timeout_ms: u64,
    /// Ended sessions kept in history.
    pub history_limit: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cache_ttl_ms: 2_000,
            cache_bucket_size: 1.0,
            collaborator_timeout_ms: DEFAULT_COLLABORATOR_TIMEOUT_MS,
            history_limit: 256,
        }
    }
}

/// One disguise session, live or ended.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DisguiseSessionRecord {
    /// Disguised participant.
    pub participant: ParticipantId,
    /// Active disguise.
    pub disguise: GeneratedDisguise,
    /// Session start.
    pub started_at: TimestampMs,
    /// Session end; `None` while active.
    pub ended_at: Option<TimestampMs>,
    /// Why it ended; `None` while active.
    pub end_reason: Option<DeactivationReason>,
    /// Appearance to restore on teardown.
    pub original_appearance: AppearanceSnapshot,
    /// Restrictions the disguise imposes.
    pub restrictions: Vec<MovementRestriction>,
    /// Hider position at activation.
    pub position: Vec3,
}

impl DisguiseSessionRecord {
    /// True while the session has not ended.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.ended_at.is_none()
    }

    /// Age of the session at `now`.
    #[must_use]
    pub fn age_ms(&self, now: TimestampMs) -> u64 {
        now.saturating_sub(self.started_at)
    }

    fn close(mut self, reason: DeactivationReason, now: TimestampMs) -> Self {
        self.ended_at = Some(now);
        self.end_reason = Some(reason);
        self
    }
}

/// Lifecycle notifications.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    /// A session started.
    Activated(DisguiseSessionRecord),
    /// A session ended.
    Deactivated {
        /// The closed record.
        record: DisguiseSessionRecord,
        /// Why it ended.
        reason: DeactivationReason,
    },
}

/// Outcome of a successful activation.
#[derive(Clone, Debug, PartialEq)]
pub struct Activation {
    /// The new live record.
    pub record: DisguiseSessionRecord,
    /// The session it replaced, already closed.
    pub replaced: Option<DisguiseSessionRecord>,
}

/// Parameters of [`DisguiseSessionManager::activate`].
#[derive(Clone, Debug)]
pub struct ActivationRequest {
    /// Hider.
    pub participant: ParticipantId,
    /// Hider position.
    pub position: Vec3,
    /// Current appearance, restored on teardown.
    pub appearance: AppearanceSnapshot,
    /// Preferred object kind, if any.
    pub preferred_kind: Option<ObjectKind>,
    /// Hider skill in `[0, 1]`.
    pub skill_level: Option<f32>,
    /// Request time.
    pub now: TimestampMs,
}

impl ActivationRequest {
    /// Request for the top-ranked option.
    #[must_use]
    pub fn new(
        participant: ParticipantId,
        position: Vec3,
        appearance: AppearanceSnapshot,
        now: TimestampMs,
    ) -> Self {
        Self {
            participant,
            position,
            appearance,
            preferred_kind: None,
            skill_level: None,
            now,
        }
    }

    /// Prefers options of `kind`.
    #[must_use]
    pub fn with_preferred_kind(mut self, kind: ObjectKind) -> Self {
        self.preferred_kind = Some(kind);
        self
    }

    /// Sets the skill level.
    #[must_use]
    pub fn with_skill(mut self, skill: f32) -> Self {
        self.skill_level = Some(skill);
        self
    }
}

type CacheKey = (ParticipantId, [i32; 3]);

#[derive(Debug)]
struct CachedOptions {
    options: Vec<GeneratedDisguise>,
    created_at: TimestampMs,
}

/// Per-participant disguise lifecycle.
pub struct DisguiseSessionManager {
    config: SessionConfig,
    world: Arc<dyn WorldQuery>,
    appearance: Arc<dyn AppearanceTransformer>,
    scanner: EnvironmentScanner,
    generator: DisguiseGenerator,
    active: HashMap<ParticipantId, DisguiseSessionRecord>,
    history: VecDeque<DisguiseSessionRecord>,
    cache: HashMap<CacheKey, CachedOptions>,
    events: EventBus<SessionEvent>,
}

impl std::fmt::Debug for DisguiseSessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DisguiseSessionManager")
            .field("active", &self.active.len())
            .field("history", &self.history.len())
            .field("cached", &self.cache.len())
            .finish_non_exhaustive()
    }
}

impl DisguiseSessionManager {
    /// Creates a manager with default scanner and generator settings.
    #[must_use]
    pub fn new(
        config: SessionConfig,
        world: Arc<dyn WorldQuery>,
        appearance: Arc<dyn AppearanceTransformer>,
    ) -> Self {
        Self {
            config,
            world,
            appearance,
            scanner: EnvironmentScanner::default(),
            generator: DisguiseGenerator::default(),
            active: HashMap::new(),
            history: VecDeque::new(),
            cache: HashMap::new(),
            events: EventBus::new("session"),
        }
    }

    /// Replaces the scanner settings.
    #[must_use]
    pub fn with_scanner(mut self, config: ScannerConfig) -> Self {
        self.scanner = EnvironmentScanner::new(config);
        self
    }

    /// Replaces the generator settings.
    #[must_use]
    pub fn with_generator(mut self, config: GeneratorConfig) -> Self {
        self.generator = DisguiseGenerator::new(config);
        self
    }

    /// Lifecycle event bus.
    #[must_use]
    pub fn events(&self) -> &EventBus<SessionEvent> {
        &self.events
    }

    /// Options a hider would be offered at `position`, without activating.
    pub fn generate_options(
        &mut self,
        participant: ParticipantId,
        position: Vec3,
        skill_level: Option<f32>,
        now: TimestampMs,
    ) -> Vec<GeneratedDisguise> {
        let key = self.cache_key(participant, position);
        if let Some(entry) = self.cache.get(&key) {
            if now.saturating_sub(entry.created_at) < self.config.cache_ttl_ms {
                return entry.options.clone();
            }
        }

        let candidates = self.scanner.scan(self.world.as_ref(), position);
        let mut request = GenerationRequest::new(&candidates, position, now);
        if let Some(skill) = skill_level {
            request = request.with_skill(skill);
        }
        let options = self.generator.generate(&request);

        self.cache.insert(
            key,
            CachedOptions {
                options: options.clone(),
                created_at: now,
            },
        );
        options
    }

    /// Activates a disguise, replacing any existing one.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` for a non-finite position
    /// - `NoDisguiseAvailable` if nothing nearby qualifies; an existing
    ///   session is left untouched
    /// - `TransformationFailed` / `Timeout` if the appearance call fails;
    ///   no record is created
    pub async fn activate(&mut self, request: ActivationRequest) -> CamouflageResult<Activation> {
        let participant = request.participant;
        if !request.position.is_finite() {
            return Err(CamouflageError::InvalidInput(format!(
                "non-finite position for {participant}"
            )));
        }

        let options =
            self.generate_options(participant, request.position, request.skill_level, request.now);
        let chosen = request
            .preferred_kind
            .and_then(|kind| options.iter().find(|o| o.kind() == kind))
            .or_else(|| options.first())
            .cloned();
        let Some(mut disguise) = chosen else {
            tracing::debug!(%participant, "no disguise available");
            return Err(CamouflageError::NoDisguiseAvailable { participant });
        };
        disguise.restamp(request.now);

        // Options are single-use once a session is built from them.
        self.forget_cache(participant);

        let replaced = self
            .force_teardown(participant, DeactivationReason::Replaced, request.now)
            .await;

        self.call_apply(participant, &disguise).await?;

        let record = DisguiseSessionRecord {
            participant,
            restrictions: disguise.option.restrictions.clone(),
            disguise,
            started_at: request.now,
            ended_at: None,
            end_reason: None,
            original_appearance: request.appearance,
            position: request.position,
        };
        self.active.insert(participant, record.clone());

        tracing::info!(
            %participant,
            disguise = %record.disguise.id,
            kind = %record.disguise.kind(),
            difficulty = %record.disguise.difficulty,
            "disguise activated"
        );
        self.events.publish(&SessionEvent::Activated(record.clone()));

        Ok(Activation { record, replaced })
    }

    /// Ends `participant`'s session after reverting its appearance.
    ///
    /// Returns `Ok(None)` when there is no session.
    ///
    /// # Errors
    ///
    /// `TransformationFailed` / `Timeout` if the revert fails; the session stays active.
    pub async fn deactivate(
        &mut self,
        participant: ParticipantId,
        now: TimestampMs,
    ) -> CamouflageResult<Option<DisguiseSessionRecord>> {
        let Some(original) = self
            .active
            .get(&participant)
            .map(|r| r.original_appearance.clone())
        else {
            return Ok(None);
        };

        self.call_revert(participant, &original).await?;

        Ok(self.close(participant, DeactivationReason::Requested, now))
    }

    /// Ends `participant`'s session regardless of the revert outcome.
    ///
    /// Used for discovery, expiry, replacement and departure.
    pub async fn force_teardown(
        &mut self,
        participant: ParticipantId,
        reason: DeactivationReason,
        now: TimestampMs,
    ) -> Option<DisguiseSessionRecord> {
        let original = self.active.get(&participant)?.original_appearance.clone();

        if let Err(err) = self.call_revert(participant, &original).await {
            tracing::warn!(%participant, ?reason, error = %err, "revert failed during teardown");
        }

        self.close(participant, reason, now)
    }

    /// Participants whose disguise has expired at `now`.
    #[must_use]
    pub fn expired(&self, now: TimestampMs) -> Vec<ParticipantId> {
        let mut ids: Vec<ParticipantId> = self
            .active
            .values()
            .filter(|r| r.disguise.is_expired(now))
            .map(|r| r.participant)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Drops cache entries older than the TTL.
    pub fn prune_cache(&mut self, now: TimestampMs) {
        let ttl = self.config.cache_ttl_ms;
        self.cache
            .retain(|_, entry| now.saturating_sub(entry.created_at) < ttl);
    }

    /// Drops every cached option set for `participant`.
    pub fn forget_cache(&mut self, participant: ParticipantId) {
        self.cache.retain(|(owner, _), _| *owner != participant);
    }

    /// Live session of `participant`.
    #[must_use]
    pub fn active_session(&self, participant: ParticipantId) -> Option<&DisguiseSessionRecord> {
        self.active.get(&participant)
    }

    /// True if `participant` is disguised.
    #[must_use]
    pub fn is_active(&self, participant: ParticipantId) -> bool {
        self.active.contains_key(&participant)
    }

    /// All live sessions.
    pub fn active_sessions(&self) -> impl Iterator<Item = &DisguiseSessionRecord> {
        self.active.values()
    }

    /// Number of live sessions.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Ended sessions, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &DisguiseSessionRecord> {
        self.history.iter()
    }

    fn close(
        &mut self,
        participant: ParticipantId,
        reason: DeactivationReason,
        now: TimestampMs,
    ) -> Option<DisguiseSessionRecord> {
        let record = self.active.remove(&participant)?.close(reason, now);

        self.history.push_back(record.clone());
        while self.history.len() > self.config.history_limit {
            self.history.pop_front();
        }

        tracing::info!(%participant, disguise = %record.disguise.id, ?reason, "disguise ended");
        self.events.publish(&SessionEvent::Deactivated {
            record: record.clone(),
            reason,
        });
        Some(record)
    }

    async fn call_apply(
        &self,
        participant: ParticipantId,
        disguise: &GeneratedDisguise,
    ) -> CamouflageResult<()> {
        let budget_ms = self.config.collaborator_timeout_ms;
        let call = self.appearance.apply(participant, disguise);
        match tokio::time::timeout(Duration::from_millis(budget_ms), call).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => {
                tracing::warn!(%participant, error = %err, "appearance apply failed");
                Err(CamouflageError::TransformationFailed {
                    operation: "apply",
                    participant,
                    reason: err.0,
                })
            }
            Err(_) => {
                tracing::warn!(%participant, budget_ms, "appearance apply timed out");
                Err(CamouflageError::Timeout {
                    operation: "apply",
                    participant,
                    budget_ms,
                })
            }
        }
    }

    async fn call_revert(
        &self,
        participant: ParticipantId,
        original: &AppearanceSnapshot,
    ) -> CamouflageResult<()> {
        let budget_ms = self.config.collaborator_timeout_ms;
        let call = self.appearance.revert(participant, original);
        match tokio::time::timeout(Duration::from_millis(budget_ms), call).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(CamouflageError::TransformationFailed {
                operation: "revert",
                participant,
                reason: err.0,
            }),
            Err(_) => Err(CamouflageError::Timeout {
                operation: "revert",
                participant,
                budget_ms,
            }),
        }
    }

    fn cache_key(&self, participant: ParticipantId, position: Vec3) -> CacheKey {
        let size = if self.config.cache_bucket_size > 0.0 {
            self.config.cache_bucket_size
        } else {
            1.0
        };
        let bucket = |v: f32| (v / size).floor() as i32;
        (participant, [bucket(position.x), bucket(position.y), bucket(position.z)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::appearance::ScriptedAppearance;
    use crate::object::SpatialObject;
    use crate::world::InMemoryWorld;
    use parking_lot::Mutex;

    const HIDER: ParticipantId = ParticipantId(1);

    fn world() -> Arc<InMemoryWorld> {
        Arc::new(InMemoryWorld::with_objects(vec![
            SpatialObject::new(1, ObjectKind::Box, Vec3::new(1.0, 0.0, 1.0), Vec3::new(2.0, 2.0, 2.0)),
            SpatialObject::new(2, ObjectKind::Tree, Vec3::new(-2.0, 0.0, 0.0), Vec3::new(1.0, 5.0, 1.0)),
        ]))
    }

    fn manager(appearance: Arc<ScriptedAppearance>) -> DisguiseSessionManager {
        DisguiseSessionManager::new(SessionConfig::default(), world(), appearance)
    }

    fn request(now: TimestampMs) -> ActivationRequest {
        ActivationRequest::new(HIDER, Vec3::ZERO, AppearanceSnapshot::default(), now)
    }

    #[tokio::test]
    async fn test_activate_and_deactivate() {
        let appearance = Arc::new(ScriptedAppearance::new());
        let mut sessions = manager(appearance.clone());

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        sessions.events().subscribe(move |e: &SessionEvent| sink.lock().push(e.clone()));

        let activation = sessions.activate(request(1_000)).await.unwrap();
        assert!(activation.replaced.is_none());
        assert_eq!(activation.record.started_at, 1_000);
        assert!(sessions.is_active(HIDER));
        assert_eq!(appearance.applied(), 1);

        let ended = sessions.deactivate(HIDER, 2_000).await.unwrap().unwrap();
        assert_eq!(ended.end_reason, Some(DeactivationReason::Requested));
        assert!(!sessions.is_active(HIDER));
        assert_eq!(sessions.history().count(), 1);

        // Second deactivation is a no-op.
        assert!(sessions.deactivate(HIDER, 3_000).await.unwrap().is_none());
        assert_eq!(seen.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_reactivation_keeps_one_record() {
        let appearance = Arc::new(ScriptedAppearance::new());
        let mut sessions = manager(appearance);

        sessions
            .activate(request(0).with_preferred_kind(ObjectKind::Box))
            .await
            .unwrap();
        let second = sessions
            .activate(request(10).with_preferred_kind(ObjectKind::Tree))
            .await
            .unwrap();

        assert_eq!(sessions.active_count(), 1);
        assert_eq!(second.record.disguise.kind(), ObjectKind::Tree);
        let replaced = second.replaced.unwrap();
        assert_eq!(replaced.disguise.kind(), ObjectKind::Box);
        assert_eq!(replaced.end_reason, Some(DeactivationReason::Replaced));
        assert_eq!(
            sessions.active_session(HIDER).unwrap().disguise.kind(),
            ObjectKind::Tree
        );
    }

    #[tokio::test]
    async fn test_apply_failure_leaves_no_record() {
        let appearance = Arc::new(ScriptedAppearance::new());
        appearance.fail_next_apply(1);
        let mut sessions = manager(appearance);

        let err = sessions.activate(request(0)).await.unwrap_err();
        assert!(matches!(err, CamouflageError::TransformationFailed { operation: "apply", .. }));
        assert!(!sessions.is_active(HIDER));
        assert_eq!(sessions.history().count(), 0);
    }

    #[tokio::test]
    async fn test_revert_failure_keeps_session() {
        let appearance = Arc::new(ScriptedAppearance::new());
        let mut sessions = manager(appearance.clone());
        sessions.activate(request(0)).await.unwrap();

        appearance.fail_next_revert(1);
        assert!(sessions.deactivate(HIDER, 5).await.is_err());
        assert!(sessions.is_active(HIDER));

        // Forced teardown ignores the collaborator.
        appearance.fail_next_revert(1);
        let record = sessions
            .force_teardown(HIDER, DeactivationReason::Discovered, 6)
            .await
            .unwrap();
        assert_eq!(record.end_reason, Some(DeactivationReason::Discovered));
        assert!(!sessions.is_active(HIDER));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_collaborator_times_out() {
        let appearance = Arc::new(ScriptedAppearance::new());
        appearance.set_delay_ms(10_000);
        let mut sessions = manager(appearance);

        let err = sessions.activate(request(0)).await.unwrap_err();
        assert!(matches!(err, CamouflageError::Timeout { budget_ms: 2_000, .. }));
        assert!(!sessions.is_active(HIDER));
    }

    #[tokio::test]
    async fn test_no_options_keeps_existing_session() {
        let appearance = Arc::new(ScriptedAppearance::new());
        let mut sessions = manager(appearance);
        sessions.activate(request(0)).await.unwrap();

        let far = ActivationRequest::new(HIDER, Vec3::new(500.0, 0.0, 0.0), AppearanceSnapshot::default(), 1);
        let err = sessions.activate(far).await.unwrap_err();
        assert_eq!(err, CamouflageError::NoDisguiseAvailable { participant: HIDER });
        assert!(sessions.is_active(HIDER));
    }

    #[tokio::test]
    async fn test_expiry_listing() {
        let appearance = Arc::new(ScriptedAppearance::new());
        let mut sessions = manager(appearance);
        let activation = sessions.activate(request(0)).await.unwrap();
        let expires_at = activation.record.disguise.expires_at;

        assert!(sessions.expired(expires_at - 1).is_empty());
        assert_eq!(sessions.expired(expires_at), vec![HIDER]);
    }

    #[test]
    fn test_options_are_cached_per_bucket() {
        let appearance = Arc::new(ScriptedAppearance::new());
        let mut sessions = manager(appearance);

        let a = sessions.generate_options(HIDER, Vec3::ZERO, None, 0);
        let b = sessions.generate_options(HIDER, Vec3::new(0.4, 0.0, 0.4), None, 100);
        assert_eq!(a, b);

        // Past the TTL the options are regenerated with fresh ids.
        let c = sessions.generate_options(HIDER, Vec3::ZERO, None, 5_000);
        assert_ne!(a[0].id, c[0].id);

        sessions.prune_cache(10_000);
        let d = sessions.generate_options(HIDER, Vec3::ZERO, None, 10_000);
        assert_ne!(c[0].id, d[0].id);
    }
}
