//! # Appearance Collaborator
//!
//! The renderer side of a disguise. `apply` and `revert` are the only
//! suspension points in the disguise lifecycle and either may fail.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use lurk_shared::ParticipantId;

use crate::error::AppearanceError;
use crate::generator::GeneratedDisguise;

/// What a participant looked like before disguising. Plain value, cloned freely.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AppearanceSnapshot {
    /// Model reference.
    pub model: String,
    /// Uniform scale.
    pub scale: f32,
    /// Tint.
    pub color: [f32; 3],
}

impl AppearanceSnapshot {
    /// Snapshot with unit scale and white tint.
    #[must_use]
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            scale: 1.0,
            color: [1.0, 1.0, 1.0],
        }
    }
}

impl Default for AppearanceSnapshot {
    fn default() -> Self {
        Self::new("characters/default.glb")
    }
}

/// Applies and reverts disguises on the participant's visual.
#[async_trait]
pub trait AppearanceTransformer: Send + Sync {
    /// Makes `participant` look like `disguise`.
    async fn apply(
        &self,
        participant: ParticipantId,
        disguise: &GeneratedDisguise,
    ) -> Result<(), AppearanceError>;

    /// Restores `original`.
    async fn revert(
        &self,
        participant: ParticipantId,
        original: &AppearanceSnapshot,
    ) -> Result<(), AppearanceError>;
}

/// One recorded collaborator call.
#[derive(Clone, Debug, PartialEq)]
pub enum AppearanceCall {
    /// `apply` was attempted.
    Apply {
        /// Target participant.
        participant: ParticipantId,
        /// Disguise id.
        disguise_id: String,
        /// Whether the call succeeded.
        ok: bool,
    },
    /// `revert` was attempted.
    Revert {
        /// Target participant.
        participant: ParticipantId,
        /// Model restored.
        model: String,
        /// Whether the call succeeded.
        ok: bool,
    },
}

#[derive(Debug, Default)]
struct Script {
    calls: Vec<AppearanceCall>,
    fail_apply: u32,
    fail_revert: u32,
    delay_ms: u64,
}

/// Scriptable in-memory collaborator: records calls, fails on demand,
/// optionally stalls to exercise timeouts.
#[derive(Debug, Default)]
pub struct ScriptedAppearance {
    script: Mutex<Script>,
}

impl ScriptedAppearance {
    /// Collaborator that always succeeds immediately.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `n` apply calls fail.
    pub fn fail_next_apply(&self, n: u32) {
        self.script.lock().fail_apply = n;
    }

    /// The next `n` revert calls fail.
    pub fn fail_next_revert(&self, n: u32) {
        self.script.lock().fail_revert = n;
    }

    /// Every call sleeps this long before answering.
    pub fn set_delay_ms(&self, delay_ms: u64) {
        self.script.lock().delay_ms = delay_ms;
    }

    /// All calls so far, oldest first.
    #[must_use]
    pub fn calls(&self) -> Vec<AppearanceCall> {
        self.script.lock().calls.clone()
    }

    /// Number of successful applies.
    #[must_use]
    pub fn applied(&self) -> usize {
        self.script
            .lock()
            .calls
            .iter()
            .filter(|c| matches!(c, AppearanceCall::Apply { ok: true, .. }))
            .count()
    }

    /// Number of successful reverts.
    #[must_use]
    pub fn reverted(&self) -> usize {
        self.script
            .lock()
            .calls
            .iter()
            .filter(|c| matches!(c, AppearanceCall::Revert { ok: true, .. }))
            .count()
    }

    async fn stall(&self) {
        let delay_ms = self.script.lock().delay_ms;
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
    }
}

#[async_trait]
impl AppearanceTransformer for ScriptedAppearance {
    async fn apply(
        &self,
        participant: ParticipantId,
        disguise: &GeneratedDisguise,
    ) -> Result<(), AppearanceError> {
        self.stall().await;
        let mut script = self.script.lock();
        let ok = script.fail_apply == 0;
        script.fail_apply = script.fail_apply.saturating_sub(1);
        script.calls.push(AppearanceCall::Apply {
            participant,
            disguise_id: disguise.id.clone(),
            ok,
        });
        if ok {
            Ok(())
        } else {
            Err(AppearanceError(format!("scripted apply failure for {participant}")))
        }
    }

    async fn revert(
        &self,
        participant: ParticipantId,
        original: &AppearanceSnapshot,
    ) -> Result<(), AppearanceError> {
        self.stall().await;
        let mut script = self.script.lock();
        let ok = script.fail_revert == 0;
        script.fail_revert = script.fail_revert.saturating_sub(1);
        script.calls.push(AppearanceCall::Revert {
            participant,
            model: original.model.clone(),
            ok,
        });
        if ok {
            Ok(())
        } else {
            Err(AppearanceError(format!("scripted revert failure for {participant}")))
        }
    }
}
