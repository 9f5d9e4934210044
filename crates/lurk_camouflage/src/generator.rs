//! # Disguise Generator
//!
//! Turns ranked scan candidates into a short list of labeled disguises.
//!
//! ## Pipeline
//!
//! 1. **Filter + map** - drop candidates below `min_believability`, build a
//!    [`DisguiseOption`] per survivor
//! 2. **Enhance** - id, difficulty, tags, duration, extra restrictions
//! 3. **Diversity** - best option of each kind first, then fill by score
//! 4. **Skill pass** - boost easy options for novices, hard ones for experts
//! 5. **Adaptive difficulty** - drop the band the hider would find trivial or hopeless
//! 6. **Truncate** to quota
//!
//! Everything here is deterministic for a given input.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashSet};
use std::fmt;

use lurk_shared::constants::{
    BASE_DISGUISE_DURATION_MS, DEFAULT_MAX_OPTIONS, DEFAULT_MIN_BELIEVABILITY,
    MAX_DISGUISE_DURATION_MS, MIN_DISGUISE_DURATION_MS,
};
use lurk_shared::{clamp_unit, MovementRestriction, PlayerAction, TimestampMs, Vec3};

use crate::object::{ObjectId, ObjectKind};
use crate::scanner::AnalyzedCandidate;
use crate::tables;

/// Difficulty band of a disguise, derived from its believability.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    /// Score >= 0.8.
    Easy,
    /// Score >= 0.6.
    Medium,
    /// Anything lower.
    Hard,
}

impl Difficulty {
    /// Band for a score.
    #[must_use]
    pub fn from_score(score: f32) -> Self {
        if score >= 0.8 {
            Self::Easy
        } else if score >= 0.6 {
            Self::Medium
        } else {
            Self::Hard
        }
    }

    /// Duration multiplier.
    #[must_use]
    pub const fn duration_multiplier(self) -> f32 {
        match self {
            Self::Easy => 1.5,
            Self::Medium => 1.0,
            Self::Hard => 0.7,
        }
    }

    /// Score adjustment applied after labeling.
    #[must_use]
    pub const fn score_nudge(self) -> f32 {
        match self {
            Self::Easy => -0.02,
            Self::Medium => 0.0,
            Self::Hard => 0.03,
        }
    }

    /// Clamps `score` into this band so the label stays truthful.
    #[must_use]
    pub fn clamp_into(self, score: f32) -> f32 {
        let (lo, hi) = match self {
            Self::Easy => (0.8, 1.0),
            Self::Medium => (0.6, 0.799_999),
            Self::Hard => (0.0, 0.599_999),
        };
        clamp_unit(score).clamp(lo, hi)
    }

    /// Actions forbidden on top of the kind's speed limit.
    #[must_use]
    pub const fn forbidden_actions(self) -> &'static [PlayerAction] {
        match self {
            Self::Easy => &[],
            Self::Medium => &[PlayerAction::Sprint],
            Self::Hard => &[PlayerAction::Sprint, PlayerAction::Jump],
        }
    }

    /// Stable lowercase tag.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Generator knobs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Candidates scoring below this are discarded.
    pub min_believability: f32,
    /// Quota of options returned.
    pub max_options: usize,
    /// Share of the quota filled after the one-per-kind pass.
    pub diversity_factor: f32,
    /// Enables the skill pass.
    pub enable_skill_adjustment: bool,
    /// Enables adaptive difficulty filtering.
    pub enable_adaptive_difficulty: bool,
    /// Options scoring below this get a direction restriction.
    pub extra_restriction_threshold: f32,
    /// Gap between the object's surface and the target position.
    pub surface_clearance: f32,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            min_believability: DEFAULT_MIN_BELIEVABILITY,
            max_options: DEFAULT_MAX_OPTIONS,
            diversity_factor: 0.7,
            enable_skill_adjustment: true,
            enable_adaptive_difficulty: true,
            extra_restriction_threshold: 0.7,
            surface_clearance: 0.5,
        }
    }
}

/// A disguise a hider could take, before labeling.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DisguiseOption {
    /// Object the option imitates.
    pub source: ObjectId,
    /// Kind of that object.
    pub kind: ObjectKind,
    /// Visual model reference for the appearance collaborator.
    pub model: String,
    /// Uniform scale.
    pub scale: f32,
    /// Believability in `[0, 1]`.
    pub believability: f32,
    /// Restrictions imposed while active.
    pub restrictions: Vec<MovementRestriction>,
    /// Where the hider should stand.
    pub target_position: Vec3,
    /// `30 s x score`.
    pub base_duration_ms: u64,
}

/// A labeled, time-boxed disguise.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeneratedDisguise {
    /// Unique id (`disguise-N`).
    pub id: String,
    /// The underlying option.
    pub option: DisguiseOption,
    /// When it was generated.
    pub generated_at: TimestampMs,
    /// When it stops being valid. Always after `generated_at`.
    pub expires_at: TimestampMs,
    /// `expires_at - generated_at`.
    pub duration_ms: u64,
    /// Difficulty band.
    pub difficulty: Difficulty,
    /// Descriptive tags.
    pub tags: BTreeSet<String>,
}

impl GeneratedDisguise {
    /// Kind shortcut.
    #[must_use]
    pub fn kind(&self) -> ObjectKind {
        self.option.kind
    }

    /// Believability shortcut.
    #[must_use]
    pub fn believability(&self) -> f32 {
        self.option.believability
    }

    /// Moves the validity window to start at `now`, keeping its length.
    pub fn restamp(&mut self, now: TimestampMs) {
        self.generated_at = now;
        self.expires_at = now.saturating_add(self.duration_ms);
    }

    /// True once `now` has reached `expires_at`.
    #[must_use]
    pub fn is_expired(&self, now: TimestampMs) -> bool {
        now >= self.expires_at
    }

    /// True if the tag set contains `tag`.
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }
}

/// Input to one generation run.
#[derive(Clone, Copy, Debug)]
pub struct GenerationRequest<'a> {
    /// Ranked scan output.
    pub candidates: &'a [AnalyzedCandidate],
    /// Where the hider is standing.
    pub hider_position: Vec3,
    /// Hider skill in `[0, 1]`; `None` skips the skill-driven passes.
    pub skill_level: Option<f32>,
    /// Generation time.
    pub now: TimestampMs,
}

impl<'a> GenerationRequest<'a> {
    /// Request without skill information.
    #[must_use]
    pub fn new(candidates: &'a [AnalyzedCandidate], hider_position: Vec3, now: TimestampMs) -> Self {
        Self {
            candidates,
            hider_position,
            skill_level: None,
            now,
        }
    }

    /// Sets the skill level.
    #[must_use]
    pub fn with_skill(mut self, skill: f32) -> Self {
        self.skill_level = Some(clamp_unit(skill));
        self
    }
}

/// Produces labeled disguise lists. Only state is the id counter.
#[derive(Debug, Default)]
pub struct DisguiseGenerator {
    config: GeneratorConfig,
    next_id: u64,
}

impl DisguiseGenerator {
    /// Creates a generator.
    #[must_use]
    pub fn new(config: GeneratorConfig) -> Self {
        Self { config, next_id: 0 }
    }

    /// Current config.
    #[must_use]
    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Runs the full pipeline. Empty input yields empty output.
    pub fn generate(&mut self, request: &GenerationRequest<'_>) -> Vec<GeneratedDisguise> {
        let quota = self.config.max_options.max(1);

        let options: Vec<DisguiseOption> = request
            .candidates
            .iter()
            .filter(|c| c.can_disguise && c.score >= self.config.min_believability)
            .map(|c| self.to_option(c, request.hider_position))
            .collect();

        if options.is_empty() {
            return Vec::new();
        }

        let mut enhanced: Vec<GeneratedDisguise> = options
            .into_iter()
            .map(|o| self.enhance(o, request.now))
            .collect();
        sort_by_score(&mut enhanced);

        let mut selected = self.diversify(enhanced, quota);

        if let Some(skill) = request.skill_level {
            if self.config.enable_skill_adjustment {
                apply_skill(&mut selected, skill);
                sort_by_score(&mut selected);
            }
            if self.config.enable_adaptive_difficulty {
                selected = adapt_difficulty(selected, skill);
            }
        }

        selected.truncate(quota);

        tracing::debug!(
            candidates = request.candidates.len(),
            options = selected.len(),
            "disguise options generated"
        );
        selected
    }

    fn to_option(&self, candidate: &AnalyzedCandidate, hider: Vec3) -> DisguiseOption {
        let object = &candidate.object;
        let score = clamp_unit(candidate.score);

        let mut restrictions = vec![MovementRestriction::Speed {
            multiplier: tables::speed_multiplier(object.kind),
        }];
        if score < self.config.extra_restriction_threshold {
            restrictions.push(MovementRestriction::Direction { lateral_cap: 0.5 });
        }

        let toward_hider = (hider - object.position)
            .horizontal()
            .normalized()
            .unwrap_or(Vec3::X);
        let offset = object.footprint() * 0.5 + self.config.surface_clearance;

        DisguiseOption {
            source: object.id,
            kind: object.kind,
            model: tables::model_ref(object.kind),
            scale: object.footprint().clamp(0.25, 4.0),
            believability: score,
            restrictions,
            target_position: object.position + toward_hider * offset,
            base_duration_ms: (BASE_DISGUISE_DURATION_MS as f32 * score) as u64,
        }
    }

    fn enhance(&mut self, mut option: DisguiseOption, now: TimestampMs) -> GeneratedDisguise {
        self.next_id += 1;
        let score = option.believability;
        let difficulty = Difficulty::from_score(score);

        let duration_ms = (option.base_duration_ms as f32 * difficulty.duration_multiplier() * score)
            .clamp(MIN_DISGUISE_DURATION_MS as f32, MAX_DISGUISE_DURATION_MS as f32)
            as u64;

        for &action in difficulty.forbidden_actions() {
            let restriction = MovementRestriction::Action { action };
            if !option.restrictions.contains(&restriction) {
                option.restrictions.push(restriction);
            }
        }

        option.believability = difficulty.clamp_into(score + difficulty.score_nudge());

        let tags = build_tags(&option);

        GeneratedDisguise {
            id: format!("disguise-{}", self.next_id),
            option,
            generated_at: now,
            expires_at: now.saturating_add(duration_ms),
            duration_ms,
            difficulty,
            tags,
        }
    }

    fn diversify(&self, ranked: Vec<GeneratedDisguise>, quota: usize) -> Vec<GeneratedDisguise> {
        let mut seen = HashSet::new();
        let mut picked = Vec::with_capacity(quota);
        let mut rest = Vec::new();

        for disguise in ranked {
            if picked.len() < quota && seen.insert(disguise.kind()) {
                picked.push(disguise);
            } else {
                rest.push(disguise);
            }
        }

        let fill_to = ((quota as f32 * self.config.diversity_factor).ceil() as usize)
            .clamp(picked.len(), quota);
        let missing = fill_to - picked.len();
        picked.extend(rest.into_iter().take(missing));

        sort_by_score(&mut picked);
        picked
    }
}

fn sort_by_score(list: &mut [GeneratedDisguise]) {
    list.sort_by(|a, b| {
        b.believability()
            .partial_cmp(&a.believability())
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.option.source.cmp(&b.option.source))
    });
}

fn build_tags(option: &DisguiseOption) -> BTreeSet<String> {
    let mut tags = BTreeSet::new();
    tags.insert(option.kind.as_str().to_owned());
    tags.insert(tables::size_class(option.scale).to_owned());
    tags.insert(tables::quality_class(option.believability).to_owned());
    tags.insert(tables::flavor(option.kind).to_owned());

    for restriction in &option.restrictions {
        let tag = match *restriction {
            MovementRestriction::Speed { multiplier } if multiplier <= 0.15 => "stationary",
            MovementRestriction::Speed { multiplier } if multiplier < 0.5 => "slow",
            MovementRestriction::Speed { .. } => continue,
            MovementRestriction::Direction { .. } => "axis_locked",
            MovementRestriction::Action { action: PlayerAction::Jump } => "no_jump",
            MovementRestriction::Action { action: PlayerAction::Sprint } => "no_sprint",
            MovementRestriction::Action { action: PlayerAction::Interact } => "no_interact",
        };
        tags.insert(tag.to_owned());
    }
    tags
}

fn apply_skill(list: &mut [GeneratedDisguise], skill: f32) {
    for disguise in list.iter_mut() {
        let factor = match disguise.difficulty {
            Difficulty::Easy if skill < 0.3 => 1.2,
            Difficulty::Hard if skill > 0.7 => 1.1,
            _ => continue,
        };
        disguise.option.believability = disguise
            .difficulty
            .clamp_into(disguise.option.believability * factor);
    }
}

fn adapt_difficulty(list: Vec<GeneratedDisguise>, skill: f32) -> Vec<GeneratedDisguise> {
    let recent_success = clamp_unit(0.2 + 0.6 * skill);
    let dropped = if recent_success > 0.7 {
        Difficulty::Easy
    } else if recent_success < 0.3 {
        Difficulty::Hard
    } else {
        return list;
    };

    let kept: Vec<GeneratedDisguise> = list
        .iter()
        .filter(|d| d.difficulty != dropped)
        .cloned()
        .collect();
    if kept.is_empty() {
        list
    } else {
        kept
    }
}
