// src/config.rs

use crate::constants::*;
use crate::error::{EngineError, EngineResult};
use crate::models::{Bucket, Difficulty};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Share of a bucket assigned to each difficulty.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DifficultyBand {
    pub easy: f64,
    pub medium: f64,
    pub hard: f64,
}

impl DifficultyBand {
    const fn from_tuple(t: (f64, f64, f64)) -> Self {
        DifficultyBand {
            easy: t.0,
            medium: t.1,
            hard: t.2,
        }
    }

    pub fn share(&self, difficulty: Difficulty) -> f64 {
        match difficulty {
            Difficulty::Easy => self.easy,
            Difficulty::Medium => self.medium,
            Difficulty::Hard => self.hard,
        }
    }
}

/// Tier bands used by the difficulty balancer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DifficultyBands {
    /// Tier <= 3: mostly easy/medium, no hard
    pub low: DifficultyBand,
    /// Tier 4-6
    pub mid: DifficultyBand,
    /// Tier 7-8
    pub high: DifficultyBand,
    /// Tier >= 9
    pub top: DifficultyBand,
}

impl Default for DifficultyBands {
    fn default() -> Self {
        Self {
            low: DifficultyBand::from_tuple(BAND_LOW),
            mid: DifficultyBand::from_tuple(BAND_MID),
            high: DifficultyBand::from_tuple(BAND_HIGH),
            top: DifficultyBand::from_tuple(BAND_TOP),
        }
    }
}

impl DifficultyBands {
    pub fn for_tier(&self, tier: u8) -> &DifficultyBand {
        match tier {
            0..=3 => &self.low,
            4..=6 => &self.mid,
            7..=8 => &self.high,
            _ => &self.top,
        }
    }

    fn all(&self) -> [(&'static str, &DifficultyBand); 4] {
        [
            ("low", &self.low),
            ("mid", &self.mid),
            ("high", &self.high),
            ("top", &self.top),
        ]
    }
}

/// Minimum recent average that earns `tier`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierThreshold {
    pub min_average: f64,
    pub tier: u8,
}

fn default_tier_thresholds() -> Vec<TierThreshold> {
    TIER_THRESHOLDS
        .iter()
        .map(|&(min_average, tier)| TierThreshold { min_average, tier })
        .collect()
}

/// Anti-repetition policy applied to the candidate pool.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExposurePolicy {
    pub min_days_since_seen: i64,
    pub max_times_shown: u32,
}

impl Default for ExposurePolicy {
    fn default() -> Self {
        Self {
            min_days_since_seen: MIN_DAYS_SINCE_SEEN,
            max_times_shown: MAX_TIMES_SHOWN,
        }
    }
}

/// Every tunable threshold of the engine in one value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    // Weak-area analysis
    pub weak_threshold: f64,
    pub recent_half_weight: f64,
    pub older_half_weight: f64,
    pub consistency_cap: f64,
    pub consistency_divisor: f64,
    pub improvement_threshold: f64,
    pub improving_multiplier: f64,
    pub declining_multiplier: f64,

    // Recent performance
    pub recent_window_days: i64,
    pub recent_exam_count: usize,
    pub exam_like_min_questions: u32,
    pub trend_threshold: f64,
    pub new_user_tier: u8,
    /// Highest `min_average` first.
    pub tier_thresholds: Vec<TierThreshold>,
    pub floor_tier: u8,

    // Anti-repetition
    pub exposure: ExposurePolicy,

    // Exam structure
    pub non_visual_target: usize,
    pub visual_target: usize,
    pub focus_topic_count: usize,
    pub weak_share_single: f64,
    pub weak_share_few: f64,
    pub weak_share_many: f64,
    pub difficulty_bands: DifficultyBands,

    // Recommendation
    pub max_skips: u32,
    pub comfort_threshold: f64,
    pub critical_score: f64,
    pub severe_score: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            weak_threshold: WEAK_THRESHOLD,
            recent_half_weight: RECENT_HALF_WEIGHT,
            older_half_weight: OLDER_HALF_WEIGHT,
            consistency_cap: CONSISTENCY_URGENCY_CAP,
            consistency_divisor: CONSISTENCY_VARIANCE_DIVISOR,
            improvement_threshold: IMPROVEMENT_THRESHOLD,
            improving_multiplier: IMPROVING_MULTIPLIER,
            declining_multiplier: DECLINING_MULTIPLIER,
            recent_window_days: RECENT_WINDOW_DAYS,
            recent_exam_count: RECENT_EXAM_COUNT,
            exam_like_min_questions: EXAM_LIKE_MIN_QUESTIONS,
            trend_threshold: TREND_THRESHOLD,
            new_user_tier: NEW_USER_TIER,
            tier_thresholds: default_tier_thresholds(),
            floor_tier: FLOOR_TIER,
            exposure: ExposurePolicy::default(),
            non_visual_target: NON_VISUAL_TARGET,
            visual_target: VISUAL_TARGET,
            focus_topic_count: FOCUS_TOPIC_COUNT,
            weak_share_single: WEAK_SHARE_SINGLE,
            weak_share_few: WEAK_SHARE_FEW,
            weak_share_many: WEAK_SHARE_MANY,
            difficulty_bands: DifficultyBands::default(),
            max_skips: MAX_SKIPS,
            comfort_threshold: COMFORT_THRESHOLD,
            critical_score: CRITICAL_SCORE,
            severe_score: SEVERE_SCORE,
        }
    }
}

impl EngineConfig {
    /// Reads a JSON config file. Missing keys keep their defaults.
    pub fn load(path: &Path) -> EngineResult<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn from_json(contents: &str) -> EngineResult<Self> {
        let config: EngineConfig = serde_json::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn total(&self) -> usize {
        self.non_visual_target + self.visual_target
    }

    pub fn target(&self, bucket: Bucket) -> usize {
        match bucket {
            Bucket::NonVisual => self.non_visual_target,
            Bucket::Visual => self.visual_target,
        }
    }

    /// Base difficulty tier for a recent average score.
    pub fn tier_for_average(&self, average: f64) -> u8 {
        self.tier_thresholds
            .iter()
            .find(|t| average >= t.min_average)
            .map_or(self.floor_tier, |t| t.tier)
    }

    /// Fraction of the exam reserved for weak topics.
    pub fn weak_share(&self, weak_topic_count: usize) -> f64 {
        match weak_topic_count {
            0 => 0.0,
            1 => self.weak_share_single,
            2..=3 => self.weak_share_few,
            _ => self.weak_share_many,
        }
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.total() == 0 {
            return Err(EngineError::InvalidConfig(
                "exam must contain at least one question".into(),
            ));
        }
        if !(0.0..=100.0).contains(&self.weak_threshold) {
            return Err(EngineError::InvalidConfig(format!(
                "weak threshold {} outside 0-100",
                self.weak_threshold
            )));
        }
        for (name, value) in [
            ("recent_half_weight", self.recent_half_weight),
            ("older_half_weight", self.older_half_weight),
            ("improving_multiplier", self.improving_multiplier),
            ("declining_multiplier", self.declining_multiplier),
            ("consistency_divisor", self.consistency_divisor),
        ] {
            if value <= 0.0 {
                return Err(EngineError::InvalidConfig(format!(
                    "{name} must be positive, got {value}"
                )));
            }
        }
        for (name, value) in [
            ("weak_share_single", self.weak_share_single),
            ("weak_share_few", self.weak_share_few),
            ("weak_share_many", self.weak_share_many),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(EngineError::InvalidConfig(format!(
                    "{name} must be within 0-1, got {value}"
                )));
            }
        }
        for (name, band) in self.difficulty_bands.all() {
            let sum = band.easy + band.medium + band.hard;
            let negative = band.easy < 0.0 || band.medium < 0.0 || band.hard < 0.0;
            if negative || (sum - 1.0).abs() > 1e-6 {
                return Err(EngineError::InvalidConfig(format!(
                    "difficulty band '{name}' must be non-negative and sum to 1, got {sum:.3}"
                )));
            }
        }
        let tiers = self
            .tier_thresholds
            .iter()
            .map(|t| ("tier threshold", t.tier))
            .chain([("new user tier", self.new_user_tier), ("floor tier", self.floor_tier)]);
        for (name, tier) in tiers {
            if !(TIER_MIN..=TIER_MAX).contains(&tier) {
                return Err(EngineError::InvalidConfig(format!(
                    "{name} {tier} outside {TIER_MIN}-{TIER_MAX}"
                )));
            }
        }
        if self
            .tier_thresholds
            .windows(2)
            .any(|w| w[0].min_average <= w[1].min_average)
        {
            return Err(EngineError::InvalidConfig(
                "tier thresholds must be ordered by descending average".into(),
            ));
        }
        if self.critical_score > self.severe_score {
            return Err(EngineError::InvalidConfig(format!(
                "critical score {} above severe score {}",
                self.critical_score, self.severe_score
            )));
        }
        Ok(())
    }
}
