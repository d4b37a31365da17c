// src/performance.rs

use crate::analysis::mean;
use crate::config::EngineConfig;
use crate::constants::{TIER_MAX, TIER_MIN};
use crate::models::{AttemptRecord, RecentPerformance, Trend};
use chrono::{DateTime, Duration, Utc};
use log::debug;

/// Short-window performance summary and the difficulty tier it implies.
///
/// The window is the union of attempts from the last `recent_window_days`
/// and the last `recent_exam_count` exam-like attempts. When both are empty
/// but history exists, the last `recent_exam_count` attempts of any kind are
/// used instead.
pub fn evaluate_recent(
    attempts: &[AttemptRecord],
    now: DateTime<Utc>,
    config: &EngineConfig,
) -> RecentPerformance {
    if attempts.is_empty() {
        debug!("[Performance] No history, defaulting to tier {}", config.new_user_tier);
        return RecentPerformance {
            average_score: 0.0,
            trend: Trend::Stable,
            recommended_tier: config.new_user_tier,
            sample_size: 0,
        };
    }

    let scores = window_scores(attempts, now, config);
    let average = mean(&scores);
    let trend = detect_trend(&scores, config.trend_threshold);
    let base_tier = config.tier_for_average(average);
    let recommended_tier = match trend {
        Trend::Improving => (base_tier + 1).min(TIER_MAX),
        Trend::Declining => base_tier.saturating_sub(1).max(TIER_MIN),
        Trend::Stable => base_tier,
    };

    debug!(
        "[Performance] {} recent attempts, avg {:.1}, trend {:?}, tier {} -> {}",
        scores.len(),
        average,
        trend,
        base_tier,
        recommended_tier
    );

    RecentPerformance {
        average_score: average,
        trend,
        recommended_tier,
        sample_size: scores.len(),
    }
}

/// First-half vs second-half comparison of chronologically ordered scores.
pub fn detect_trend(scores: &[f64], threshold: f64) -> Trend {
    if scores.len() < 2 {
        return Trend::Stable;
    }
    let (first, second) = scores.split_at(scores.len() / 2);
    let delta = mean(second) - mean(first);
    if delta > threshold {
        Trend::Improving
    } else if delta < -threshold {
        Trend::Declining
    } else {
        Trend::Stable
    }
}

fn window_scores(attempts: &[AttemptRecord], now: DateTime<Utc>, config: &EngineConfig) -> Vec<f64> {
    let mut ordered: Vec<&AttemptRecord> = attempts.iter().collect();
    ordered.sort_by_key(|a| a.timestamp);

    let cutoff = now - Duration::days(config.recent_window_days);
    let exam_like: Vec<usize> = ordered
        .iter()
        .enumerate()
        .filter(|(_, a)| a.total_questions >= config.exam_like_min_questions)
        .map(|(i, _)| i)
        .collect();
    let recent_exams = &exam_like[exam_like.len().saturating_sub(config.recent_exam_count)..];

    let mut selected: Vec<&AttemptRecord> = ordered
        .iter()
        .enumerate()
        .filter(|(i, a)| a.timestamp >= cutoff || recent_exams.contains(i))
        .map(|(_, a)| *a)
        .collect();

    if selected.is_empty() {
        let start = ordered.len().saturating_sub(config.recent_exam_count);
        selected = ordered[start..].to_vec();
    }

    selected.iter().map(|a| f64::from(a.score)).collect()
}
