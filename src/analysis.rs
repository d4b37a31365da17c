// src/analysis.rs

use crate::catalog::normalize;
use crate::config::EngineConfig;
use crate::models::{AttemptRecord, TopicId, TopicUrgency};
use log::debug;
use std::cmp::Ordering;
use std::collections::HashMap;

// --- Public Interface ---

/// Computes a `TopicUrgency` for every catalog topic and every topic seen in
/// the history. Catalog order first, then history-only topics by name.
/// Topic ids match case-insensitively; history-only topics keep the spelling
/// of their first attempt.
pub fn analyze_topics(
    attempts: &[AttemptRecord],
    catalog_topics: &[TopicId],
    config: &EngineConfig,
) -> Vec<TopicUrgency> {
    let grouped = group_scores(attempts);
    let mut urgencies = Vec::with_capacity(catalog_topics.len() + grouped.len());

    let catalog_keys: Vec<String> = catalog_topics.iter().map(|t| normalize(t)).collect();
    for (topic, key) in catalog_topics.iter().zip(&catalog_keys) {
        match grouped.get(key) {
            Some(group) => urgencies.push(score_topic(topic, &group.scores, config)),
            None => urgencies.push(TopicUrgency::unpracticed(topic)),
        }
    }

    let mut extra: Vec<&TopicScores> = grouped
        .iter()
        .filter(|(key, _)| !catalog_keys.contains(*key))
        .map(|(_, group)| group)
        .collect();
    extra.sort_unstable_by(|a, b| a.name.cmp(b.name));
    for group in extra {
        urgencies.push(score_topic(group.name, &group.scores, config));
    }

    debug!(
        "[Analyzer] {} topics analyzed, {} weak",
        urgencies.len(),
        urgencies.iter().filter(|u| u.is_weak).count()
    );
    urgencies
}

/// Weak topics ordered by urgency (descending), ties broken by lower mastery.
pub fn top_weak_topics(urgencies: &[TopicUrgency], limit: usize) -> Vec<&TopicUrgency> {
    let mut weak: Vec<&TopicUrgency> = urgencies.iter().filter(|u| u.is_weak).collect();
    weak.sort_by(|a, b| {
        b.urgency
            .partial_cmp(&a.urgency)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.mastery.partial_cmp(&b.mastery).unwrap_or(Ordering::Equal))
            .then_with(|| a.topic_id.cmp(&b.topic_id))
    });
    weak.truncate(limit);
    weak
}

// --- Internal Algorithm Logic ---

struct TopicScores<'a> {
    name: &'a str,
    scores: Vec<f64>,
}

/// Scores grouped per normalized topic id, in timestamp order.
fn group_scores(attempts: &[AttemptRecord]) -> HashMap<String, TopicScores<'_>> {
    let mut ordered: Vec<&AttemptRecord> = attempts.iter().collect();
    ordered.sort_by_key(|a| a.timestamp);

    let mut grouped: HashMap<String, TopicScores<'_>> = HashMap::new();
    for attempt in ordered {
        debug_assert!(attempt.score <= 100, "unvalidated attempt reached engine");
        grouped
            .entry(normalize(&attempt.topic_id))
            .or_insert_with(|| TopicScores {
                name: attempt.topic_id.as_str(),
                scores: Vec::new(),
            })
            .scores
            .push(f64::from(attempt.score));
    }
    grouped
}

fn score_topic(topic: &str, scores: &[f64], config: &EngineConfig) -> TopicUrgency {
    let average = mean(scores);
    let mastery = weighted_mastery(scores, config);
    let (older, recent) = split_halves(scores);

    let consistency_urgency = (variance(scores) / config.consistency_divisor).min(config.consistency_cap);
    let trend_urgency = if older.is_empty() {
        0.0
    } else {
        (mean(older) - mean(recent)).max(0.0)
    };
    let score_urgency = (config.weak_threshold - average).max(0.0);
    let raw_urgency = score_urgency + consistency_urgency + trend_urgency;

    let improvement_delta = if older.is_empty() {
        0.0
    } else {
        weighted_mastery(recent, config) - weighted_mastery(older, config)
    };
    let urgency = if improvement_delta > config.improvement_threshold {
        raw_urgency * config.improving_multiplier
    } else if improvement_delta < -config.improvement_threshold {
        raw_urgency * config.declining_multiplier
    } else {
        raw_urgency
    };

    let is_weak = average < config.weak_threshold || mastery < config.weak_threshold;

    debug!(
        "[Analyzer] {}: avg {:.1}, mastery {:.1}, urgency {:.2} (score {:.1} + consistency {:.1} + trend {:.1}), delta {:+.1}",
        topic, average, mastery, urgency, score_urgency, consistency_urgency, trend_urgency, improvement_delta
    );

    TopicUrgency {
        topic_id: topic.to_string(),
        attempts: scores.len(),
        average_score: average,
        mastery,
        urgency,
        improvement_delta,
        is_weak,
    }
}

/// Splits chronologically ordered scores into (older, recent). The recent
/// half takes the middle element when the count is odd.
fn split_halves(scores: &[f64]) -> (&[f64], &[f64]) {
    scores.split_at(scores.len() / 2)
}

/// Recency-weighted average: recent half counts `recent_half_weight` times.
pub(crate) fn weighted_mastery(scores: &[f64], config: &EngineConfig) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    let (older, recent) = split_halves(scores);
    let weighted_sum = recent.iter().sum::<f64>() * config.recent_half_weight
        + older.iter().sum::<f64>() * config.older_half_weight;
    let weight = recent.len() as f64 * config.recent_half_weight
        + older.len() as f64 * config.older_half_weight;
    weighted_sum / weight
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let avg = mean(values);
    values.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / values.len() as f64
}
