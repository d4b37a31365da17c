// src/recommendation.rs

use crate::catalog::TopicCatalog;
use crate::config::EngineConfig;
use crate::models::{PriorityTier, Recommendation, TopicId, TopicUrgency};
use log::{debug, info, warn};
use std::cmp::Ordering;
use std::collections::HashMap;

fn skips_for(skips: &HashMap<TopicId, u32>, topic: &str) -> u32 {
    skips.get(topic).copied().unwrap_or(0)
}

fn by_score(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

fn weak_justification(u: &TopicUrgency, config: &EngineConfig) -> String {
    if u.average_score < config.critical_score {
        format!(
            "Your average in {} is {:.0}%. This is a critical gap: go back over the basics before your next mock exam.",
            u.topic_id, u.average_score
        )
    } else if u.average_score < config.severe_score {
        format!(
            "{} is at {:.0}% with a mastery of {:.0}. Focused practice here will lift your overall result the most.",
            u.topic_id, u.average_score, u.mastery
        )
    } else {
        format!(
            "You are close to passing {} ({:.0}%, mastery {:.0}). A little more practice should get you over the line.",
            u.topic_id, u.average_score, u.mastery
        )
    }
}

fn recommendation(u: &TopicUrgency, tier: PriorityTier, justification: String, skips: u32) -> Recommendation {
    Recommendation {
        topic_id: u.topic_id.clone(),
        justification,
        priority_tier: tier,
        urgency_score: u.urgency,
        suppression_count: skips,
    }
}

/// Picks the single next topic to study.
///
/// Stateless: recomputed from the current urgencies and skip counters on
/// every call. Returns `None` only when there is no topic at all.
pub fn rank_next_topic(
    urgencies: &[TopicUrgency],
    skips: &HashMap<TopicId, u32>,
    is_new_user: bool,
    catalog: &TopicCatalog,
    config: &EngineConfig,
) -> Option<Recommendation> {
    let suppressed = |topic: &str| skips_for(skips, topic) >= config.max_skips;

    // 1. New user: walk the beginner path.
    if is_new_user {
        let topic = catalog
            .beginner_sequence
            .iter()
            .find(|t| !suppressed(t.as_str()))
            .or_else(|| catalog.beginner_sequence.first())
            .or_else(|| catalog.topics.first())?;
        info!("[Ranker] New learner, starting with {}", topic);
        return Some(Recommendation {
            topic_id: topic.clone(),
            justification: format!(
                "Start with {}, the first step of the beginner path. It builds the basics the rest of the exam relies on.",
                topic
            ),
            priority_tier: PriorityTier::High,
            urgency_score: 0.0,
            suppression_count: skips_for(skips, topic),
        });
    }

    // 2. Weak areas the learner has not repeatedly bypassed.
    let mut weak: Vec<&TopicUrgency> = urgencies
        .iter()
        .filter(|u| u.is_weak && !suppressed(u.topic_id.as_str()))
        .collect();
    weak.sort_by(|a, b| {
        a.is_unpracticed()
            .cmp(&b.is_unpracticed())
            .then_with(|| by_score(a.average_score, b.average_score))
            .then_with(|| by_score(a.mastery, b.mastery))
            .then_with(|| skips_for(skips, &a.topic_id).cmp(&skips_for(skips, &b.topic_id)))
    });
    if let Some(u) = weak.first() {
        let n = skips_for(skips, &u.topic_id);
        info!("[Ranker] Weak area {} (avg {:.1}, mastery {:.1})", u.topic_id, u.average_score, u.mastery);
        return Some(recommendation(u, PriorityTier::Critical, weak_justification(u, config), n));
    }

    // 3. No open weak area: unpracticed topics first, then the lowest scores.
    let non_weak: Vec<&TopicUrgency> = urgencies.iter().filter(|u| !u.is_weak).collect();
    let unsuppressed: Vec<&TopicUrgency> = non_weak
        .iter()
        .copied()
        .filter(|u| !suppressed(u.topic_id.as_str()))
        .collect();
    let mut candidates = if unsuppressed.is_empty() { non_weak } else { unsuppressed };
    let beginner_rank = |topic: &str| catalog.is_beginner_topic(topic).unwrap_or(usize::MAX);
    candidates.sort_by(|a, b| {
        b.is_unpracticed()
            .cmp(&a.is_unpracticed())
            .then_with(|| {
                if a.is_unpracticed() && b.is_unpracticed() {
                    beginner_rank(a.topic_id.as_str()).cmp(&beginner_rank(b.topic_id.as_str()))
                } else {
                    Ordering::Equal
                }
            })
            .then_with(|| by_score(a.average_score, b.average_score))
            .then_with(|| skips_for(skips, &a.topic_id).cmp(&skips_for(skips, &b.topic_id)))
    });
    if let Some(u) = candidates.first() {
        let n = skips_for(skips, &u.topic_id);
        let (tier, justification) = if u.is_unpracticed() {
            (
                PriorityTier::High,
                format!("You have not practised {} yet. Try a short quiz to see where you stand.", u.topic_id),
            )
        } else if u.average_score < config.comfort_threshold {
            (
                PriorityTier::High,
                format!(
                    "{} is passing at {:.0}% but still below the comfortable {:.0}% mark.",
                    u.topic_id, u.average_score, config.comfort_threshold
                ),
            )
        } else {
            (
                PriorityTier::Medium,
                format!("{} is strong ({:.0}%). A quick refresher keeps it that way.", u.topic_id, u.average_score),
            )
        };
        debug!("[Ranker] No open weak area, suggesting {} ({:?})", u.topic_id, tier);
        return Some(recommendation(u, tier, justification, n));
    }

    // 4. Every topic is weak and has been skipped too often.
    let fallback = urgencies.iter().min_by(|a, b| {
        skips_for(skips, &a.topic_id)
            .cmp(&skips_for(skips, &b.topic_id))
            .then_with(|| by_score(a.average_score, b.average_score))
    })?;
    let n = skips_for(skips, &fallback.topic_id);
    warn!("[Ranker] All topics weak and suppressed, falling back to {}", fallback.topic_id);
    Some(recommendation(
        fallback,
        PriorityTier::Medium,
        format!(
            "You have put off {} {} times. Every topic still needs work, so give it another go when you are ready.",
            fallback.topic_id, n
        ),
        n,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::analyze_topics;
    use crate::models::AttemptRecord;
    use chrono::{Duration, TimeZone, Utc};

    fn attempt(topic: &str, score: u8, day: i64) -> AttemptRecord {
        AttemptRecord {
            topic_id: topic.to_string(),
            score,
            total_questions: 10,
            correct_count: score as u32 / 10,
            timestamp: Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap() + Duration::days(day),
        }
    }

    fn catalog() -> TopicCatalog {
        TopicCatalog {
            topics: vec!["A".into(), "B".into(), "C".into()],
            beginner_sequence: vec!["C".into(), "A".into()],
            mandatory_themes: Vec::new(),
        }
    }

    fn rank(attempts: &[AttemptRecord], skips: &[(&str, u32)]) -> Recommendation {
        let config = EngineConfig::default();
        let catalog = catalog();
        let urgencies = analyze_topics(attempts, &catalog.topics, &config);
        let skips: HashMap<TopicId, u32> = skips.iter().map(|(t, n)| (t.to_string(), *n)).collect();
        rank_next_topic(&urgencies, &skips, attempts.is_empty(), &catalog, &config).unwrap()
    }

    #[test]
    fn new_user_gets_first_beginner_topic() {
        let rec = rank(&[], &[]);
        assert_eq!(rec.topic_id, "C");
        assert_eq!(rec.priority_tier, PriorityTier::High);
    }

    #[test]
    fn weakest_topic_is_critical() {
        let attempts = vec![attempt("A", 55, 0), attempt("A", 58, 1), attempt("B", 85, 2)];
        let rec = rank(&attempts, &[]);
        assert_eq!(rec.topic_id, "A");
        assert_eq!(rec.priority_tier, PriorityTier::Critical);
        assert!(rec.justification.contains("close to passing"));
        assert!(rec.urgency_score > 0.0);
    }

    #[test]
    fn justification_reflects_severity() {
        let rec = rank(&[attempt("A", 20, 0), attempt("B", 90, 1)], &[]);
        assert!(rec.justification.contains("critical gap"));
        let rec = rank(&[attempt("A", 45, 0), attempt("B", 90, 1)], &[]);
        assert!(rec.justification.contains("Focused practice"));
    }

    #[test]
    fn justification_thresholds_come_from_config() {
        let config = EngineConfig {
            critical_score: 50.0,
            severe_score: 55.0,
            ..Default::default()
        };
        let catalog = catalog();
        let attempts = vec![attempt("A", 45, 0), attempt("B", 90, 1)];
        let urgencies = analyze_topics(&attempts, &catalog.topics, &config);
        let rec = rank_next_topic(&urgencies, &HashMap::new(), false, &catalog, &config).unwrap();
        assert!(rec.justification.contains("critical gap"));
    }

    #[test]
    fn suppressed_weak_topic_falls_through() {
        let attempts = vec![attempt("A", 30, 0), attempt("B", 50, 1), attempt("C", 92, 2)];
        let rec = rank(&attempts, &[("A", 3)]);
        assert_eq!(rec.topic_id, "B");
        assert_eq!(rec.priority_tier, PriorityTier::Critical);

        // Both weak topics bypassed: fall through to the non-weak path.
        let rec = rank(&attempts, &[("A", 3), ("B", 3)]);
        assert_eq!(rec.topic_id, "C");
        assert_eq!(rec.priority_tier, PriorityTier::Medium);
    }

    #[test]
    fn unpracticed_topics_come_first_without_weak_areas() {
        let rec = rank(&[attempt("B", 70, 0)], &[]);
        // A and C unpracticed; C leads the beginner path.
        assert_eq!(rec.topic_id, "C");
        assert_eq!(rec.priority_tier, PriorityTier::High);
        assert!(rec.justification.contains("not practised"));
    }

    #[test]
    fn below_comfort_is_high_priority() {
        let attempts = vec![attempt("A", 95, 0), attempt("B", 75, 1), attempt("C", 90, 2)];
        let rec = rank(&attempts, &[]);
        assert_eq!(rec.topic_id, "B");
        assert_eq!(rec.priority_tier, PriorityTier::High);
    }

    #[test]
    fn lowercase_attempts_count_as_practice() {
        let attempts = vec![attempt("a", 95, 0), attempt("b", 75, 1), attempt("c", 90, 2)];
        let rec = rank(&attempts, &[]);
        assert_eq!(rec.topic_id, "B");
        assert_eq!(rec.priority_tier, PriorityTier::High);
        assert!(!rec.justification.contains("not practised"));
    }

    #[test]
    fn all_weak_and_suppressed_falls_back() {
        let attempts = vec![attempt("A", 30, 0), attempt("B", 40, 1), attempt("C", 20, 2)];
        let rec = rank(&attempts, &[("A", 3), ("B", 4), ("C", 5)]);
        assert_eq!(rec.topic_id, "A");
        assert_eq!(rec.priority_tier, PriorityTier::Medium);
        assert_eq!(rec.suppression_count, 3);
    }
}
