// src/exposure.rs

use crate::config::ExposurePolicy;
use crate::constants::DAY_SECONDS;
use crate::error::EngineResult;
use crate::models::{ExposureRecord, QuestionId, QuestionItem};
use crate::repository::ExposureLedger;
use chrono::{DateTime, Utc};
use log::{debug, info};
use std::collections::{HashMap, HashSet};

// --- Filter ---

/// Anti-repetition rule for a single question.
pub fn is_eligible(record: Option<&ExposureRecord>, now: DateTime<Utc>, policy: &ExposurePolicy) -> bool {
    match record {
        None => true,
        Some(r) if r.times_shown >= policy.max_times_shown => false,
        Some(r) => (now - r.last_shown_at).num_seconds() >= policy.min_days_since_seen * DAY_SECONDS,
    }
}

/// Drops questions seen too often or too recently. Pure; never writes.
pub fn filter_pool<'a>(
    pool: &'a [QuestionItem],
    exposures: &HashMap<QuestionId, ExposureRecord>,
    now: DateTime<Utc>,
    policy: &ExposurePolicy,
) -> Vec<&'a QuestionItem> {
    let eligible: Vec<&QuestionItem> = pool
        .iter()
        .filter(|q| is_eligible(exposures.get(&q.id), now, policy))
        .collect();
    debug!(
        "[Exposure] {} of {} questions eligible (cooldown {}d, cap {})",
        eligible.len(),
        pool.len(),
        policy.min_days_since_seen,
        policy.max_times_shown
    );
    eligible
}

// --- Commit ---

/// The ledger entry after one more showing of `question_id`.
pub fn next_exposure(
    existing: Option<&ExposureRecord>,
    question_id: &str,
    assessment_id: &str,
    now: DateTime<Utc>,
) -> ExposureRecord {
    ExposureRecord {
        question_id: question_id.to_string(),
        times_shown: existing.map_or(0, |r| r.times_shown) + 1,
        last_shown_at: now,
        last_assessment_id: assessment_id.to_string(),
    }
}

/// Records that the learner actually took `question_ids` in `assessment_id`.
///
/// Call once per completed assessment, after scoring. Ids repeated within
/// one call count once.
pub fn record_exposure(
    ledger: &dyn ExposureLedger,
    learner_id: &str,
    question_ids: &[QuestionId],
    assessment_id: &str,
    now: DateTime<Utc>,
) -> EngineResult<Vec<ExposureRecord>> {
    let mut seen = HashSet::new();
    let unique: Vec<QuestionId> = question_ids
        .iter()
        .filter(|id| seen.insert(id.as_str()))
        .cloned()
        .collect();

    let records = ledger.commit_exposure(learner_id, &unique, assessment_id, now)?;
    info!(
        "[Exposure] Learner {}: recorded {} questions for assessment {}",
        learner_id,
        records.len(),
        assessment_id
    );
    Ok(records)
}
