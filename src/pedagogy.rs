// src/pedagogy.rs

use crate::analysis::{analyze_topics, top_weak_topics};
use crate::catalog::{QuestionBank, TopicCatalog};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::exposure::{self, filter_pool};
use crate::models::{
    AssemblyResult, AttemptRecord, DifficultyHistogram, ExposureRecord, QuestionItem, Recommendation,
    TopicId,
};
use crate::performance::evaluate_recent;
use crate::pipeline::{default_steps, personalization_score, run_pipeline, AssemblyContext};
use crate::recommendation::rank_next_topic;
use crate::repository::{AttemptHistory, ExposureLedger, SkipCounterStore};
use crate::selection::partition_candidates;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use rand::RngCore;
use std::collections::HashMap;

// --- Public Interface ---

/// Builds a personalised mock exam for `learner_id`.
///
/// Reads the exposure ledger but never writes it; call [`commit_assessment`]
/// once the learner has actually taken the returned questions.
#[allow(clippy::too_many_arguments)]
pub fn generate_assessment(
    bank: &QuestionBank,
    config: &EngineConfig,
    learner_id: &str,
    attempts: &[AttemptRecord],
    exam_id: &str,
    ledger: &dyn ExposureLedger,
    now: DateTime<Utc>,
    rng: &mut dyn RngCore,
) -> EngineResult<AssemblyResult> {
    debug_assert!(
        attempts.windows(2).all(|w| w[0].timestamp <= w[1].timestamp),
        "attempt history must be in timestamp order"
    );
    debug!("Generating assessment {} for learner {}...", exam_id, learner_id);

    // 1. Weak areas and difficulty tier
    let urgencies = analyze_topics(attempts, &bank.catalog().topics, config);
    let focus = top_weak_topics(&urgencies, config.focus_topic_count);
    let recent = evaluate_recent(attempts, now, config);
    let focus_topics: Vec<TopicId> = focus.iter().map(|u| u.topic_id.clone()).collect();
    debug!(
        "Focus topics: {:?}, tier {} from {} recent attempts",
        focus_topics, recent.recommended_tier, recent.sample_size
    );

    // 2. Anti-repetition gate
    let exposures = ledger.exposures_for(learner_id)?;
    let pool = filter_pool(bank.items(), &exposures, now, &config.exposure);

    // 3. Constraint pipeline
    let partition = partition_candidates(&pool, bank, &focus, &mut *rng);
    let ctx = AssemblyContext::new(bank, config, partition, focus_topics, recent.recommended_tier);
    let state = run_pipeline(&default_steps(), &ctx, &mut *rng);

    let questions: Vec<QuestionItem> = state.items().cloned().collect();
    let result = AssemblyResult {
        learner_id: learner_id.to_string(),
        exam_id: exam_id.to_string(),
        difficulty_histogram: DifficultyHistogram::from_items(&questions),
        difficulty_tier: recent.recommended_tier,
        personalization_score: personalization_score(&state, &ctx),
        focus_topics: ctx.focus_topics.clone(),
        warnings: state.warnings.clone(),
        questions,
    };

    if result.warnings.is_empty() {
        info!(
            "Assessment {} ready: {} questions, tier {}, personalization {}",
            exam_id,
            result.questions.len(),
            result.difficulty_tier,
            result.personalization_score
        );
    } else {
        warn!(
            "Assessment {} ready with {} warnings: {} questions, tier {}",
            exam_id,
            result.warnings.len(),
            result.questions.len(),
            result.difficulty_tier
        );
    }
    Ok(result)
}

/// Picks the next topic for `learner_id` from their history and skip counters.
pub fn recommend_next_topic(
    catalog: &TopicCatalog,
    config: &EngineConfig,
    learner_id: &str,
    attempts: &[AttemptRecord],
    skips: &HashMap<TopicId, u32>,
) -> EngineResult<Recommendation> {
    let urgencies = analyze_topics(attempts, &catalog.topics, config);
    let recommendation = rank_next_topic(&urgencies, skips, attempts.is_empty(), catalog, config)
        .ok_or_else(|| EngineError::InvalidConfig("topic catalog is empty".to_string()))?;

    info!(
        "Learner {}: recommending {} ({:?})",
        learner_id, recommendation.topic_id, recommendation.priority_tier
    );
    Ok(recommendation)
}

/// Records that the learner took every question of `result`.
pub fn commit_assessment(
    ledger: &dyn ExposureLedger,
    result: &AssemblyResult,
    now: DateTime<Utc>,
) -> EngineResult<Vec<ExposureRecord>> {
    exposure::record_exposure(
        ledger,
        &result.learner_id,
        &result.question_ids(),
        &result.exam_id,
        now,
    )
}

/// Appends a finished attempt and clears the skip counter of its topic.
pub fn record_attempt(
    history: &dyn AttemptHistory,
    skips: &dyn SkipCounterStore,
    learner_id: &str,
    attempt: &AttemptRecord,
) -> EngineResult<()> {
    history.append_attempt(learner_id, attempt)?;
    skips.clear_skip(learner_id, &attempt.topic_id)?;
    info!(
        "Learner {}: recorded {}% on {}",
        learner_id, attempt.score, attempt.topic_id
    );
    Ok(())
}

/// The learner bypassed the recommendation for `topic_id`.
pub fn skip_recommendation(
    skips: &dyn SkipCounterStore,
    learner_id: &str,
    topic_id: &str,
) -> EngineResult<u32> {
    let count = skips.increment_skip(learner_id, topic_id)?;
    debug!("Learner {}: skipped {} ({} times)", learner_id, topic_id, count);
    Ok(count)
}
