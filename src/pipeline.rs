// src/pipeline.rs

use crate::assembly::StructuralFill;
use crate::catalog::QuestionBank;
use crate::config::EngineConfig;
use crate::constants::{PERSONALIZATION_DIFFICULTY_WEIGHT, PERSONALIZATION_WEAK_WEIGHT};
use crate::difficulty::{difficulty_targets, DifficultyBalance};
use crate::diversity::ThemeRepair;
use crate::error::AssemblyWarning;
use crate::models::{Bucket, Difficulty, QuestionItem, TopicId};
use crate::selection::CandidatePartition;
use log::{debug, warn};
use rand::RngCore;
use std::collections::HashSet;

/// Everything the steps read but never change.
pub struct AssemblyContext<'a> {
    pub bank: &'a QuestionBank,
    pub config: &'a EngineConfig,
    pub partition: CandidatePartition<'a>,
    pub focus_topics: Vec<TopicId>,
    pub tier: u8,
    eligible_ids: HashSet<&'a str>,
    weak_ids: HashSet<&'a str>,
}

impl<'a> AssemblyContext<'a> {
    pub fn new(
        bank: &'a QuestionBank,
        config: &'a EngineConfig,
        partition: CandidatePartition<'a>,
        focus_topics: Vec<TopicId>,
        tier: u8,
    ) -> Self {
        let eligible_ids = partition.all().map(|q| q.id.as_str()).collect();
        let weak_ids = partition.weak_ids();
        AssemblyContext {
            bank,
            config,
            partition,
            focus_topics,
            tier,
            eligible_ids,
            weak_ids,
        }
    }

    pub fn is_weak(&self, item: &QuestionItem) -> bool {
        self.weak_ids.contains(item.id.as_str())
    }

    pub fn is_eligible(&self, item: &QuestionItem) -> bool {
        self.eligible_ids.contains(item.id.as_str())
    }

    /// Eligible questions of one bucket, weak candidates first.
    pub fn eligible_in(&self, bucket: Bucket) -> Vec<&'a QuestionItem> {
        self.partition.all().filter(|q| q.bucket() == bucket).collect()
    }

    /// Questions the exposure filter removed; the last-resort source.
    pub fn relaxed_in(&self, bucket: Bucket) -> Vec<&'a QuestionItem> {
        let bank: &'a QuestionBank = self.bank;
        bank.items()
            .iter()
            .filter(|q| q.bucket() == bucket && !self.is_eligible(q))
            .collect()
    }

    /// Size of the weak-topic share, split per bucket in the exam's ratio.
    pub fn weak_quota(&self, bucket: Bucket) -> usize {
        let total = self.config.total();
        let share = self.config.weak_share(self.focus_topics.len());
        let weak_total = (total as f64 * share).round() as usize;
        let non_visual =
            ((weak_total * self.config.non_visual_target) as f64 / total as f64).round() as usize;
        let quota = match bucket {
            Bucket::NonVisual => non_visual,
            Bucket::Visual => weak_total.saturating_sub(non_visual),
        };
        quota.min(self.config.target(bucket))
    }
}

/// The exam under construction.
#[derive(Debug, Clone, Default)]
pub struct AssemblyState<'a> {
    pub non_visual: Vec<&'a QuestionItem>,
    pub visual: Vec<&'a QuestionItem>,
    pub warnings: Vec<AssemblyWarning>,
}

impl<'a> AssemblyState<'a> {
    pub fn bucket(&self, bucket: Bucket) -> &Vec<&'a QuestionItem> {
        match bucket {
            Bucket::NonVisual => &self.non_visual,
            Bucket::Visual => &self.visual,
        }
    }

    pub fn bucket_mut(&mut self, bucket: Bucket) -> &mut Vec<&'a QuestionItem> {
        match bucket {
            Bucket::NonVisual => &mut self.non_visual,
            Bucket::Visual => &mut self.visual,
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.items().any(|q| q.id == id)
    }

    pub fn items(&self) -> impl Iterator<Item = &'a QuestionItem> + '_ {
        self.non_visual.iter().chain(self.visual.iter()).copied()
    }

    pub fn len(&self) -> usize {
        self.non_visual.len() + self.visual.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends from `source` until the bucket holds `limit` items. Items
    /// already selected or of the wrong type are skipped. Returns how many
    /// were added.
    pub fn fill_from<I>(&mut self, bucket: Bucket, source: I, limit: usize) -> usize
    where
        I: IntoIterator<Item = &'a QuestionItem>,
    {
        let mut added = 0;
        for item in source {
            if self.bucket(bucket).len() >= limit {
                break;
            }
            if item.bucket() != bucket || self.contains(&item.id) {
                continue;
            }
            self.bucket_mut(bucket).push(item);
            added += 1;
        }
        added
    }

    pub fn warn(&mut self, warning: AssemblyWarning) {
        if !self.warnings.contains(&warning) {
            self.warnings.push(warning);
        }
    }

    /// Per-theme count of selected questions covering it.
    pub fn theme_coverage(&self, bank: &QuestionBank) -> Vec<usize> {
        let mut coverage = vec![0; bank.theme_count()];
        for item in self.items() {
            for &theme in bank.themes_of(item) {
                coverage[theme] += 1;
            }
        }
        coverage
    }
}

/// One idempotent constraint satisfier. Running a step on a state that
/// already satisfies its constraint leaves the state unchanged.
pub trait ConstraintStep {
    fn name(&self) -> &'static str;

    fn apply<'a>(
        &self,
        state: &mut AssemblyState<'a>,
        ctx: &AssemblyContext<'a>,
        rng: &mut dyn RngCore,
    );
}

pub fn default_steps() -> Vec<Box<dyn ConstraintStep>> {
    vec![
        Box::new(StructuralFill),
        Box::new(DifficultyBalance),
        Box::new(ThemeRepair),
        Box::new(BucketRebuild),
        Box::new(StructuralCheck),
    ]
}

pub fn run_pipeline<'a>(
    steps: &[Box<dyn ConstraintStep>],
    ctx: &AssemblyContext<'a>,
    rng: &mut dyn RngCore,
) -> AssemblyState<'a> {
    let mut state = AssemblyState::default();
    for step in steps {
        step.apply(&mut state, ctx, &mut *rng);
        debug!(
            "[Pipeline] after {}: {} non-visual, {} visual",
            step.name(),
            state.non_visual.len(),
            state.visual.len()
        );
    }
    state
}

// --- Last-Resort Rebuild ---

/// Rebuilds any bucket whose size drifted from its target: weak-topic
/// questions first, then one question per uncovered mandatory theme, then
/// whatever fills the rest.
pub struct BucketRebuild;

impl ConstraintStep for BucketRebuild {
    fn name(&self) -> &'static str {
        "bucket-rebuild"
    }

    fn apply<'a>(
        &self,
        state: &mut AssemblyState<'a>,
        ctx: &AssemblyContext<'a>,
        _rng: &mut dyn RngCore,
    ) {
        for bucket in Bucket::ALL {
            let target = ctx.config.target(bucket);
            let current = state.bucket(bucket).clone();
            if current.len() == target {
                continue;
            }
            let available = ctx.bank.count(bucket);
            if current.len() < target && current.len() >= available {
                // Nothing left to draw from; the shortfall check reports it.
                continue;
            }

            warn!(
                "[Pipeline] Rebuilding {} bucket: {} of {} questions",
                bucket,
                current.len(),
                target
            );
            state.bucket_mut(bucket).clear();

            let weak_first = current
                .iter()
                .copied()
                .filter(|q| ctx.is_weak(q))
                .chain(ctx.partition.weak_in(bucket));
            state.fill_from(bucket, weak_first, ctx.weak_quota(bucket));

            for theme in 0..ctx.bank.theme_count() {
                if state.theme_coverage(ctx.bank)[theme] > 0 {
                    continue;
                }
                let provider = current
                    .iter()
                    .copied()
                    .chain(ctx.eligible_in(bucket))
                    .find(|q| ctx.bank.covers_theme(q, theme) && !state.contains(&q.id));
                if let Some(q) = provider {
                    state.fill_from(bucket, [q], target);
                }
            }

            let rest = current
                .iter()
                .copied()
                .chain(ctx.eligible_in(bucket))
                .chain(ctx.relaxed_in(bucket));
            state.fill_from(bucket, rest, target);
        }
    }
}

// --- Final Verification ---

/// Reports bucket shortfalls and exposure relaxation as warnings.
pub struct StructuralCheck;

impl ConstraintStep for StructuralCheck {
    fn name(&self) -> &'static str {
        "structural-check"
    }

    fn apply<'a>(
        &self,
        state: &mut AssemblyState<'a>,
        ctx: &AssemblyContext<'a>,
        _rng: &mut dyn RngCore,
    ) {
        for bucket in Bucket::ALL {
            let expected = ctx.config.target(bucket);
            let actual = state.bucket(bucket).len();
            if actual < expected {
                warn!(
                    "[Pipeline] Structural shortfall: {} bucket holds {} of {}",
                    bucket, actual, expected
                );
                state.warn(AssemblyWarning::StructuralShortfall {
                    bucket,
                    expected,
                    actual,
                });
            }
        }

        let relaxed = state.items().filter(|q| !ctx.is_eligible(q)).count();
        if relaxed > 0 {
            warn!("[Pipeline] {} questions reused despite recent exposure", relaxed);
            state.warn(AssemblyWarning::ExposureRelaxed { count: relaxed });
        }
    }
}

/// 0-100: how much of the exam targets the learner's weak topics (70%)
/// and how closely its difficulty mix matches the tier's band (30%).
pub fn personalization_score(state: &AssemblyState<'_>, ctx: &AssemblyContext<'_>) -> u8 {
    if ctx.focus_topics.is_empty() || state.is_empty() {
        return 0;
    }

    let quota: usize = Bucket::ALL.iter().map(|&b| ctx.weak_quota(b)).sum();
    let weak_items = state.items().filter(|q| ctx.is_weak(q)).count();
    let weak_fit = if quota == 0 {
        0.0
    } else {
        (weak_items as f64 / quota as f64).min(1.0)
    };

    let band = ctx.config.difficulty_bands.for_tier(ctx.tier);
    let mut matched = 0;
    for bucket in Bucket::ALL {
        let items = state.bucket(bucket);
        for (difficulty, target) in difficulty_targets(ctx.config.target(bucket), band) {
            let actual = items.iter().filter(|q| q.difficulty == difficulty).count();
            matched += actual.min(target);
        }
    }
    let difficulty_fit = matched as f64 / ctx.config.total() as f64;

    let score = PERSONALIZATION_WEAK_WEIGHT * weak_fit + PERSONALIZATION_DIFFICULTY_WEIGHT * difficulty_fit;
    score.round().clamp(0.0, 100.0) as u8
}

/// Difficulty of each selected question, grouped for logging.
pub(crate) fn describe(state: &AssemblyState<'_>) -> String {
    Difficulty::ALL
        .iter()
        .map(|d| {
            let count = state.items().filter(|q| q.difficulty == *d).count();
            format!("{}={}", d, count)
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::catalog::{ThemeTag, TopicCatalog};
    use crate::selection::partition_candidates;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    pub(crate) fn question(id: &str, topic: &str, visual: bool, difficulty: Difficulty) -> QuestionItem {
        QuestionItem {
            id: id.to_string(),
            topic_id: topic.to_string(),
            has_visual_asset: visual,
            difficulty,
        }
    }

    /// `n` questions per bucket on `topic`, difficulties cycling easy/medium/hard.
    pub(crate) fn questions(prefix: &str, topic: &str, non_visual: usize, visual: usize) -> Vec<QuestionItem> {
        let cycle = |i: usize| Difficulty::ALL[i % 3];
        (0..non_visual)
            .map(|i| question(&format!("{prefix}-n{i}"), topic, false, cycle(i)))
            .chain((0..visual).map(|i| question(&format!("{prefix}-v{i}"), topic, true, cycle(i))))
            .collect()
    }

    pub(crate) fn small_config() -> EngineConfig {
        EngineConfig {
            non_visual_target: 6,
            visual_target: 4,
            ..Default::default()
        }
    }

    #[test]
    fn weak_quota_splits_by_bucket_ratio() {
        let bank = QuestionBank::new(Vec::new(), TopicCatalog::driving_theory());
        let config = EngineConfig::default();
        let one = AssemblyContext::new(&bank, &config, CandidatePartition::default(), vec!["A".into()], 3);
        // 50 * 0.7 = 35 -> 21 / 14
        assert_eq!(one.weak_quota(Bucket::NonVisual), 21);
        assert_eq!(one.weak_quota(Bucket::Visual), 14);

        let many: Vec<TopicId> = ["A", "B", "C", "D"].iter().map(|t| t.to_string()).collect();
        let four = AssemblyContext::new(&bank, &config, CandidatePartition::default(), many, 3);
        assert_eq!(four.weak_quota(Bucket::NonVisual), 15);
        assert_eq!(four.weak_quota(Bucket::Visual), 10);

        let none = AssemblyContext::new(&bank, &config, CandidatePartition::default(), Vec::new(), 3);
        assert_eq!(none.weak_quota(Bucket::NonVisual), 0);
    }

    #[test]
    fn fill_from_skips_duplicates_and_wrong_type() {
        let items = questions("p", "Parking", 3, 2);
        let mut state = AssemblyState::default();
        let added = state.fill_from(Bucket::NonVisual, items.iter().chain(items.iter()), 10);
        assert_eq!(added, 3);
        assert_eq!(state.visual.len(), 0);
        assert_eq!(state.fill_from(Bucket::Visual, items.iter(), 1), 1);
        assert_eq!(state.len(), 4);
    }

    #[test]
    fn rebuild_restores_broken_bucket_in_isolation() {
        let config = small_config();
        let mut items = questions("p", "Parking", 10, 6);
        items.push(question("rb", "Roundabout Rules", false, Difficulty::Easy));
        let bank = QuestionBank::new(items, TopicCatalog::driving_theory());
        let pool: Vec<&QuestionItem> = bank.items().iter().collect();
        let mut rng = StdRng::seed_from_u64(3);
        let partition = partition_candidates(&pool, &bank, &[], &mut rng);
        let ctx = AssemblyContext::new(&bank, &config, partition, Vec::new(), 3);

        // Over-full visual bucket, under-full non-visual bucket.
        let mut state = AssemblyState::default();
        state.visual = bank.items().iter().filter(|q| q.has_visual_asset).collect();
        state.non_visual = bank.items().iter().filter(|q| !q.has_visual_asset).take(2).collect();

        BucketRebuild.apply(&mut state, &ctx, &mut rng);
        assert_eq!(state.visual.len(), 4);
        assert_eq!(state.non_visual.len(), 6);
        // The uncovered roundabout theme was pulled in during the rebuild.
        assert!(state.contains("rb"));

        // Idempotent once satisfied.
        let before = state.clone();
        BucketRebuild.apply(&mut state, &ctx, &mut rng);
        assert_eq!(before.non_visual, state.non_visual);
        assert_eq!(before.visual, state.visual);
    }

    #[test]
    fn rebuild_adds_one_provider_for_overlapping_themes() {
        let config = EngineConfig {
            non_visual_target: 2,
            visual_target: 0,
            ..Default::default()
        };
        let catalog = TopicCatalog {
            topics: vec!["Roundabout".into(), "Lanes".into(), "Parking".into()],
            beginner_sequence: Vec::new(),
            mandatory_themes: vec![ThemeTag::new("Roundabout", &[]), ThemeTag::new("Lanes", &[])],
        };
        let mut items = vec![
            question("both", "Roundabout Lanes", false, Difficulty::Medium),
            question("ln", "Lanes", false, Difficulty::Medium),
        ];
        items.extend(questions("p", "Parking", 3, 0));
        let bank = QuestionBank::new(items, catalog);
        let pool: Vec<&QuestionItem> = bank.items().iter().collect();
        let mut rng = StdRng::seed_from_u64(5);
        let partition = partition_candidates(&pool, &bank, &[], &mut rng);
        let ctx = AssemblyContext::new(&bank, &config, partition, Vec::new(), 5);

        // Over-full: forces a rebuild that starts from the current items.
        let mut state = AssemblyState::default();
        state.non_visual = ["both", "p-n0", "p-n1"]
            .iter()
            .filter_map(|id| bank.get(id))
            .collect();

        BucketRebuild.apply(&mut state, &ctx, &mut rng);
        let ids: Vec<&str> = state.non_visual.iter().map(|q| q.id.as_str()).collect();
        assert_eq!(ids, vec!["both", "p-n0"]);
        assert_eq!(state.theme_coverage(&bank), vec![1, 1]);
    }

    #[test]
    fn structural_check_reports_shortfall() {
        let config = small_config();
        let bank = QuestionBank::new(questions("p", "Parking", 6, 2), TopicCatalog::driving_theory());
        let pool: Vec<&QuestionItem> = bank.items().iter().collect();
        let mut rng = StdRng::seed_from_u64(3);
        let partition = partition_candidates(&pool, &bank, &[], &mut rng);
        let ctx = AssemblyContext::new(&bank, &config, partition, Vec::new(), 3);

        let state = run_pipeline(&default_steps(), &ctx, &mut rng);
        assert_eq!(state.non_visual.len(), 6);
        assert_eq!(state.visual.len(), 2);
        assert!(state.warnings.contains(&AssemblyWarning::StructuralShortfall {
            bucket: Bucket::Visual,
            expected: 4,
            actual: 2,
        }));
    }

    #[test]
    fn personalization_is_zero_without_focus_topics() {
        let config = small_config();
        let bank = QuestionBank::new(questions("p", "Parking", 6, 4), TopicCatalog::driving_theory());
        let pool: Vec<&QuestionItem> = bank.items().iter().collect();
        let mut rng = StdRng::seed_from_u64(3);
        let partition = partition_candidates(&pool, &bank, &[], &mut rng);
        let ctx = AssemblyContext::new(&bank, &config, partition, Vec::new(), 3);
        let state = run_pipeline(&default_steps(), &ctx, &mut rng);
        assert_eq!(personalization_score(&state, &ctx), 0);
        assert!(!describe(&state).is_empty());
    }
}
