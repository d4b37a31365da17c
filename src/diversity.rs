// src/diversity.rs

use crate::error::AssemblyWarning;
use crate::models::{Bucket, QuestionItem};
use crate::pipeline::{AssemblyContext, AssemblyState, ConstraintStep};
use log::{debug, info, warn};
use rand::RngCore;

/// Swaps in a question for every mandatory theme the exam misses.
///
/// Eviction never removes the only question covering another theme. Items
/// unrelated to a weak topic go before weak-topic ones, and swaps that keep
/// the difficulty mix are preferred within each group.
pub struct ThemeRepair;

impl ThemeRepair {
    /// Eligible questions covering `theme`, weak candidates first.
    fn candidates<'a>(&self, theme: usize, ctx: &AssemblyContext<'a>) -> Vec<&'a QuestionItem> {
        Bucket::ALL
            .iter()
            .flat_map(|&b| ctx.eligible_in(b))
            .filter(|q| ctx.bank.covers_theme(q, theme))
            .collect()
    }

    /// The item to drop for `incoming` and its eviction cost: weak-topic
    /// items cost more than a difficulty change.
    fn evictee(
        &self,
        state: &AssemblyState<'_>,
        incoming: &QuestionItem,
        coverage: &[usize],
        ctx: &AssemblyContext<'_>,
    ) -> Option<(usize, (bool, bool))> {
        state
            .bucket(incoming.bucket())
            .iter()
            .enumerate()
            .filter(|(_, q)| ctx.bank.themes_of(q).iter().all(|&t| coverage[t] >= 2))
            .map(|(i, q)| (i, (ctx.is_weak(q), q.difficulty != incoming.difficulty)))
            .min_by_key(|&(i, cost)| (cost, i))
    }
}

impl ConstraintStep for ThemeRepair {
    fn name(&self) -> &'static str {
        "theme-repair"
    }

    fn apply<'a>(
        &self,
        state: &mut AssemblyState<'a>,
        ctx: &AssemblyContext<'a>,
        _rng: &mut dyn RngCore,
    ) {
        let mut swaps = 0;
        for theme in 0..ctx.bank.theme_count() {
            let coverage = state.theme_coverage(ctx.bank);
            if coverage[theme] > 0 {
                continue;
            }

            let mut best: Option<(&'a QuestionItem, Option<usize>, (bool, bool))> = None;
            for candidate in self.candidates(theme, ctx) {
                if state.contains(&candidate.id) {
                    continue;
                }
                let bucket = candidate.bucket();
                if state.bucket(bucket).len() < ctx.config.target(bucket) {
                    best = Some((candidate, None, (false, false)));
                    break;
                }
                if let Some((i, cost)) = self.evictee(state, candidate, &coverage, ctx) {
                    if best.map_or(true, |b| cost < b.2) {
                        best = Some((candidate, Some(i), cost));
                    }
                }
            }

            let repaired = best.is_some();
            if let Some((candidate, slot, _)) = best {
                let bucket = candidate.bucket();
                match slot {
                    None => state.bucket_mut(bucket).push(candidate),
                    Some(i) => {
                        let evicted = std::mem::replace(&mut state.bucket_mut(bucket)[i], candidate);
                        debug!(
                            "[Diversity] '{}': {} replaces {} ({})",
                            ctx.bank.theme_name(theme),
                            candidate.id,
                            evicted.id,
                            evicted.topic_id
                        );
                    }
                }
            }

            if repaired {
                swaps += 1;
            } else {
                let tag = ctx.bank.theme_name(theme).to_string();
                warn!("[Diversity] No question can cover mandatory theme '{}'", tag);
                state.warn(AssemblyWarning::ThemeGap { tag });
            }
        }

        if swaps > 0 {
            info!("[Diversity] Repaired {} missing themes", swaps);
        }
    }
}
