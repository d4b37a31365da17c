// src/difficulty.rs

use crate::config::DifficultyBand;
use crate::models::{Bucket, Difficulty, DifficultyHistogram, QuestionItem};
use crate::pipeline::{AssemblyContext, AssemblyState, ConstraintStep};
use log::{debug, info};
use rand::seq::SliceRandom;
use rand::RngCore;

/// Easy/medium/hard counts for a bucket of `size` questions.
///
/// Easy and hard are rounded from the band; medium takes the remainder so
/// the three always sum to `size`.
pub fn difficulty_targets(size: usize, band: &DifficultyBand) -> [(Difficulty, usize); 3] {
    let easy = ((size as f64 * band.easy).round() as usize).min(size);
    let hard = ((size as f64 * band.hard).round() as usize).min(size - easy);
    let medium = size - easy - hard;
    [
        (Difficulty::Easy, easy),
        (Difficulty::Medium, medium),
        (Difficulty::Hard, hard),
    ]
}

fn taken(chosen: &[&QuestionItem], q: &QuestionItem) -> bool {
    chosen.iter().any(|c| c.id == q.id)
}

fn matches_targets(items: &[&QuestionItem], targets: &[(Difficulty, usize); 3]) -> bool {
    let histogram = DifficultyHistogram::from_items(items.iter().copied());
    targets.iter().all(|&(d, n)| histogram.get(d) == n)
}

/// Re-partitions each bucket across the tier's difficulty band without
/// changing bucket sizes.
pub struct DifficultyBalance;

impl DifficultyBalance {
    fn rebalance<'a>(
        &self,
        bucket: Bucket,
        current: &[&'a QuestionItem],
        ctx: &AssemblyContext<'a>,
        rng: &mut dyn RngCore,
    ) -> Vec<&'a QuestionItem> {
        let size = ctx.config.target(bucket);
        let band = ctx.config.difficulty_bands.for_tier(ctx.tier);
        let targets = difficulty_targets(size, band);
        let eligible = ctx.eligible_in(bucket);

        let mut chosen: Vec<&'a QuestionItem> = Vec::with_capacity(size);

        for (difficulty, target) in targets {
            let mut cell: Vec<&'a QuestionItem> = current
                .iter()
                .copied()
                .filter(|q| q.difficulty == difficulty)
                .collect();
            cell.shuffle(&mut *rng);
            // Stable: weak-topic items survive truncation first.
            cell.sort_by_key(|q| !ctx.is_weak(q));

            let start = chosen.len();
            for q in cell {
                if chosen.len() - start >= target {
                    break;
                }
                chosen.push(q);
            }

            // Short cell: pull matching questions from the eligible pool.
            for &q in &eligible {
                if chosen.len() - start >= target {
                    break;
                }
                if q.difficulty == difficulty && !taken(&chosen, q) {
                    chosen.push(q);
                }
            }

            if chosen.len() - start < target {
                debug!(
                    "[Balancer] {} {} cell short: {} of {}",
                    bucket,
                    difficulty,
                    chosen.len() - start,
                    target
                );
            }
        }

        // Any difficulty: assembled leftovers, then the eligible pool, then
        // the whole bank as a last resort.
        let leftovers = current.iter().copied();
        let relaxed = ctx.relaxed_in(bucket);
        for q in leftovers.chain(eligible.iter().copied()).chain(relaxed) {
            if chosen.len() >= size {
                break;
            }
            if !taken(&chosen, q) {
                chosen.push(q);
            }
        }

        chosen
    }
}

impl ConstraintStep for DifficultyBalance {
    fn name(&self) -> &'static str {
        "difficulty-balance"
    }

    fn apply<'a>(
        &self,
        state: &mut AssemblyState<'a>,
        ctx: &AssemblyContext<'a>,
        rng: &mut dyn RngCore,
    ) {
        let band = ctx.config.difficulty_bands.for_tier(ctx.tier);
        for bucket in Bucket::ALL {
            let size = ctx.config.target(bucket);
            let current = state.bucket(bucket).clone();
            if current.len() == size && matches_targets(&current, &difficulty_targets(size, band)) {
                continue;
            }

            let balanced = self.rebalance(bucket, &current, ctx, &mut *rng);
            // Never shrink a bucket the assembler already filled.
            if balanced.len() >= current.len() {
                *state.bucket_mut(bucket) = balanced;
            }
        }

        info!("[Balancer] Tier {}: {}", ctx.tier, crate::pipeline::describe(state));
    }
}
