// src/assembly.rs

use crate::models::Bucket;
use crate::pipeline::{AssemblyContext, AssemblyState, ConstraintStep};
use log::{debug, info, warn};
use rand::RngCore;

/// Fills both buckets to their targets: weak-topic candidates up to the
/// bucket's weak quota, then the rest of the eligible pool, then questions
/// the exposure filter removed.
pub struct StructuralFill;

impl ConstraintStep for StructuralFill {
    fn name(&self) -> &'static str {
        "structural-fill"
    }

    fn apply<'a>(
        &self,
        state: &mut AssemblyState<'a>,
        ctx: &AssemblyContext<'a>,
        _rng: &mut dyn RngCore,
    ) {
        for bucket in Bucket::ALL {
            let target = ctx.config.target(bucket);
            if state.bucket(bucket).len() >= target {
                continue;
            }

            let quota = ctx.weak_quota(bucket);
            let weak = state.fill_from(bucket, ctx.partition.weak_in(bucket), quota);

            // General pool: unrelated questions before leftover weak ones.
            let general = ctx
                .partition
                .other_in(bucket)
                .chain(ctx.partition.weak_in(bucket));
            let backfill = state.fill_from(bucket, general, target);

            let mut relaxed = 0;
            if state.bucket(bucket).len() < target {
                relaxed = state.fill_from(bucket, ctx.relaxed_in(bucket), target);
                if relaxed > 0 {
                    warn!(
                        "[Assembler] {} bucket: eligible pool exhausted, reused {} recently seen questions",
                        bucket, relaxed
                    );
                }
            }

            debug!(
                "[Assembler] {} bucket: {} weak (quota {}), {} backfill, {} relaxed",
                bucket, weak, quota, backfill, relaxed
            );
        }

        info!(
            "[Assembler] Filled {} non-visual / {} visual questions",
            state.non_visual.len(),
            state.visual.len()
        );
    }
}
