// src/selection.rs

use crate::catalog::QuestionBank;
use crate::models::{Bucket, QuestionItem, TopicUrgency};
use log::debug;
use rand::seq::SliceRandom;
use rand::RngCore;
use std::cmp::Ordering;
use std::collections::HashSet;

#[derive(Debug, Clone)]
pub struct WeightedCandidate<'a> {
    pub item: &'a QuestionItem,
    /// 100 - mastery of the matched focus topic.
    pub weight: f64,
}

/// Eligible pool split by whether a question serves a focus (weak) topic.
#[derive(Debug, Clone, Default)]
pub struct CandidatePartition<'a> {
    /// Highest weight first.
    pub weak: Vec<WeightedCandidate<'a>>,
    pub other: Vec<&'a QuestionItem>,
}

impl<'a> CandidatePartition<'a> {
    pub fn weak_in(&self, bucket: Bucket) -> impl Iterator<Item = &'a QuestionItem> + '_ {
        self.weak
            .iter()
            .map(|c| c.item)
            .filter(move |q| q.bucket() == bucket)
    }

    pub fn other_in(&self, bucket: Bucket) -> impl Iterator<Item = &'a QuestionItem> + '_ {
        self.other.iter().copied().filter(move |q| q.bucket() == bucket)
    }

    /// Ids of every question tied to a focus topic.
    pub fn weak_ids(&self) -> HashSet<&'a str> {
        self.weak.iter().map(|c| c.item.id.as_str()).collect()
    }

    /// The whole eligible pool, weak candidates first.
    pub fn all(&self) -> impl Iterator<Item = &'a QuestionItem> + '_ {
        self.weak.iter().map(|c| c.item).chain(self.other.iter().copied())
    }
}

/// Splits the eligible pool into weak-topic and other candidates.
///
/// A question matching several focus topics takes the largest weight. The
/// pool is shuffled first so equal weights come out in random order.
pub fn partition_candidates<'a>(
    pool: &[&'a QuestionItem],
    bank: &QuestionBank,
    focus: &[&TopicUrgency],
    rng: &mut dyn RngCore,
) -> CandidatePartition<'a> {
    let mut shuffled: Vec<&QuestionItem> = pool.to_vec();
    shuffled.shuffle(rng);

    let mut partition = CandidatePartition::default();
    for item in shuffled {
        let best = focus
            .iter()
            .filter(|topic| bank.is_linked(item, &topic.topic_id))
            .map(|topic| 100.0 - topic.mastery)
            .max_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

        match best {
            Some(weight) => partition.weak.push(WeightedCandidate { item, weight }),
            None => partition.other.push(item),
        }
    }

    partition
        .weak
        .sort_by(|a, b| b.weight.partial_cmp(&a.weight).unwrap_or(Ordering::Equal));

    debug!(
        "[Selector] {} weak-topic candidates across {} focus topics, {} others",
        partition.weak.len(),
        focus.len(),
        partition.other.len()
    );
    partition
}
