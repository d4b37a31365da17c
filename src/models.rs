// src/models.rs

use crate::error::AssemblyWarning;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type TopicId = String;
pub type QuestionId = String;
pub type LearnerId = String;

// --- Question Bank ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy = 1,
    Medium = 2,
    Hard = 3,
}

impl Difficulty {
    pub const ALL: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard];

    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl FromStr for Difficulty {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            _ => Ok(Difficulty::Medium), // Default fallback
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two fixed-size halves of an exam.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Bucket {
    NonVisual,
    Visual,
}

impl Bucket {
    pub const ALL: [Bucket; 2] = [Bucket::NonVisual, Bucket::Visual];

    pub fn as_str(&self) -> &'static str {
        match self {
            Bucket::NonVisual => "non-visual",
            Bucket::Visual => "visual",
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuestionItem {
    pub id: QuestionId,
    pub topic_id: TopicId,
    pub has_visual_asset: bool,
    pub difficulty: Difficulty,
}

impl QuestionItem {
    pub fn bucket(&self) -> Bucket {
        if self.has_visual_asset {
            Bucket::Visual
        } else {
            Bucket::NonVisual
        }
    }
}

// Used for seeding
#[derive(Deserialize, Debug)]
pub struct JsonQuestion {
    pub id: String,
    pub topic: String,
    #[serde(default)]
    pub image: Option<String>,
    pub difficulty: String,
}

impl From<JsonQuestion> for QuestionItem {
    fn from(q: JsonQuestion) -> Self {
        QuestionItem {
            id: q.id,
            topic_id: q.topic,
            has_visual_asset: q.image.map_or(false, |path| !path.is_empty()),
            difficulty: Difficulty::from_str(&q.difficulty).unwrap_or(Difficulty::Medium),
        }
    }
}

// --- Learner History ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub topic_id: TopicId,
    pub score: u8,
    pub total_questions: u32,
    pub correct_count: u32,
    pub timestamp: DateTime<Utc>,
}

impl AttemptRecord {
    /// Ingestion-boundary check. The engine itself assumes records passed it.
    pub fn validate(&self) -> Result<(), String> {
        if self.topic_id.trim().is_empty() {
            return Err("topic id is empty".to_string());
        }
        if self.score > 100 {
            return Err(format!("score {} out of range 0-100", self.score));
        }
        if self.correct_count > self.total_questions {
            return Err(format!(
                "correct count {} exceeds total {}",
                self.correct_count, self.total_questions
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExposureRecord {
    pub question_id: QuestionId,
    pub times_shown: u32,
    pub last_shown_at: DateTime<Utc>,
    pub last_assessment_id: String,
}

// --- Derived Analysis ---

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicUrgency {
    pub topic_id: TopicId,
    pub attempts: usize,
    pub average_score: f64,
    pub mastery: f64,
    pub urgency: f64,
    pub improvement_delta: f64,
    pub is_weak: bool,
}

impl TopicUrgency {
    pub fn unpracticed(topic_id: &str) -> Self {
        TopicUrgency {
            topic_id: topic_id.to_string(),
            attempts: 0,
            average_score: 0.0,
            mastery: 0.0,
            urgency: 0.0,
            improvement_delta: 0.0,
            is_weak: false,
        }
    }

    pub fn is_unpracticed(&self) -> bool {
        self.attempts == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Improving,
    Declining,
    Stable,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecentPerformance {
    pub average_score: f64,
    pub trend: Trend,
    pub recommended_tier: u8,
    pub sample_size: usize,
}

// --- Assessment Output ---

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DifficultyHistogram {
    pub easy: usize,
    pub medium: usize,
    pub hard: usize,
}

impl DifficultyHistogram {
    pub fn from_items<'a>(items: impl IntoIterator<Item = &'a QuestionItem>) -> Self {
        let mut histogram = DifficultyHistogram::default();
        for item in items {
            histogram.add(item.difficulty);
        }
        histogram
    }

    pub fn add(&mut self, difficulty: Difficulty) {
        match difficulty {
            Difficulty::Easy => self.easy += 1,
            Difficulty::Medium => self.medium += 1,
            Difficulty::Hard => self.hard += 1,
        }
    }

    pub fn get(&self, difficulty: Difficulty) -> usize {
        match difficulty {
            Difficulty::Easy => self.easy,
            Difficulty::Medium => self.medium,
            Difficulty::Hard => self.hard,
        }
    }

    pub fn total(&self) -> usize {
        self.easy + self.medium + self.hard
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AssemblyResult {
    pub learner_id: LearnerId,
    pub exam_id: String,
    pub questions: Vec<QuestionItem>,
    pub focus_topics: Vec<TopicId>,
    pub difficulty_histogram: DifficultyHistogram,
    pub difficulty_tier: u8,
    pub personalization_score: u8,
    pub warnings: Vec<AssemblyWarning>,
}

impl AssemblyResult {
    pub fn count(&self, bucket: Bucket) -> usize {
        self.questions.iter().filter(|q| q.bucket() == bucket).count()
    }

    pub fn question_ids(&self) -> Vec<QuestionId> {
        self.questions.iter().map(|q| q.id.clone()).collect()
    }

    pub fn has_shortfall(&self) -> bool {
        self.warnings.iter().any(AssemblyWarning::is_shortfall)
    }
}

// --- Recommendation ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PriorityTier {
    Critical,
    High,
    Medium,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub topic_id: TopicId,
    pub justification: String,
    pub priority_tier: PriorityTier,
    pub urgency_score: f64,
    pub suppression_count: u32,
}
