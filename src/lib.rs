// src/lib.rs

pub mod analysis;
pub mod assembly;
pub mod catalog;
pub mod config;
pub mod constants;
pub mod database;
pub mod difficulty;
pub mod diversity;
pub mod error;
pub mod exposure;
pub mod models;
pub mod pedagogy;
pub mod performance;
pub mod pipeline;
pub mod recommendation;
pub mod repository;
pub mod selection;

pub use catalog::{QuestionBank, ThemeTag, TopicCatalog};
pub use config::EngineConfig;
pub use error::{AssemblyWarning, EngineError, EngineResult};
pub use models::{
    AssemblyResult, AttemptRecord, Bucket, Difficulty, ExposureRecord, PriorityTier, QuestionItem,
    Recommendation, TopicUrgency,
};
pub use pedagogy::{
    commit_assessment, generate_assessment, record_attempt, recommend_next_topic, skip_recommendation,
};
pub use repository::{AttemptHistory, ExposureLedger, InMemoryStore, SkipCounterStore, SqliteStore};
