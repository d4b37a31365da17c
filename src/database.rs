// src/database.rs

use crate::error::EngineResult;
use crate::models::{JsonQuestion, QuestionItem};
use log::{debug, info};
use rusqlite::{params, Connection, Result};

pub fn init_db(conn: &Connection) -> Result<()> {
    debug!("[DB] init_db: Checking database schema...");

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS questions (
            id TEXT PRIMARY KEY,
            topic TEXT NOT NULL,
            has_visual INTEGER NOT NULL DEFAULT 0,
            difficulty TEXT NOT NULL CHECK (difficulty IN ('easy','medium','hard'))
        );
        CREATE TABLE IF NOT EXISTS attempts (
            id INTEGER PRIMARY KEY,
            learner_id TEXT NOT NULL,
            topic TEXT NOT NULL,
            score INTEGER NOT NULL CHECK (score BETWEEN 0 AND 100),
            total_questions INTEGER NOT NULL,
            correct_count INTEGER NOT NULL,
            timestamp INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_attempts_learner
            ON attempts (learner_id, timestamp);
        CREATE TABLE IF NOT EXISTS exposures (
            learner_id TEXT NOT NULL,
            question_id TEXT NOT NULL,
            times_shown INTEGER NOT NULL DEFAULT 0,
            last_shown_at INTEGER NOT NULL,
            last_assessment_id TEXT NOT NULL,
            PRIMARY KEY (learner_id, question_id)
        );
        CREATE TABLE IF NOT EXISTS skip_counters (
            learner_id TEXT NOT NULL,
            topic TEXT NOT NULL,
            skips INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (learner_id, topic)
        );
        ",
    )?;

    Ok(())
}

/// Loads a JSON question bank into the `questions` table.
///
/// Existing ids are overwritten so re-seeding an edited bank is safe.
pub fn seed_questions(conn: &Connection, json: &str) -> EngineResult<usize> {
    let parsed: Vec<JsonQuestion> = serde_json::from_str(json)?;
    let items: Vec<QuestionItem> = parsed.into_iter().map(QuestionItem::from).collect();

    let mut stmt = conn.prepare(
        "INSERT OR REPLACE INTO questions (id, topic, has_visual, difficulty) VALUES (?, ?, ?, ?)",
    )?;
    for q in &items {
        stmt.execute(params![q.id, q.topic_id, q.has_visual_asset, q.difficulty.as_str()])?;
    }

    info!("[DB] Seeded {} questions", items.len());
    Ok(items.len())
}
