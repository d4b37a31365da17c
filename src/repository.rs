// src/repository.rs

use crate::database;
use crate::error::{EngineError, EngineResult};
use crate::exposure::next_exposure;
use crate::models::{AttemptRecord, Difficulty, ExposureRecord, QuestionId, QuestionItem, TopicId};
use chrono::{DateTime, Utc};
use log::debug;
use rusqlite::{params, Connection, OptionalExtension, Result};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

// --- Ports ---

/// Append-only attempt log, keyed by learner.
pub trait AttemptHistory: Send + Sync {
    /// All attempts of a learner in timestamp order.
    fn attempts_for(&self, learner_id: &str) -> EngineResult<Vec<AttemptRecord>>;

    /// Ingestion boundary: rejects malformed or out-of-order records.
    fn append_attempt(&self, learner_id: &str, attempt: &AttemptRecord) -> EngineResult<()>;
}

/// Per-learner, per-question exposure records.
pub trait ExposureLedger: Send + Sync {
    fn exposures_for(&self, learner_id: &str) -> EngineResult<HashMap<QuestionId, ExposureRecord>>;

    fn upsert_exposure(&self, learner_id: &str, record: &ExposureRecord) -> EngineResult<()>;

    /// Read-modify-write of one assessment's worth of exposures.
    ///
    /// Adapters override this to hold their write lock across the whole
    /// update so concurrent commits for a learner cannot lose increments.
    fn commit_exposure(
        &self,
        learner_id: &str,
        question_ids: &[QuestionId],
        assessment_id: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<Vec<ExposureRecord>> {
        let current = self.exposures_for(learner_id)?;
        let mut written = Vec::with_capacity(question_ids.len());
        for id in question_ids {
            let record = next_exposure(current.get(id), id, assessment_id, now);
            self.upsert_exposure(learner_id, &record)?;
            written.push(record);
        }
        Ok(written)
    }
}

/// How often a learner bypassed the recommendation for each topic.
pub trait SkipCounterStore: Send + Sync {
    fn skip_counts(&self, learner_id: &str) -> EngineResult<HashMap<TopicId, u32>>;
    fn increment_skip(&self, learner_id: &str, topic_id: &str) -> EngineResult<u32>;
    fn clear_skip(&self, learner_id: &str, topic_id: &str) -> EngineResult<()>;
}

fn check_append(last: Option<DateTime<Utc>>, attempt: &AttemptRecord) -> EngineResult<()> {
    attempt.validate().map_err(EngineError::InvalidAttempt)?;
    if let Some(last) = last {
        if attempt.timestamp < last {
            return Err(EngineError::InvalidAttempt(format!(
                "timestamp {} precedes last recorded attempt at {}",
                attempt.timestamp, last
            )));
        }
    }
    Ok(())
}

fn lock<'a, T>(mutex: &'a Mutex<T>, name: &str) -> EngineResult<MutexGuard<'a, T>> {
    mutex
        .lock()
        .map_err(|_| EngineError::StorePoisoned(name.to_string()))
}

// --- In-Memory Adapter ---

/// Map-backed adapter for tests and embedding hosts without a database.
#[derive(Default)]
pub struct InMemoryStore {
    attempts: Mutex<HashMap<String, Vec<AttemptRecord>>>,
    exposures: Mutex<HashMap<String, HashMap<QuestionId, ExposureRecord>>>,
    skips: Mutex<HashMap<String, HashMap<TopicId, u32>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AttemptHistory for InMemoryStore {
    fn attempts_for(&self, learner_id: &str) -> EngineResult<Vec<AttemptRecord>> {
        let guard = lock(&self.attempts, "attempts")?;
        Ok(guard.get(learner_id).cloned().unwrap_or_default())
    }

    fn append_attempt(&self, learner_id: &str, attempt: &AttemptRecord) -> EngineResult<()> {
        let mut guard = lock(&self.attempts, "attempts")?;
        let log = guard.entry(learner_id.to_string()).or_default();
        check_append(log.last().map(|a| a.timestamp), attempt)?;
        log.push(attempt.clone());
        Ok(())
    }
}

impl ExposureLedger for InMemoryStore {
    fn exposures_for(&self, learner_id: &str) -> EngineResult<HashMap<QuestionId, ExposureRecord>> {
        let guard = lock(&self.exposures, "exposures")?;
        Ok(guard.get(learner_id).cloned().unwrap_or_default())
    }

    fn upsert_exposure(&self, learner_id: &str, record: &ExposureRecord) -> EngineResult<()> {
        let mut guard = lock(&self.exposures, "exposures")?;
        guard
            .entry(learner_id.to_string())
            .or_default()
            .insert(record.question_id.clone(), record.clone());
        Ok(())
    }

    fn commit_exposure(
        &self,
        learner_id: &str,
        question_ids: &[QuestionId],
        assessment_id: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<Vec<ExposureRecord>> {
        let mut guard = lock(&self.exposures, "exposures")?;
        let ledger = guard.entry(learner_id.to_string()).or_default();
        let mut written = Vec::with_capacity(question_ids.len());
        for id in question_ids {
            let record = next_exposure(ledger.get(id), id, assessment_id, now);
            ledger.insert(id.clone(), record.clone());
            written.push(record);
        }
        Ok(written)
    }
}

impl SkipCounterStore for InMemoryStore {
    fn skip_counts(&self, learner_id: &str) -> EngineResult<HashMap<TopicId, u32>> {
        let guard = lock(&self.skips, "skips")?;
        Ok(guard.get(learner_id).cloned().unwrap_or_default())
    }

    fn increment_skip(&self, learner_id: &str, topic_id: &str) -> EngineResult<u32> {
        let mut guard = lock(&self.skips, "skips")?;
        let count = guard
            .entry(learner_id.to_string())
            .or_default()
            .entry(topic_id.to_string())
            .or_insert(0);
        *count += 1;
        Ok(*count)
    }

    fn clear_skip(&self, learner_id: &str, topic_id: &str) -> EngineResult<()> {
        let mut guard = lock(&self.skips, "skips")?;
        if let Some(counts) = guard.get_mut(learner_id) {
            counts.remove(topic_id);
        }
        Ok(())
    }
}

// --- SQLite Adapter ---

/// SQLite-backed adapter. The connection mutex serialises all writes.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P) -> EngineResult<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    /// Open in-memory database (for testing)
    pub fn open_in_memory() -> EngineResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn from_connection(conn: Connection) -> EngineResult<Self> {
        database::init_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn seed_questions(&self, json: &str) -> EngineResult<usize> {
        let conn = lock(&self.conn, "connection")?;
        database::seed_questions(&conn, json)
    }

    pub fn questions(&self) -> EngineResult<Vec<QuestionItem>> {
        let conn = lock(&self.conn, "connection")?;
        Ok(load_questions(&conn)?)
    }
}

impl AttemptHistory for SqliteStore {
    fn attempts_for(&self, learner_id: &str) -> EngineResult<Vec<AttemptRecord>> {
        let conn = lock(&self.conn, "connection")?;
        Ok(get_attempts(&conn, learner_id)?)
    }

    fn append_attempt(&self, learner_id: &str, attempt: &AttemptRecord) -> EngineResult<()> {
        let conn = lock(&self.conn, "connection")?;
        check_append(get_last_attempt_ts(&conn, learner_id)?, attempt)?;
        log_attempt(&conn, learner_id, attempt)?;
        Ok(())
    }
}

impl ExposureLedger for SqliteStore {
    fn exposures_for(&self, learner_id: &str) -> EngineResult<HashMap<QuestionId, ExposureRecord>> {
        let conn = lock(&self.conn, "connection")?;
        Ok(get_exposures(&conn, learner_id)?)
    }

    fn upsert_exposure(&self, learner_id: &str, record: &ExposureRecord) -> EngineResult<()> {
        let conn = lock(&self.conn, "connection")?;
        save_exposure(&conn, learner_id, record)?;
        Ok(())
    }

    fn commit_exposure(
        &self,
        learner_id: &str,
        question_ids: &[QuestionId],
        assessment_id: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<Vec<ExposureRecord>> {
        let mut conn = lock(&self.conn, "connection")?;
        let tx = conn.transaction()?;
        let mut written = Vec::with_capacity(question_ids.len());
        for id in question_ids {
            let existing = get_exposure(&tx, learner_id, id)?;
            let record = next_exposure(existing.as_ref(), id, assessment_id, now);
            save_exposure(&tx, learner_id, &record)?;
            written.push(record);
        }
        tx.commit()?;
        Ok(written)
    }
}

impl SkipCounterStore for SqliteStore {
    fn skip_counts(&self, learner_id: &str) -> EngineResult<HashMap<TopicId, u32>> {
        let conn = lock(&self.conn, "connection")?;
        Ok(get_skip_counts(&conn, learner_id)?)
    }

    fn increment_skip(&self, learner_id: &str, topic_id: &str) -> EngineResult<u32> {
        let conn = lock(&self.conn, "connection")?;
        Ok(increment_skip_count(&conn, learner_id, topic_id)?)
    }

    fn clear_skip(&self, learner_id: &str, topic_id: &str) -> EngineResult<()> {
        let conn = lock(&self.conn, "connection")?;
        clear_skip_count(&conn, learner_id, topic_id)?;
        Ok(())
    }
}

// --- Queries ---

fn ts_to_datetime(ts: i64, column: usize) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(ts, 0).ok_or(rusqlite::Error::IntegralValueOutOfRange(column, ts))
}

/// Fetches the question bank.
pub fn load_questions(conn: &Connection) -> Result<Vec<QuestionItem>> {
    let mut stmt =
        conn.prepare("SELECT id, topic, has_visual, difficulty FROM questions ORDER BY id")?;
    let items = stmt
        .query_map([], |row| {
            let difficulty: String = row.get(3)?;
            Ok(QuestionItem {
                id: row.get(0)?,
                topic_id: row.get(1)?,
                has_visual_asset: row.get(2)?,
                difficulty: Difficulty::from_str(&difficulty).unwrap_or(Difficulty::Medium),
            })
        })?
        .collect::<Result<Vec<_>>>()?;
    Ok(items)
}

/// Fetches a learner's attempts, oldest first.
pub fn get_attempts(conn: &Connection, learner_id: &str) -> Result<Vec<AttemptRecord>> {
    let mut stmt = conn.prepare(
        "SELECT topic, score, total_questions, correct_count, timestamp
         FROM attempts
         WHERE learner_id = ?
         ORDER BY timestamp ASC, id ASC",
    )?;
    let attempts = stmt
        .query_map([learner_id], |row| {
            Ok(AttemptRecord {
                topic_id: row.get(0)?,
                score: row.get(1)?,
                total_questions: row.get(2)?,
                correct_count: row.get(3)?,
                timestamp: ts_to_datetime(row.get(4)?, 4)?,
            })
        })?
        .collect::<Result<Vec<_>>>()?;
    debug!("[DB] {} attempts for learner {}", attempts.len(), learner_id);
    Ok(attempts)
}

pub fn get_last_attempt_ts(conn: &Connection, learner_id: &str) -> Result<Option<DateTime<Utc>>> {
    let ts: Option<i64> = conn.query_row(
        "SELECT MAX(timestamp) FROM attempts WHERE learner_id = ?",
        [learner_id],
        |row| row.get(0),
    )?;
    ts.map(|ts| ts_to_datetime(ts, 0)).transpose()
}

/// Records a raw attempt.
pub fn log_attempt(conn: &Connection, learner_id: &str, attempt: &AttemptRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO attempts (learner_id, topic, score, total_questions, correct_count, timestamp) VALUES (?, ?, ?, ?, ?, ?)",
        params![
            learner_id,
            attempt.topic_id,
            attempt.score,
            attempt.total_questions,
            attempt.correct_count,
            attempt.timestamp.timestamp()
        ],
    )?;
    Ok(())
}

pub fn get_exposures(conn: &Connection, learner_id: &str) -> Result<HashMap<QuestionId, ExposureRecord>> {
    let mut stmt = conn.prepare(
        "SELECT question_id, times_shown, last_shown_at, last_assessment_id
         FROM exposures
         WHERE learner_id = ?",
    )?;
    let records = stmt
        .query_map([learner_id], |row| {
            Ok(ExposureRecord {
                question_id: row.get(0)?,
                times_shown: row.get(1)?,
                last_shown_at: ts_to_datetime(row.get(2)?, 2)?,
                last_assessment_id: row.get(3)?,
            })
        })?
        .map(|r| r.map(|rec| (rec.question_id.clone(), rec)))
        .collect::<Result<HashMap<_, _>>>()?;
    Ok(records)
}

pub fn get_exposure(conn: &Connection, learner_id: &str, question_id: &str) -> Result<Option<ExposureRecord>> {
    conn.query_row(
        "SELECT times_shown, last_shown_at, last_assessment_id
         FROM exposures
         WHERE learner_id = ? AND question_id = ?",
        params![learner_id, question_id],
        |row| {
            Ok(ExposureRecord {
                question_id: question_id.to_string(),
                times_shown: row.get(0)?,
                last_shown_at: ts_to_datetime(row.get(1)?, 1)?,
                last_assessment_id: row.get(2)?,
            })
        },
    )
    .optional()
}

/// Saves an exposure record, replacing any previous one.
pub fn save_exposure(conn: &Connection, learner_id: &str, record: &ExposureRecord) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO exposures (learner_id, question_id, times_shown, last_shown_at, last_assessment_id) VALUES (?, ?, ?, ?, ?)",
        params![
            learner_id,
            record.question_id,
            record.times_shown,
            record.last_shown_at.timestamp(),
            record.last_assessment_id
        ],
    )?;
    Ok(())
}

pub fn get_skip_counts(conn: &Connection, learner_id: &str) -> Result<HashMap<TopicId, u32>> {
    let mut stmt = conn.prepare("SELECT topic, skips FROM skip_counters WHERE learner_id = ?")?;
    let counts = stmt
        .query_map([learner_id], |row| {
            Ok((row.get::<_, TopicId>(0)?, row.get::<_, u32>(1)?))
        })?
        .collect::<Result<HashMap<_, _>>>()?;
    Ok(counts)
}

pub fn increment_skip_count(conn: &Connection, learner_id: &str, topic_id: &str) -> Result<u32> {
    conn.execute(
        "INSERT INTO skip_counters (learner_id, topic, skips) VALUES (?, ?, 1)
         ON CONFLICT (learner_id, topic) DO UPDATE SET skips = skips + 1",
        params![learner_id, topic_id],
    )?;
    conn.query_row(
        "SELECT skips FROM skip_counters WHERE learner_id = ? AND topic = ?",
        params![learner_id, topic_id],
        |row| row.get(0),
    )
}

pub fn clear_skip_count(conn: &Connection, learner_id: &str, topic_id: &str) -> Result<()> {
    conn.execute(
        "DELETE FROM skip_counters WHERE learner_id = ? AND topic = ?",
        params![learner_id, topic_id],
    )?;
    Ok(())
}
