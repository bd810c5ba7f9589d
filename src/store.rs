use crate::app_dirs::AppDirs;
use crate::frequency::{ParetoTier, TopicFrequency};
use crate::priority::TopicPriority;
use crate::scheduler::ScheduleState;
use crate::selection::{Difficulty, Question, SelectionEntry};
use chrono::{DateTime, Duration, Local, NaiveDate};
use rusqlite::{params, Connection, OptionalExtension, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// One flashcard with its schedule state.
#[derive(Debug, Clone)]
pub struct Flashcard {
    pub id: i64,
    pub user_id: i64,
    pub specialty: String,
    pub front_text: String,
    pub back_text: String,
    pub state: ScheduleState,
}

/// One persisted selection-log row.
#[derive(Debug, Clone)]
pub struct SelectionLogRow {
    pub id: i64,
    pub user_id: i64,
    pub session_id: Option<i64>,
    pub specialty: String,
    pub method: String,
    pub priority_score: f64,
    pub question_id: i64,
    pub was_correct: Option<bool>,
    pub selected_at: DateTime<Local>,
}

/// Per-day due-card count for the study forecast.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastDay {
    pub date: NaiveDate,
    pub due: i64,
}

/// Database manager for the study-tracking core.
#[derive(Debug)]
pub struct StudyStore {
    conn: Connection,
}

impl StudyStore {
    /// Open the default on-disk database, creating tables if needed.
    pub fn new() -> Result<Self> {
        let db_path = AppDirs::db_path().unwrap_or_else(|| PathBuf::from("medik.db"));

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CANTOPEN),
                    Some(format!("Failed to create directory: {}", e)),
                )
            })?;
        }

        Self::open(&db_path)
    }

    /// Open a database at an explicit path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = StudyStore { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = StudyStore { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS topic_frequency (
                specialty TEXT PRIMARY KEY,
                total_questions INTEGER NOT NULL DEFAULT 0,
                frequency_percentage REAL NOT NULL DEFAULT 0.0,
                importance_score REAL NOT NULL DEFAULT 1.0,
                pareto_tier TEXT NOT NULL DEFAULT 'rare'
            );

            CREATE TABLE IF NOT EXISTS questions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                specialty TEXT NOT NULL,
                difficulty TEXT NOT NULL,
                question_text TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_questions_specialty ON questions(specialty);

            CREATE TABLE IF NOT EXISTS user_answers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                question_id INTEGER NOT NULL,
                is_correct BOOLEAN NOT NULL,
                answered_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_user_answers_user ON user_answers(user_id);

            CREATE TABLE IF NOT EXISTS user_topic_priority (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                specialty TEXT NOT NULL,
                questions_answered INTEGER NOT NULL DEFAULT 0,
                correct_answers INTEGER NOT NULL DEFAULT 0,
                accuracy_rate REAL NOT NULL DEFAULT 0.0,
                consecutive_correct INTEGER NOT NULL DEFAULT 0,
                base_priority REAL NOT NULL DEFAULT 1.0,
                performance_modifier REAL NOT NULL DEFAULT 1.0,
                final_priority REAL NOT NULL DEFAULT 1.0,
                times_seen INTEGER NOT NULL DEFAULT 0,
                last_seen TEXT,
                UNIQUE(user_id, specialty)
            );

            CREATE TABLE IF NOT EXISTS flashcards (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                specialty TEXT NOT NULL,
                front_text TEXT NOT NULL,
                back_text TEXT NOT NULL,
                ease_factor REAL NOT NULL DEFAULT 2.5,
                interval_days INTEGER NOT NULL DEFAULT 1,
                repetitions INTEGER NOT NULL DEFAULT 0,
                next_review_date TEXT NOT NULL,
                last_review_date TEXT,
                last_quality INTEGER
            );
            CREATE INDEX IF NOT EXISTS idx_flashcards_due ON flashcards(user_id, next_review_date);

            CREATE TABLE IF NOT EXISTS flashcard_reviews (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                flashcard_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                quality INTEGER NOT NULL,
                previous_interval INTEGER NOT NULL,
                previous_ease_factor REAL NOT NULL,
                reviewed_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_flashcard_reviews_user ON flashcard_reviews(user_id, reviewed_at);

            CREATE TABLE IF NOT EXISTS selection_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                session_id INTEGER,
                specialty TEXT NOT NULL,
                method TEXT NOT NULL,
                priority_score REAL NOT NULL,
                question_id INTEGER NOT NULL,
                was_correct BOOLEAN,
                selected_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_selection_log_user ON selection_log(user_id, question_id);
            "#,
        )
    }

    // ---- topic frequencies ----

    /// Atomically replace the whole frequency table. A concurrent selection
    /// sees either the old table or the new one, never a partial update.
    pub fn replace_frequencies(&mut self, rows: &[TopicFrequency]) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM topic_frequency", [])?;
        for tf in rows {
            tx.execute(
                r#"
                INSERT INTO topic_frequency
                (specialty, total_questions, frequency_percentage, importance_score, pareto_tier)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
                params![
                    tf.specialty,
                    tf.total_questions,
                    tf.frequency_percentage,
                    tf.importance_score,
                    tf.pareto_tier.to_string(),
                ],
            )?;
        }
        tx.commit()
    }

    pub fn frequencies(&self) -> Result<Vec<TopicFrequency>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT specialty, total_questions, frequency_percentage, importance_score, pareto_tier
            FROM topic_frequency
            ORDER BY frequency_percentage DESC
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            let tier_str: String = row.get(4)?;
            Ok(TopicFrequency {
                specialty: row.get(0)?,
                total_questions: row.get(1)?,
                frequency_percentage: row.get(2)?,
                importance_score: row.get(3)?,
                pareto_tier: ParetoTier::parse(&tier_str).unwrap_or(ParetoTier::Rare),
            })
        })?;
        rows.collect()
    }

    fn base_priority_for(&self, specialty: &str) -> Result<f64> {
        let score: Option<f64> = self
            .conn
            .query_row(
                "SELECT importance_score FROM topic_frequency WHERE specialty = ?1",
                [specialty],
                |row| row.get(0),
            )
            .optional()?;
        Ok(score.unwrap_or(1.0))
    }

    // ---- question bank ----

    pub fn add_questions(&mut self, questions: &[(String, Difficulty, String)]) -> Result<()> {
        let tx = self.conn.transaction()?;
        for (specialty, difficulty, text) in questions {
            tx.execute(
                "INSERT INTO questions (specialty, difficulty, question_text) VALUES (?1, ?2, ?3)",
                params![specialty, difficulty.to_string(), text],
            )?;
        }
        tx.commit()
    }

    pub fn questions(&self) -> Result<Vec<Question>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, specialty, difficulty, question_text FROM questions ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            let difficulty_str: String = row.get(2)?;
            Ok(Question {
                id: row.get(0)?,
                specialty: row.get(1)?,
                difficulty: Difficulty::parse(&difficulty_str).unwrap_or(Difficulty::Medium),
                question_text: row.get(3)?,
            })
        })?;
        rows.collect()
    }

    pub fn question(&self, id: i64) -> Result<Option<Question>> {
        self.conn
            .query_row(
                "SELECT id, specialty, difficulty, question_text FROM questions WHERE id = ?1",
                [id],
                |row| {
                    let difficulty_str: String = row.get(2)?;
                    Ok(Question {
                        id: row.get(0)?,
                        specialty: row.get(1)?,
                        difficulty: Difficulty::parse(&difficulty_str)
                            .unwrap_or(Difficulty::Medium),
                        question_text: row.get(3)?,
                    })
                },
            )
            .optional()
    }

    pub fn answered_ids(&self, user_id: i64) -> Result<HashSet<i64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT question_id FROM user_answers WHERE user_id = ?1")?;
        let rows = stmt.query_map([user_id], |row| row.get(0))?;
        rows.collect()
    }

    // ---- user topic priorities ----

    /// Get-or-create upsert for a (user, specialty) priority row. The
    /// `INSERT .. ON CONFLICT DO NOTHING` keeps concurrent first-touch from
    /// creating duplicates.
    pub fn get_or_create_priority(&self, user_id: i64, specialty: &str) -> Result<TopicPriority> {
        let base = self.base_priority_for(specialty)?;
        self.conn.execute(
            r#"
            INSERT INTO user_topic_priority (user_id, specialty, base_priority, final_priority)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(user_id, specialty) DO NOTHING
            "#,
            params![
                user_id,
                specialty,
                base,
                base.max(crate::priority::MIN_FINAL_PRIORITY)
            ],
        )?;
        self.conn.query_row(
            r#"
            SELECT user_id, specialty, questions_answered, correct_answers, accuracy_rate,
                   consecutive_correct, base_priority, performance_modifier, final_priority,
                   times_seen, last_seen
            FROM user_topic_priority WHERE user_id = ?1 AND specialty = ?2
            "#,
            params![user_id, specialty],
            row_to_priority,
        )
    }

    pub fn save_priority(&self, priority: &TopicPriority) -> Result<()> {
        write_priority(&self.conn, priority)
    }

    /// All of a user's priority rows, highest final priority first.
    pub fn priorities(&self, user_id: i64) -> Result<Vec<TopicPriority>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT user_id, specialty, questions_answered, correct_answers, accuracy_rate,
                   consecutive_correct, base_priority, performance_modifier, final_priority,
                   times_seen, last_seen
            FROM user_topic_priority
            WHERE user_id = ?1
            ORDER BY final_priority DESC, id ASC
            "#,
        )?;
        let rows = stmt.query_map([user_id], row_to_priority)?;
        rows.collect()
    }

    // ---- atomic event writes ----

    /// Apply one answered-question event atomically: the answer history row,
    /// the recomputed priority row, and the selection-log outcome backfill
    /// land together or not at all.
    pub fn apply_answer(
        &mut self,
        user_id: i64,
        question_id: i64,
        is_correct: bool,
        priority: &TopicPriority,
    ) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO user_answers (user_id, question_id, is_correct, answered_at) VALUES (?1, ?2, ?3, ?4)",
            params![user_id, question_id, is_correct, Local::now().to_rfc3339()],
        )?;
        write_priority(&tx, priority)?;
        // Stamp the outcome onto the most recent log row for this question;
        // log rows are otherwise immutable
        tx.execute(
            r#"
            UPDATE selection_log SET was_correct = ?3
            WHERE id = (
                SELECT id FROM selection_log
                WHERE user_id = ?1 AND question_id = ?2
                ORDER BY selected_at DESC, id DESC
                LIMIT 1
            )
            "#,
            params![user_id, question_id, is_correct],
        )?;
        tx.commit()
    }

    /// Apply one flashcard review atomically: the review history row, the
    /// new schedule state, and the recomputed priority row.
    pub fn apply_review(
        &mut self,
        flashcard_id: i64,
        user_id: i64,
        quality: u8,
        previous: &ScheduleState,
        new_state: &ScheduleState,
        priority: &TopicPriority,
    ) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            r#"
            INSERT INTO flashcard_reviews
            (flashcard_id, user_id, quality, previous_interval, previous_ease_factor, reviewed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                flashcard_id,
                user_id,
                quality,
                previous.interval_days,
                previous.ease_factor,
                Local::now().to_rfc3339(),
            ],
        )?;
        tx.execute(
            r#"
            UPDATE flashcards SET
                ease_factor = ?2, interval_days = ?3, repetitions = ?4,
                next_review_date = ?5, last_review_date = ?6, last_quality = ?7
            WHERE id = ?1
            "#,
            params![
                flashcard_id,
                new_state.ease_factor,
                new_state.interval_days,
                new_state.repetitions,
                new_state.next_review_date.to_string(),
                new_state.last_review_date.map(|d| d.to_string()),
                new_state.last_quality,
            ],
        )?;
        write_priority(&tx, priority)?;
        tx.commit()
    }

    // ---- flashcards ----

    pub fn add_flashcard(
        &self,
        user_id: i64,
        specialty: &str,
        front_text: &str,
        back_text: &str,
        state: &ScheduleState,
    ) -> Result<i64> {
        self.conn.execute(
            r#"
            INSERT INTO flashcards
            (user_id, specialty, front_text, back_text, ease_factor, interval_days,
             repetitions, next_review_date, last_review_date, last_quality)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                user_id,
                specialty,
                front_text,
                back_text,
                state.ease_factor,
                state.interval_days,
                state.repetitions,
                state.next_review_date.to_string(),
                state.last_review_date.map(|d| d.to_string()),
                state.last_quality,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn flashcard(&self, id: i64) -> Result<Option<Flashcard>> {
        self.conn
            .query_row(
                r#"
                SELECT id, user_id, specialty, front_text, back_text, ease_factor,
                       interval_days, repetitions, next_review_date, last_review_date, last_quality
                FROM flashcards WHERE id = ?1
                "#,
                [id],
                row_to_flashcard,
            )
            .optional()
    }

    pub fn flashcards(&self, user_id: i64) -> Result<Vec<Flashcard>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, user_id, specialty, front_text, back_text, ease_factor,
                   interval_days, repetitions, next_review_date, last_review_date, last_quality
            FROM flashcards
            WHERE user_id = ?1
            ORDER BY id ASC
            "#,
        )?;
        let rows = stmt.query_map([user_id], row_to_flashcard)?;
        rows.collect()
    }

    /// Cards due on or before `today`, most overdue first.
    pub fn due_flashcards(
        &self,
        user_id: i64,
        today: NaiveDate,
        limit: usize,
    ) -> Result<Vec<Flashcard>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, user_id, specialty, front_text, back_text, ease_factor,
                   interval_days, repetitions, next_review_date, last_review_date, last_quality
            FROM flashcards
            WHERE user_id = ?1 AND next_review_date <= ?2
            ORDER BY next_review_date ASC
            LIMIT ?3
            "#,
        )?;
        let rows = stmt.query_map(
            params![user_id, today.to_string(), limit as i64],
            row_to_flashcard,
        )?;
        rows.collect()
    }

    /// Per-day due counts for the next `days` days starting at `from`.
    /// Day buckets partition the due cards; nothing is counted twice.
    pub fn forecast(&self, user_id: i64, from: NaiveDate, days: u32) -> Result<Vec<ForecastDay>> {
        let mut stmt = self.conn.prepare(
            "SELECT COUNT(*) FROM flashcards WHERE user_id = ?1 AND next_review_date = ?2",
        )?;
        let mut out = Vec::with_capacity(days as usize);
        for offset in 0..days {
            let date = from + Duration::days(offset as i64);
            let due: i64 = stmt.query_row(params![user_id, date.to_string()], |row| row.get(0))?;
            out.push(ForecastDay { date, due });
        }
        Ok(out)
    }

    /// Share of reviews since `cutoff` with quality >= 3, as a percentage.
    /// `None` when there are no reviews in the window.
    pub fn retention_rate(&self, user_id: i64, cutoff: DateTime<Local>) -> Result<Option<f64>> {
        let (total, recalled): (i64, i64) = self.conn.query_row(
            r#"
            SELECT COUNT(*),
                   SUM(CASE WHEN quality >= 3 THEN 1 ELSE 0 END)
            FROM flashcard_reviews
            WHERE user_id = ?1 AND reviewed_at >= ?2
            "#,
            params![user_id, cutoff.to_rfc3339()],
            |row| Ok((row.get(0)?, row.get::<_, Option<i64>>(1)?.unwrap_or(0))),
        )?;

        if total == 0 {
            Ok(None)
        } else {
            Ok(Some((recalled as f64 / total as f64) * 100.0))
        }
    }

    // ---- selection log ----

    /// Append the selection log for one batch in a single transaction.
    pub fn log_selection(
        &mut self,
        user_id: i64,
        session_id: Option<i64>,
        entries: &[SelectionEntry],
    ) -> Result<()> {
        let tx = self.conn.transaction()?;
        let now = Local::now().to_rfc3339();
        for entry in entries {
            tx.execute(
                r#"
                INSERT INTO selection_log
                (user_id, session_id, specialty, method, priority_score, question_id, selected_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
                params![
                    user_id,
                    session_id,
                    entry.specialty,
                    entry.method.to_string(),
                    entry.priority_score,
                    entry.question_id,
                    now,
                ],
            )?;
        }
        tx.commit()
    }

    pub fn selection_log(&self, user_id: i64) -> Result<Vec<SelectionLogRow>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, user_id, session_id, specialty, method, priority_score,
                   question_id, was_correct, selected_at
            FROM selection_log
            WHERE user_id = ?1
            ORDER BY id ASC
            "#,
        )?;
        let rows = stmt.query_map([user_id], |row| {
            let selected_at_str: String = row.get(8)?;
            let selected_at = DateTime::parse_from_rfc3339(&selected_at_str)
                .map_err(|_| {
                    rusqlite::Error::InvalidColumnType(
                        8,
                        "selected_at".to_string(),
                        rusqlite::types::Type::Text,
                    )
                })?
                .with_timezone(&Local);
            Ok(SelectionLogRow {
                id: row.get(0)?,
                user_id: row.get(1)?,
                session_id: row.get(2)?,
                specialty: row.get(3)?,
                method: row.get(4)?,
                priority_score: row.get(5)?,
                question_id: row.get(6)?,
                was_correct: row.get(7)?,
                selected_at,
            })
        })?;
        rows.collect()
    }
}

fn write_priority(conn: &Connection, priority: &TopicPriority) -> Result<()> {
    conn.execute(
        r#"
        UPDATE user_topic_priority SET
            questions_answered = ?3, correct_answers = ?4, accuracy_rate = ?5,
            consecutive_correct = ?6, base_priority = ?7, performance_modifier = ?8,
            final_priority = ?9, times_seen = ?10, last_seen = ?11
        WHERE user_id = ?1 AND specialty = ?2
        "#,
        params![
            priority.user_id,
            priority.specialty,
            priority.questions_answered,
            priority.correct_answers,
            priority.accuracy_rate,
            priority.consecutive_correct,
            priority.base_priority,
            priority.performance_modifier,
            priority.final_priority,
            priority.times_seen,
            priority.last_seen.map(|ts| ts.to_rfc3339()),
        ],
    )?;
    Ok(())
}

fn row_to_priority(row: &rusqlite::Row) -> Result<TopicPriority> {
    let last_seen_str: Option<String> = row.get(10)?;
    let last_seen = last_seen_str.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .ok()
            .map(|ts| ts.with_timezone(&Local))
    });
    Ok(TopicPriority {
        user_id: row.get(0)?,
        specialty: row.get(1)?,
        questions_answered: row.get(2)?,
        correct_answers: row.get(3)?,
        accuracy_rate: row.get(4)?,
        consecutive_correct: row.get(5)?,
        base_priority: row.get(6)?,
        performance_modifier: row.get(7)?,
        final_priority: row.get(8)?,
        times_seen: row.get(9)?,
        last_seen,
    })
}

fn row_to_flashcard(row: &rusqlite::Row) -> Result<Flashcard> {
    let next_review_str: String = row.get(8)?;
    let next_review_date = next_review_str.parse::<NaiveDate>().map_err(|_| {
        rusqlite::Error::InvalidColumnType(
            8,
            "next_review_date".to_string(),
            rusqlite::types::Type::Text,
        )
    })?;
    let last_review_str: Option<String> = row.get(9)?;
    let last_review_date = last_review_str.and_then(|s| s.parse::<NaiveDate>().ok());

    Ok(Flashcard {
        id: row.get(0)?,
        user_id: row.get(1)?,
        specialty: row.get(2)?,
        front_text: row.get(3)?,
        back_text: row.get(4)?,
        state: ScheduleState {
            ease_factor: row.get(5)?,
            interval_days: row.get(6)?,
            repetitions: row.get(7)?,
            next_review_date,
            last_review_date,
            last_quality: row.get(10)?,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frequency::seed_frequencies;
    use crate::scheduler::{review, SchedulerConfig};
    use crate::selection::{SelectionEntry, SelectionMethod};

    fn store_with_seed() -> StudyStore {
        let mut store = StudyStore::open_in_memory().unwrap();
        store.replace_frequencies(&seed_frequencies()).unwrap();
        store
    }

    #[test]
    fn test_replace_and_read_frequencies() {
        let store = store_with_seed();
        let rows = store.frequencies().unwrap();
        assert_eq!(rows.len(), 15);
        assert_eq!(rows[0].specialty, "Clínica Médica");
        assert_eq!(rows[0].pareto_tier, ParetoTier::Top20);
    }

    #[test]
    fn test_questions_roundtrip() {
        let mut store = store_with_seed();
        store
            .add_questions(&[
                ("Cardiologia".into(), Difficulty::Easy, "q1".into()),
                ("Pediatria".into(), Difficulty::Hard, "q2".into()),
            ])
            .unwrap();

        let questions = store.questions().unwrap();
        assert_eq!(questions.len(), 2);
        assert_eq!(questions[0].difficulty, Difficulty::Easy);

        let q2 = store.question(2).unwrap().unwrap();
        assert_eq!(q2.specialty, "Pediatria");
        assert!(store.question(99).unwrap().is_none());
    }

    #[test]
    fn test_get_or_create_priority_copies_base() {
        let store = store_with_seed();
        let p = store.get_or_create_priority(1, "Pediatria").unwrap();
        assert_eq!(p.base_priority, 10.0);
        assert_eq!(p.final_priority, 10.0);
        assert_eq!(p.questions_answered, 0);

        // Unknown topic falls back to base 1.0
        let unknown = store.get_or_create_priority(1, "Genética").unwrap();
        assert_eq!(unknown.base_priority, 1.0);
    }

    #[test]
    fn test_get_or_create_priority_is_upsert() {
        let store = store_with_seed();
        let mut p = store.get_or_create_priority(1, "Cardiologia").unwrap();
        p.record_answer(true);
        store.save_priority(&p).unwrap();

        // Second get-or-create returns the mutated row, not a fresh one
        let again = store.get_or_create_priority(1, "Cardiologia").unwrap();
        assert_eq!(again.questions_answered, 1);
        assert_eq!(store.priorities(1).unwrap().len(), 1);
    }

    #[test]
    fn test_priorities_ordered_by_final_priority() {
        let store = store_with_seed();
        let mut low = store.get_or_create_priority(1, "Urologia").unwrap();
        for _ in 0..5 {
            low.record_answer(true);
        }
        store.save_priority(&low).unwrap();
        store.get_or_create_priority(1, "Clínica Médica").unwrap();

        let all = store.priorities(1).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].specialty, "Clínica Médica");
        assert!(all[0].final_priority >= all[1].final_priority);
    }

    #[test]
    fn test_apply_answer_writes_history_and_priority() {
        let mut store = store_with_seed();
        store
            .add_questions(&[("Cardiologia".into(), Difficulty::Easy, "q1".into())])
            .unwrap();

        let mut p = store.get_or_create_priority(1, "Cardiologia").unwrap();
        p.record_answer(true);
        store.apply_answer(1, 1, true, &p).unwrap();

        let ids = store.answered_ids(1).unwrap();
        assert!(ids.contains(&1));
        assert!(store.answered_ids(2).unwrap().is_empty());

        let saved = store.get_or_create_priority(1, "Cardiologia").unwrap();
        assert_eq!(saved.questions_answered, 1);
        assert_eq!(saved.correct_answers, 1);
    }

    #[test]
    fn test_flashcard_roundtrip() {
        let store = store_with_seed();
        let today = Local::now().date_naive();
        let state = ScheduleState::new(today);
        let id = store
            .add_flashcard(1, "Cardiologia", "front", "back", &state)
            .unwrap();

        let card = store.flashcard(id).unwrap().unwrap();
        assert_eq!(card.user_id, 1);
        assert_eq!(card.state, state);
        assert!(store.flashcard(id + 1).unwrap().is_none());
    }

    #[test]
    fn test_apply_review_persists_new_state() {
        let mut store = store_with_seed();
        let today = Local::now().date_naive();
        let state = ScheduleState::new(today);
        let id = store
            .add_flashcard(1, "Cardiologia", "front", "back", &state)
            .unwrap();

        let new_state = review(&state, 4, today, &SchedulerConfig::default());
        let mut p = store.get_or_create_priority(1, "Cardiologia").unwrap();
        p.record_answer(true);
        store.apply_review(id, 1, 4, &state, &new_state, &p).unwrap();

        let card = store.flashcard(id).unwrap().unwrap();
        assert_eq!(card.state, new_state);
        assert_eq!(card.state.last_quality, Some(4));
    }

    #[test]
    fn test_due_and_forecast() {
        let store = store_with_seed();
        let today = NaiveDate::from_ymd_opt(2026, 4, 10).unwrap();

        let due = ScheduleState {
            next_review_date: today,
            ..ScheduleState::new(today)
        };
        let later = ScheduleState {
            next_review_date: today + Duration::days(3),
            ..ScheduleState::new(today)
        };
        store.add_flashcard(1, "Cardiologia", "a", "b", &due).unwrap();
        store.add_flashcard(1, "Pediatria", "c", "d", &later).unwrap();

        let due_now = store.due_flashcards(1, today, 10).unwrap();
        assert_eq!(due_now.len(), 1);
        assert_eq!(due_now[0].specialty, "Cardiologia");

        let forecast = store.forecast(1, today, 7).unwrap();
        assert_eq!(forecast.len(), 7);
        assert_eq!(forecast[0].due, 1);
        assert_eq!(forecast[3].due, 1);
        let total: i64 = forecast.iter().map(|d| d.due).sum();
        assert_eq!(total, 2);
    }

    #[test]
    fn test_retention_rate() {
        let mut store = store_with_seed();
        let today = Local::now().date_naive();
        let state = ScheduleState::new(today);
        let id = store
            .add_flashcard(1, "Cardiologia", "a", "b", &state)
            .unwrap();

        let cutoff = Local::now() - Duration::days(30);
        assert_eq!(store.retention_rate(1, cutoff).unwrap(), None);

        let cfg = SchedulerConfig::default();
        let p = store.get_or_create_priority(1, "Cardiologia").unwrap();
        for quality in [5, 4, 2, 1] {
            let card = store.flashcard(id).unwrap().unwrap();
            let next = review(&card.state, quality, today, &cfg);
            store
                .apply_review(id, 1, quality, &card.state, &next, &p)
                .unwrap();
        }

        let rate = store.retention_rate(1, cutoff).unwrap().unwrap();
        assert_eq!(rate, 50.0);
    }

    #[test]
    fn test_selection_log_append_and_outcome_backfill() {
        let mut store = store_with_seed();
        store
            .add_questions(&[
                ("Cardiologia".into(), Difficulty::Easy, "q1".into()),
                ("Pediatria".into(), Difficulty::Easy, "q2".into()),
            ])
            .unwrap();
        let entries = vec![
            SelectionEntry {
                question_id: 1,
                specialty: "Cardiologia".into(),
                method: SelectionMethod::Pareto,
                priority_score: 7.0,
            },
            SelectionEntry {
                question_id: 2,
                specialty: "Pediatria".into(),
                method: SelectionMethod::Random,
                priority_score: 10.0,
            },
        ];
        store.log_selection(1, Some(99), &entries).unwrap();

        let log = store.selection_log(1).unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].method, "pareto");
        assert_eq!(log[0].session_id, Some(99));
        assert_eq!(log[0].was_correct, None);

        let mut p = store.get_or_create_priority(1, "Cardiologia").unwrap();
        p.record_answer(true);
        store.apply_answer(1, 1, true, &p).unwrap();

        let log = store.selection_log(1).unwrap();
        assert_eq!(log[0].was_correct, Some(true));
        assert_eq!(log[1].was_correct, None);
    }
}
