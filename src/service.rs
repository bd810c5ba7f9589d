use crate::error::{MedikError, Result};
use crate::frequency::{pareto_analysis, seed_frequencies, ParetoEntry};
use crate::priority::TopicPriority;
use crate::scheduler::{review, ScheduleState, SchedulerConfig};
use crate::selection::{
    Difficulty, Question, QuestionBank, QuestionSelector, SelectionFilter, SelectorConfig,
};
use crate::store::{Flashcard, ForecastDay, StudyStore};
use chrono::{Duration, Local, NaiveDate};
use log::{debug, info};
use rand::Rng;
use std::io;

/// A reviewed flashcard together with the priority row the review updated.
#[derive(Debug, Clone)]
pub struct ReviewOutcome {
    pub card: Flashcard,
    pub priority: TopicPriority,
}

/// Deck-wide schedule aggregates.
#[derive(Debug, Clone, Default)]
pub struct DeckStats {
    pub cards: usize,
    pub average_ease: Option<f64>,
    pub average_interval_days: Option<f64>,
}

/// A user's priorities split into the attention/mastery partitions.
#[derive(Debug, Clone, Default)]
pub struct PrioritySummary {
    pub priorities: Vec<TopicPriority>,
    pub needs_attention: Vec<String>,
    pub mastered: Vec<String>,
}

/// Facade over the store, selector, and scheduler: the operations callers
/// actually invoke. Validation happens up front, before any row is written.
pub struct StudyService {
    store: StudyStore,
    scheduler: SchedulerConfig,
    selector: SelectorConfig,
}

impl StudyService {
    pub fn new(store: StudyStore) -> Self {
        Self {
            store,
            scheduler: SchedulerConfig::default(),
            selector: SelectorConfig::default(),
        }
    }

    pub fn with_scheduler_config(mut self, config: SchedulerConfig) -> Self {
        self.scheduler = config;
        self
    }

    /// Load the embedded topic frequency table, replacing whatever is there.
    pub fn seed_topics(&mut self) -> Result<usize> {
        let rows = seed_frequencies();
        self.store.replace_frequencies(&rows)?;
        info!("seeded {} topic frequencies", rows.len());
        Ok(rows.len())
    }

    pub fn add_questions(&mut self, questions: &[(String, Difficulty, String)]) -> Result<()> {
        for (specialty, _, text) in questions {
            if specialty.trim().is_empty() || text.trim().is_empty() {
                return Err(MedikError::Validation(
                    "question specialty and text must be non-empty".into(),
                ));
            }
        }
        self.store.add_questions(questions)?;
        Ok(())
    }

    pub fn add_flashcard(
        &mut self,
        user_id: i64,
        specialty: &str,
        front_text: &str,
        back_text: &str,
    ) -> Result<i64> {
        if specialty.trim().is_empty() || front_text.trim().is_empty() {
            return Err(MedikError::Validation(
                "flashcard specialty and front must be non-empty".into(),
            ));
        }
        let state = ScheduleState::new(Local::now().date_naive());
        let id = self
            .store
            .add_flashcard(user_id, specialty, front_text, back_text, &state)?;
        Ok(id)
    }

    /// Build one study batch for a user and append it to the selection log.
    /// A short or empty batch is a valid outcome, never an error.
    pub fn select_questions(
        &mut self,
        user_id: i64,
        limit: usize,
        filter: &SelectionFilter,
        session_id: Option<i64>,
    ) -> Result<Vec<Question>> {
        self.select_questions_with_rng(&mut rand::thread_rng(), user_id, limit, filter, session_id)
    }

    /// Same as [`select_questions`](Self::select_questions), with the rng
    /// injected so callers can make the draw reproducible.
    pub fn select_questions_with_rng<R: Rng>(
        &mut self,
        rng: &mut R,
        user_id: i64,
        limit: usize,
        filter: &SelectionFilter,
        session_id: Option<i64>,
    ) -> Result<Vec<Question>> {
        let frequencies = self.store.frequencies()?;
        let bank = QuestionBank::new(self.store.questions()?);
        let answered = self.store.answered_ids(user_id)?;
        let priorities = self.store.priorities(user_id)?;

        let selector = QuestionSelector::new(&bank, &frequencies).with_config(self.selector);
        let mut selection = selector.select(rng, limit, filter, &answered, &priorities);

        // First exposure to a topic creates its priority row; the log then
        // carries the row's final priority, not the selector's fallback
        for entry in &mut selection.log {
            let row = self.store.get_or_create_priority(user_id, &entry.specialty)?;
            entry.priority_score = row.final_priority;
        }
        self.store.log_selection(user_id, session_id, &selection.log)?;

        debug!(
            "selected {} of {} requested questions for user {}",
            selection.questions.len(),
            limit,
            user_id
        );
        Ok(selection.questions)
    }

    /// Fold one answer/review event into a topic's priority. This is the
    /// single update path; both the question and flashcard flows end here.
    pub fn record_answer_outcome(
        &mut self,
        user_id: i64,
        specialty: &str,
        is_correct: bool,
    ) -> Result<TopicPriority> {
        let mut priority = self.store.get_or_create_priority(user_id, specialty)?;
        priority.record_answer(is_correct);
        self.store.save_priority(&priority)?;
        Ok(priority)
    }

    /// Record an answer to a specific bank question: answer history, the
    /// topic's priority, and the selection-log outcome land atomically.
    pub fn record_question_answer(
        &mut self,
        user_id: i64,
        question_id: i64,
        is_correct: bool,
    ) -> Result<TopicPriority> {
        let question = self
            .store
            .question(question_id)?
            .ok_or_else(|| MedikError::not_found("question", question_id))?;

        let mut priority = self
            .store
            .get_or_create_priority(user_id, &question.specialty)?;
        priority.record_answer(is_correct);
        self.store
            .apply_answer(user_id, question_id, is_correct, &priority)?;

        debug!(
            "user {} answered question {} ({}): final priority {:.2}",
            user_id, question_id, question.specialty, priority.final_priority
        );
        Ok(priority)
    }

    /// Grade one flashcard review and reschedule the card. The quality grade
    /// is validated before anything is written; on any failure no partial
    /// schedule or priority change survives.
    pub fn review_flashcard(
        &mut self,
        user_id: i64,
        flashcard_id: i64,
        quality: u8,
    ) -> Result<ReviewOutcome> {
        self.review_flashcard_on(user_id, flashcard_id, quality, Local::now().date_naive())
    }

    pub fn review_flashcard_on(
        &mut self,
        user_id: i64,
        flashcard_id: i64,
        quality: u8,
        today: NaiveDate,
    ) -> Result<ReviewOutcome> {
        if quality > 5 {
            return Err(MedikError::Validation(format!(
                "quality must be between 0 and 5, got {quality}"
            )));
        }

        let mut card = self
            .store
            .flashcard(flashcard_id)?
            .filter(|c| c.user_id == user_id)
            .ok_or_else(|| MedikError::not_found("flashcard", flashcard_id))?;

        let new_state = review(&card.state, quality, today, &self.scheduler);
        let mut priority = self
            .store
            .get_or_create_priority(user_id, &card.specialty)?;
        priority.record_answer(quality >= 3);

        self.store.apply_review(
            flashcard_id,
            user_id,
            quality,
            &card.state,
            &new_state,
            &priority,
        )?;
        card.state = new_state;

        debug!(
            "user {} reviewed card {} (q={}): next review {}",
            user_id, flashcard_id, quality, card.state.next_review_date
        );
        Ok(ReviewOutcome { card, priority })
    }

    /// Cards due on or before `today`, most overdue first.
    pub fn due_flashcards(
        &self,
        user_id: i64,
        today: NaiveDate,
        limit: usize,
    ) -> Result<Vec<Flashcard>> {
        Ok(self.store.due_flashcards(user_id, today, limit)?)
    }

    /// Per-day due counts for the next `days` days starting at `from`.
    pub fn forecast(&self, user_id: i64, from: NaiveDate, days: u32) -> Result<Vec<ForecastDay>> {
        Ok(self.store.forecast(user_id, from, days)?)
    }

    /// Share of the last `days` days' reviews recalled (quality >= 3).
    pub fn retention_rate(&self, user_id: i64, days: i64) -> Result<Option<f64>> {
        let cutoff = Local::now() - Duration::days(days);
        Ok(self.store.retention_rate(user_id, cutoff)?)
    }

    /// Aggregate ease/interval stats over a user's whole deck.
    pub fn deck_stats(&self, user_id: i64) -> Result<DeckStats> {
        let cards = self.store.flashcards(user_id)?;
        let eases: Vec<f64> = cards.iter().map(|c| c.state.ease_factor).collect();
        let intervals: Vec<f64> = cards
            .iter()
            .map(|c| c.state.interval_days as f64)
            .collect();
        Ok(DeckStats {
            cards: cards.len(),
            average_ease: crate::util::mean(&eases),
            average_interval_days: crate::util::mean(&intervals),
        })
    }

    /// All of a user's priorities plus the attention/mastery partitions.
    pub fn priority_summary(&self, user_id: i64) -> Result<PrioritySummary> {
        let priorities = self.store.priorities(user_id)?;
        let needs_attention = priorities
            .iter()
            .filter(|p| p.needs_attention())
            .map(|p| p.specialty.clone())
            .collect();
        let mastered = priorities
            .iter()
            .filter(|p| p.mastered())
            .map(|p| p.specialty.clone())
            .collect();
        Ok(PrioritySummary {
            priorities,
            needs_attention,
            mastered,
        })
    }

    /// The stored frequency table with cumulative shares and the high-yield
    /// cutover marked.
    pub fn pareto_overview(&self) -> Result<Vec<ParetoEntry>> {
        let frequencies = self.store.frequencies()?;
        Ok(pareto_analysis(&frequencies))
    }

    /// Write a user's selection log as CSV.
    pub fn export_selection_log<W: io::Write>(&self, user_id: i64, writer: W) -> Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);
        wtr.write_record([
            "id",
            "session_id",
            "specialty",
            "method",
            "priority_score",
            "question_id",
            "was_correct",
            "selected_at",
        ])?;
        for row in self.store.selection_log(user_id)? {
            wtr.write_record([
                row.id.to_string(),
                row.session_id.map(|s| s.to_string()).unwrap_or_default(),
                row.specialty,
                row.method,
                format!("{:.2}", row.priority_score),
                row.question_id.to_string(),
                row.was_correct.map(|c| c.to_string()).unwrap_or_default(),
                row.selected_at.to_rfc3339(),
            ])?;
        }
        wtr.flush().map_err(csv::Error::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn service() -> StudyService {
        let mut service = StudyService::new(StudyStore::open_in_memory().unwrap());
        service.seed_topics().unwrap();
        service
    }

    fn seed_bank(service: &mut StudyService, per_topic: usize) {
        let mut questions = Vec::new();
        for specialty in ["Clínica Médica", "Cirurgia Geral", "Pediatria", "Urologia"] {
            for i in 0..per_topic {
                questions.push((
                    specialty.to_string(),
                    Difficulty::Medium,
                    format!("{specialty} #{i}"),
                ));
            }
        }
        service.add_questions(&questions).unwrap();
    }

    #[test]
    fn test_select_creates_priority_rows_and_log() {
        let mut service = service();
        seed_bank(&mut service, 6);

        let mut rng = StdRng::seed_from_u64(1);
        let batch = service
            .select_questions_with_rng(&mut rng, 1, 10, &SelectionFilter::default(), Some(7))
            .unwrap();
        assert!(!batch.is_empty());

        let summary = service.priority_summary(1).unwrap();
        let topics: Vec<&str> = summary
            .priorities
            .iter()
            .map(|p| p.specialty.as_str())
            .collect();
        for q in &batch {
            assert!(topics.contains(&q.specialty.as_str()));
        }

        let log = service.store.selection_log(1).unwrap();
        assert_eq!(log.len(), batch.len());
        assert!(log.iter().all(|row| row.session_id == Some(7)));
    }

    #[test]
    fn test_empty_bank_yields_empty_batch() {
        let mut service = service();
        let batch = service
            .select_questions(1, 10, &SelectionFilter::default(), None)
            .unwrap();
        assert!(batch.is_empty());
    }

    #[test]
    fn test_record_question_answer_unknown_id() {
        let mut service = service();
        let err = service.record_question_answer(1, 42, true).unwrap_err();
        assert_matches!(err, MedikError::NotFound { entity: "question", .. });
    }

    #[test]
    fn test_record_question_answer_updates_priority_and_log() {
        let mut service = service();
        seed_bank(&mut service, 3);

        let mut rng = StdRng::seed_from_u64(3);
        let batch = service
            .select_questions_with_rng(&mut rng, 1, 4, &SelectionFilter::default(), None)
            .unwrap();
        let first = &batch[0];

        let p = service.record_question_answer(1, first.id, false).unwrap();
        assert_eq!(p.specialty, first.specialty);
        assert_eq!(p.questions_answered, 1);

        let log = service.store.selection_log(1).unwrap();
        let row = log.iter().find(|r| r.question_id == first.id).unwrap();
        assert_eq!(row.was_correct, Some(false));
    }

    #[test]
    fn test_answer_and_review_share_the_update_path() {
        let mut service = service();
        seed_bank(&mut service, 3);
        let card_id = service
            .add_flashcard(1, "Cardiologia", "Causas de IC", "Isquemia, HAS")
            .unwrap();

        service.record_answer_outcome(1, "Cardiologia", true).unwrap();
        let outcome = service.review_flashcard(1, card_id, 5).unwrap();

        // The review counted as a second correct answer on the same row
        assert_eq!(outcome.priority.questions_answered, 2);
        assert_eq!(outcome.priority.consecutive_correct, 2);
    }

    #[test]
    fn test_review_quality_validation_precedes_lookup() {
        let mut service = service();
        let err = service.review_flashcard(1, 999, 6).unwrap_err();
        assert_matches!(err, MedikError::Validation(_));
    }

    #[test]
    fn test_review_unknown_or_foreign_card() {
        let mut service = service();
        let err = service.review_flashcard(1, 999, 4).unwrap_err();
        assert_matches!(err, MedikError::NotFound { entity: "flashcard", .. });

        let card_id = service.add_flashcard(1, "Pediatria", "front", "back").unwrap();
        let err = service.review_flashcard(2, card_id, 4).unwrap_err();
        assert_matches!(err, MedikError::NotFound { .. });
    }

    #[test]
    fn test_failed_validation_writes_nothing() {
        let mut service = service();
        let card_id = service.add_flashcard(1, "Pediatria", "front", "back").unwrap();
        let before = service.store.flashcard(card_id).unwrap().unwrap();

        let _ = service.review_flashcard(1, card_id, 9).unwrap_err();

        let after = service.store.flashcard(card_id).unwrap().unwrap();
        assert_eq!(before.state, after.state);
        assert!(service.priority_summary(1).unwrap().priorities.is_empty());
    }

    #[test]
    fn test_review_reschedules_card() {
        let mut service = service();
        let today = Local::now().date_naive();
        let card_id = service
            .add_flashcard(1, "Neurologia", "front", "back")
            .unwrap();

        let first = service
            .review_flashcard_on(1, card_id, 4, today)
            .unwrap();
        assert_eq!(first.card.state.repetitions, 1);

        let second = service
            .review_flashcard_on(1, card_id, 4, first.card.state.next_review_date)
            .unwrap();
        assert_eq!(second.card.state.interval_days, 6);

        let due = service.due_flashcards(1, today, 10).unwrap();
        assert!(due.is_empty());
    }

    #[test]
    fn test_unbounded_ease_config() {
        let mut service = StudyService::new(StudyStore::open_in_memory().unwrap())
            .with_scheduler_config(SchedulerConfig { max_ease: None });
        service.seed_topics().unwrap();

        let card_id = service.add_flashcard(1, "Pediatria", "a", "b").unwrap();
        let mut date = Local::now().date_naive();
        for _ in 0..20 {
            let outcome = service.review_flashcard_on(1, card_id, 5, date).unwrap();
            date = outcome.card.state.next_review_date;
        }

        let card = service.store.flashcard(card_id).unwrap().unwrap();
        assert!(card.state.ease_factor > 4.0);
    }

    #[test]
    fn test_deck_stats() {
        let mut service = service();
        assert_eq!(service.deck_stats(1).unwrap().average_ease, None);

        service.add_flashcard(1, "Pediatria", "a", "b").unwrap();
        service.add_flashcard(1, "Urologia", "c", "d").unwrap();

        let stats = service.deck_stats(1).unwrap();
        assert_eq!(stats.cards, 2);
        assert_eq!(stats.average_ease, Some(2.5));
        assert_eq!(stats.average_interval_days, Some(1.0));
    }

    #[test]
    fn test_priority_summary_partitions() {
        let mut service = service();
        for _ in 0..5 {
            service.record_answer_outcome(1, "Pediatria", true).unwrap();
        }
        for _ in 0..4 {
            service
                .record_answer_outcome(1, "Urologia", false)
                .unwrap();
        }

        let summary = service.priority_summary(1).unwrap();
        assert_eq!(summary.mastered, vec!["Pediatria".to_string()]);
        assert_eq!(summary.needs_attention, vec!["Urologia".to_string()]);
    }

    #[test]
    fn test_pareto_overview_marks_high_yield() {
        let service = service();
        let overview = service.pareto_overview().unwrap();
        assert_eq!(overview.len(), 15);
        assert!(overview[0].is_top_20 || overview[0].cumulative_percentage > 20.0);
    }

    #[test]
    fn test_validation_rejects_blank_input() {
        let mut service = service();
        let err = service.add_flashcard(1, "  ", "front", "back").unwrap_err();
        assert_matches!(err, MedikError::Validation(_));

        let err = service
            .add_questions(&[(String::new(), Difficulty::Easy, "q".into())])
            .unwrap_err();
        assert_matches!(err, MedikError::Validation(_));
    }

    #[test]
    fn test_export_selection_log_csv() {
        let mut service = service();
        seed_bank(&mut service, 2);
        let mut rng = StdRng::seed_from_u64(5);
        service
            .select_questions_with_rng(&mut rng, 1, 3, &SelectionFilter::default(), None)
            .unwrap();

        let mut out = Vec::new();
        service.export_selection_log(1, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("id,session_id,specialty,method"));
        assert!(text.lines().count() > 1);
    }
}
