use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// A topic's final priority never drops below this, so every topic stays
/// selectable in the performance bucket.
pub const MIN_FINAL_PRIORITY: f64 = 0.1;

/// Answers needed before accuracy starts moving the modifier.
const MIN_SAMPLE: u32 = 3;

/// Per-(user, specialty) rolling performance state and the derived scalar
/// priority used to bias question selection.
///
/// This is the single update path shared by the quiz-answer and
/// flashcard-review flows, so both feed the same prioritization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicPriority {
    pub user_id: i64,
    pub specialty: String,
    pub questions_answered: u32,
    pub correct_answers: u32,
    pub accuracy_rate: f64,
    pub consecutive_correct: u32,
    pub base_priority: f64,
    pub performance_modifier: f64,
    pub final_priority: f64,
    pub times_seen: u32,
    pub last_seen: Option<DateTime<Local>>,
}

impl TopicPriority {
    /// Fresh row, lazily created on first exposure to a topic. The base
    /// priority is copied from the topic's importance score at creation.
    pub fn new(user_id: i64, specialty: impl Into<String>, base_priority: f64) -> Self {
        Self {
            user_id,
            specialty: specialty.into(),
            questions_answered: 0,
            correct_answers: 0,
            accuracy_rate: 0.0,
            consecutive_correct: 0,
            base_priority,
            performance_modifier: 1.0,
            final_priority: base_priority.max(MIN_FINAL_PRIORITY),
            times_seen: 0,
            last_seen: None,
        }
    }

    /// Fold one answer/review event into the rolling state and recompute the
    /// final priority. Deliberately not idempotent: two identical calls are
    /// two distinct events and count twice.
    pub fn record_answer(&mut self, is_correct: bool) {
        self.questions_answered += 1;

        if is_correct {
            self.correct_answers += 1;
            self.consecutive_correct += 1;
        } else {
            self.consecutive_correct = 0;
        }

        self.accuracy_rate =
            (self.correct_answers as f64 / self.questions_answered as f64) * 100.0;

        self.performance_modifier = self.compute_performance_modifier();
        self.final_priority =
            (self.base_priority * self.performance_modifier).max(MIN_FINAL_PRIORITY);

        self.times_seen += 1;
        self.last_seen = Some(Local::now());
    }

    /// Accuracy-tier base, then a streak adjustment on top. The two streak
    /// branches are mutually exclusive: a 5+ streak implies the last answer
    /// was correct, and a streak of 0 implies it was not.
    fn compute_performance_modifier(&self) -> f64 {
        if self.questions_answered < MIN_SAMPLE {
            return 1.0;
        }

        let mut modifier = if self.accuracy_rate < 50.0 {
            2.0
        } else if self.accuracy_rate < 70.0 {
            1.5
        } else if self.accuracy_rate < 85.0 {
            1.0
        } else {
            0.5
        };

        if self.consecutive_correct >= 5 {
            modifier *= 0.7;
        } else if self.consecutive_correct == 0 {
            modifier *= 1.3;
        }

        modifier
    }

    /// Topics the user is struggling with: low accuracy on a real sample.
    pub fn needs_attention(&self) -> bool {
        self.accuracy_rate < 70.0 && self.questions_answered >= 3
    }

    /// Topics the user has under control.
    pub fn mastered(&self) -> bool {
        self.accuracy_rate >= 85.0 && self.questions_answered >= 5
    }
}
