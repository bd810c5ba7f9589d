use serde::{Deserialize, Serialize};

/// Question difficulty bands used for filtering.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum, strum_macros::Display,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "easy" => Some(Difficulty::Easy),
            "medium" => Some(Difficulty::Medium),
            "hard" => Some(Difficulty::Hard),
            _ => None,
        }
    }
}

/// One quiz question. The selector treats the bank as read-only; answer
/// bookkeeping lives with the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub specialty: String,
    pub difficulty: Difficulty,
    pub question_text: String,
}

/// Optional narrowing applied to every selection bucket.
#[derive(Debug, Clone, Default)]
pub struct SelectionFilter {
    pub specialty: Option<String>,
    pub difficulty: Option<Difficulty>,
}

impl SelectionFilter {
    pub fn matches(&self, question: &Question) -> bool {
        if let Some(ref specialty) = self.specialty {
            if question.specialty != *specialty {
                return false;
            }
        }
        if let Some(difficulty) = self.difficulty {
            if question.difficulty != difficulty {
                return false;
            }
        }
        true
    }

    pub fn allows_specialty(&self, specialty: &str) -> bool {
        self.specialty.as_deref().map_or(true, |s| s == specialty)
    }
}

/// In-memory view over the question bank consumed during one selection call.
#[derive(Debug, Clone, Default)]
pub struct QuestionBank {
    questions: Vec<Question>,
}

impl QuestionBank {
    pub fn new(questions: Vec<Question>) -> Self {
        Self { questions }
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn all(&self) -> &[Question] {
        &self.questions
    }

    /// Questions of one topic passing the filter's difficulty.
    pub fn topic_pool<'a>(
        &'a self,
        specialty: &'a str,
        filter: &'a SelectionFilter,
    ) -> impl Iterator<Item = &'a Question> {
        self.questions.iter().filter(move |q| {
            q.specialty == specialty
                && filter.difficulty.map_or(true, |d| q.difficulty == d)
        })
    }

    /// All questions passing the filter.
    pub fn matching<'a>(
        &'a self,
        filter: &'a SelectionFilter,
    ) -> impl Iterator<Item = &'a Question> {
        self.questions.iter().filter(move |q| filter.matches(q))
    }
}
