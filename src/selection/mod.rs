pub mod bank;
pub mod selector;

// Re-export the main types for convenience
pub use bank::{Difficulty, Question, QuestionBank, SelectionFilter};
pub use selector::{
    QuestionSelector, Selection, SelectionEntry, SelectionMethod, SelectorConfig,
};
