pub mod app_dirs;
pub mod error;
pub mod frequency;
pub mod priority;
pub mod scheduler;
pub mod selection;
pub mod service;
pub mod store;
pub mod util;

use crate::selection::{Difficulty, SelectionFilter};
use crate::service::StudyService;
use crate::store::StudyStore;
use chrono::Local;
use clap::{Parser, Subcommand};
use std::error::Error;
use std::io;
use std::path::PathBuf;

/// adaptive question selection and spaced repetition for exam prep
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "A study-tracking backend that weights questions toward high-yield specialties, boosts topics you struggle with, and schedules flashcard reviews with SM-2."
)]
pub struct Cli {
    /// path to the study database (defaults to the per-user state dir)
    #[clap(long)]
    db: Option<PathBuf>,

    /// user id to operate on
    #[clap(short, long, default_value_t = 1)]
    user: i64,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// load the embedded specialty frequency table
    Seed,

    /// pick a study batch weighted by yield and personal weak spots
    Select {
        /// number of questions to request
        #[clap(short, long, default_value_t = 10)]
        limit: usize,

        /// restrict the batch to one specialty
        #[clap(short, long)]
        specialty: Option<String>,

        /// restrict the batch to one difficulty
        #[clap(short, long, value_enum)]
        difficulty: Option<Difficulty>,

        /// session id to stamp onto the selection log
        #[clap(long)]
        session: Option<i64>,
    },

    /// record an answer to a bank question
    Answer {
        question_id: i64,

        /// the answer was correct (omit for incorrect)
        #[clap(long)]
        correct: bool,
    },

    /// add a flashcard for a specialty
    AddCard {
        specialty: String,
        front: String,
        back: String,
    },

    /// grade a flashcard review (quality 0-5) and reschedule it
    Review { flashcard_id: i64, quality: u8 },

    /// list flashcards due today
    Due {
        #[clap(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// per-specialty priorities with weak and mastered topics called out
    Priorities,

    /// upcoming review load per day
    Forecast {
        #[clap(short, long, default_value_t = 7)]
        days: u32,
    },

    /// cumulative frequency breakdown of the specialty table
    Pareto,

    /// deck aggregates and 30-day retention
    Stats,

    /// export the selection log as csv to stdout
    Export,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let cli = Cli::parse();

    let store = match &cli.db {
        Some(path) => StudyStore::open(path)?,
        None => StudyStore::new()?,
    };
    let mut service = StudyService::new(store);

    match cli.command {
        Command::Seed => {
            let count = service.seed_topics()?;
            println!("seeded {count} specialties");
        }
        Command::Select {
            limit,
            specialty,
            difficulty,
            session,
        } => {
            let filter = SelectionFilter {
                specialty,
                difficulty,
            };
            let batch = service.select_questions(cli.user, limit, &filter, session)?;
            if batch.is_empty() {
                println!("no questions available");
            }
            for q in batch {
                println!("[{}] {} ({}) {}", q.id, q.specialty, q.difficulty, q.question_text);
            }
        }
        Command::Answer {
            question_id,
            correct,
        } => {
            let p = service.record_question_answer(cli.user, question_id, correct)?;
            println!(
                "{}: {}/{} correct ({:.1}%), priority {:.2}",
                p.specialty, p.correct_answers, p.questions_answered, p.accuracy_rate, p.final_priority
            );
        }
        Command::AddCard {
            specialty,
            front,
            back,
        } => {
            let id = service.add_flashcard(cli.user, &specialty, &front, &back)?;
            println!("added flashcard {id}");
        }
        Command::Review {
            flashcard_id,
            quality,
        } => {
            let outcome = service.review_flashcard(cli.user, flashcard_id, quality)?;
            let state = &outcome.card.state;
            println!(
                "card {}: interval {}d, ease {:.2}, next review {}",
                flashcard_id, state.interval_days, state.ease_factor, state.next_review_date
            );
        }
        Command::Due { limit } => {
            let today = Local::now().date_naive();
            let due = service.due_flashcards(cli.user, today, limit)?;
            if due.is_empty() {
                println!("nothing due");
            }
            for card in due {
                println!(
                    "[{}] {} (due {}): {}",
                    card.id, card.specialty, card.state.next_review_date, card.front_text
                );
            }
        }
        Command::Priorities => {
            let summary = service.priority_summary(cli.user)?;
            for p in &summary.priorities {
                println!(
                    "{:<30} priority {:>6.2}  accuracy {:>5.1}%  ({} answered)",
                    p.specialty, p.final_priority, p.accuracy_rate, p.questions_answered
                );
            }
            if !summary.needs_attention.is_empty() {
                println!("needs attention: {}", summary.needs_attention.join(", "));
            }
            if !summary.mastered.is_empty() {
                println!("mastered: {}", summary.mastered.join(", "));
            }
        }
        Command::Forecast { days } => {
            let today = Local::now().date_naive();
            for day in service.forecast(cli.user, today, days)? {
                println!("{}  {} due", day.date, day.due);
            }
        }
        Command::Pareto => {
            for entry in service.pareto_overview()? {
                let marker = if entry.is_top_20 { "*" } else { " " };
                println!(
                    "{marker} {:<30} {:>5.1}%  cum {:>5.1}%  [{}]",
                    entry.specialty,
                    entry.frequency_percentage,
                    entry.cumulative_percentage,
                    entry.pareto_tier
                );
            }
        }
        Command::Stats => {
            let stats = service.deck_stats(cli.user)?;
            println!("cards: {}", stats.cards);
            if let Some(ease) = stats.average_ease {
                println!("average ease: {ease:.2}");
            }
            if let Some(interval) = stats.average_interval_days {
                println!("average interval: {interval:.1}d");
            }
            match service.retention_rate(cli.user, 30)? {
                Some(rate) => println!("retention (30d): {rate:.1}%"),
                None => println!("retention (30d): no reviews"),
            }
        }
        Command::Export => {
            service.export_selection_log(cli.user, io::stdout().lock())?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["medik", "seed"]);
        assert_eq!(cli.user, 1);
        assert!(cli.db.is_none());
        assert!(matches!(cli.command, Command::Seed));
    }

    #[test]
    fn test_cli_select_flags() {
        let cli = Cli::parse_from([
            "medik",
            "-u",
            "3",
            "select",
            "-l",
            "20",
            "-s",
            "Pediatria",
            "-d",
            "hard",
            "--session",
            "9",
        ]);
        assert_eq!(cli.user, 3);
        match cli.command {
            Command::Select {
                limit,
                specialty,
                difficulty,
                session,
            } => {
                assert_eq!(limit, 20);
                assert_eq!(specialty.as_deref(), Some("Pediatria"));
                assert_eq!(difficulty, Some(Difficulty::Hard));
                assert_eq!(session, Some(9));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_cli_select_defaults() {
        let cli = Cli::parse_from(["medik", "select"]);
        match cli.command {
            Command::Select {
                limit,
                specialty,
                difficulty,
                session,
            } => {
                assert_eq!(limit, 10);
                assert!(specialty.is_none());
                assert!(difficulty.is_none());
                assert!(session.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_cli_answer_and_review() {
        let cli = Cli::parse_from(["medik", "answer", "17", "--correct"]);
        match cli.command {
            Command::Answer {
                question_id,
                correct,
            } => {
                assert_eq!(question_id, 17);
                assert!(correct);
            }
            other => panic!("unexpected command: {other:?}"),
        }

        let cli = Cli::parse_from(["medik", "review", "4", "5"]);
        match cli.command {
            Command::Review {
                flashcard_id,
                quality,
            } => {
                assert_eq!(flashcard_id, 4);
                assert_eq!(quality, 5);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_cli_db_override() {
        let cli = Cli::parse_from(["medik", "--db", "/tmp/x.db", "due"]);
        assert_eq!(cli.db, Some(PathBuf::from("/tmp/x.db")));
    }
}
