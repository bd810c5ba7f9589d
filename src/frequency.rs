use include_dir::{include_dir, Dir};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_json::from_str;

static DATA_DIR: Dir = include_dir!("src/data");

/// Pareto tier of a topic, derived from its historical exam frequency.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ParetoTier {
    Top20,
    Important,
    Normal,
    Rare,
}

impl ParetoTier {
    /// Tier is a step function of the frequency percentage.
    pub fn from_frequency(frequency_percentage: f64) -> Self {
        if frequency_percentage >= 15.0 {
            ParetoTier::Top20
        } else if frequency_percentage >= 8.0 {
            ParetoTier::Important
        } else if frequency_percentage >= 3.0 {
            ParetoTier::Normal
        } else {
            ParetoTier::Rare
        }
    }

    /// Base importance score (1-10) attached to each tier.
    pub fn importance_score(self) -> f64 {
        match self {
            ParetoTier::Top20 => 10.0,
            ParetoTier::Important => 7.0,
            ParetoTier::Normal => 4.0,
            ParetoTier::Rare => 1.0,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "top20" => Some(ParetoTier::Top20),
            "important" => Some(ParetoTier::Important),
            "normal" => Some(ParetoTier::Normal),
            "rare" => Some(ParetoTier::Rare),
            _ => None,
        }
    }
}

/// Per-specialty historical exam frequency and its derived importance.
///
/// Shared read-only reference data during selection; recomputed as a whole
/// when the underlying frequency numbers change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicFrequency {
    pub specialty: String,
    pub total_questions: u32,
    pub frequency_percentage: f64,
    #[serde(default = "default_score", skip_deserializing)]
    pub importance_score: f64,
    #[serde(default = "default_tier", skip_deserializing)]
    pub pareto_tier: ParetoTier,
}

fn default_score() -> f64 {
    1.0
}

fn default_tier() -> ParetoTier {
    ParetoTier::Rare
}

impl TopicFrequency {
    pub fn new(specialty: impl Into<String>, total_questions: u32, frequency_percentage: f64) -> Self {
        let tier = ParetoTier::from_frequency(frequency_percentage);
        Self {
            specialty: specialty.into(),
            total_questions,
            frequency_percentage,
            importance_score: tier.importance_score(),
            pareto_tier: tier,
        }
    }

    /// Re-derive tier and score after a frequency change.
    pub fn recalculate(&mut self) {
        self.pareto_tier = ParetoTier::from_frequency(self.frequency_percentage);
        self.importance_score = self.pareto_tier.importance_score();
    }
}

/// Load the embedded seed table of historical SES-GO/PSU-GO frequencies.
pub fn seed_frequencies() -> Vec<TopicFrequency> {
    let file = DATA_DIR
        .get_file("topic_frequencies.json")
        .expect("seed frequency file not found");

    let file_as_str = file
        .contents_utf8()
        .expect("unable to interpret seed file as a string");

    let mut rows: Vec<TopicFrequency> =
        from_str(file_as_str).expect("unable to deserialize seed frequency json");
    for row in &mut rows {
        row.recalculate();
    }
    rows
}

/// One row of the cumulative Pareto walk over the frequency table.
#[derive(Debug, Clone, Serialize)]
pub struct ParetoEntry {
    pub specialty: String,
    pub frequency_percentage: f64,
    pub cumulative_percentage: f64,
    pub pareto_tier: ParetoTier,
    pub importance_score: f64,
    pub is_top_20: bool,
}

/// Walk the table in descending frequency order and flag the topics making
/// up the first 20% of cumulative exam frequency.
pub fn pareto_analysis(frequencies: &[TopicFrequency]) -> Vec<ParetoEntry> {
    let total: f64 = frequencies.iter().map(|tf| tf.frequency_percentage).sum();
    if total <= 0.0 {
        return Vec::new();
    }

    let mut cumulative = 0.0;
    frequencies
        .iter()
        .sorted_by(|a, b| {
            b.frequency_percentage
                .partial_cmp(&a.frequency_percentage)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|tf| {
            cumulative += tf.frequency_percentage;
            let cumulative_percentage = (cumulative / total) * 100.0;
            ParetoEntry {
                specialty: tf.specialty.clone(),
                frequency_percentage: tf.frequency_percentage,
                cumulative_percentage,
                pareto_tier: tf.pareto_tier,
                importance_score: tf.importance_score,
                is_top_20: cumulative_percentage <= 20.0,
            }
        })
        .collect()
}
