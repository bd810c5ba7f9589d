use super::bank::{Question, QuestionBank, SelectionFilter};
use crate::frequency::{ParetoTier, TopicFrequency};
use crate::priority::TopicPriority;
use rand::distributions::WeightedIndex;
use rand::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Which bucket a question was drawn from.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SelectionMethod {
    Pareto,
    Performance,
    Random,
}

impl SelectionMethod {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pareto" => Some(SelectionMethod::Pareto),
            "performance" => Some(SelectionMethod::Performance),
            "random" => Some(SelectionMethod::Random),
            _ => None,
        }
    }
}

/// Append-only audit record for one selected question.
#[derive(Debug, Clone, Serialize)]
pub struct SelectionEntry {
    pub question_id: i64,
    pub specialty: String,
    pub method: SelectionMethod,
    pub priority_score: f64,
}

/// Result of one selection call: the shuffled question batch plus one log
/// entry per question, tagged with the bucket it actually came from.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub questions: Vec<Question>,
    pub log: Vec<SelectionEntry>,
}

#[derive(Debug, Clone, Copy)]
pub struct SelectorConfig {
    /// Share of the batch reserved for the Pareto bucket; the rest targets
    /// performance-driven review.
    pub pareto_weight: f64,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self { pareto_weight: 0.8 }
    }
}

/// Priority-weighted question selector.
///
/// Blends three buckets: a weighted draw over high-yield Pareto topics, a
/// review walk down the user's topic priorities, and a uniform backfill so a
/// session comes as close to `limit` as the bank allows.
pub struct QuestionSelector<'a> {
    bank: &'a QuestionBank,
    frequencies: &'a [TopicFrequency],
    config: SelectorConfig,
}

impl<'a> QuestionSelector<'a> {
    pub fn new(bank: &'a QuestionBank, frequencies: &'a [TopicFrequency]) -> Self {
        Self {
            bank,
            frequencies,
            config: SelectorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: SelectorConfig) -> Self {
        self.config = config;
        self
    }

    /// Select up to `limit` questions for one study session.
    ///
    /// `answered` holds question ids the user has answered before;
    /// `priorities` the user's per-topic priority rows (may be empty).
    /// Never fails on empty candidate sets: a short or empty batch is a
    /// valid outcome.
    pub fn select<R: Rng>(
        &self,
        rng: &mut R,
        limit: usize,
        filter: &SelectionFilter,
        answered: &HashSet<i64>,
        priorities: &[TopicPriority],
    ) -> Selection {
        if limit == 0 {
            return Selection::default();
        }

        let pareto_count = (limit as f64 * self.config.pareto_weight) as usize;
        let performance_count = limit - pareto_count;

        let mut selected_ids: HashSet<i64> = HashSet::new();
        let mut picks: Vec<(Question, SelectionMethod)> = Vec::with_capacity(limit);

        for q in self.pareto_bucket(rng, pareto_count, filter, answered, &mut selected_ids) {
            picks.push((q, SelectionMethod::Pareto));
        }
        for q in self.performance_bucket(
            rng,
            performance_count,
            filter,
            priorities,
            &mut selected_ids,
        ) {
            picks.push((q, SelectionMethod::Performance));
        }
        if picks.len() < limit {
            let remaining = limit - picks.len();
            for q in self.random_backfill(rng, remaining, filter, answered, &mut selected_ids) {
                picks.push((q, SelectionMethod::Random));
            }
        }

        // The caller must not be able to infer bucket origin from order
        picks.shuffle(rng);

        let score_by_topic = priority_scores(self.frequencies, priorities);
        let log = picks
            .iter()
            .map(|(q, method)| SelectionEntry {
                question_id: q.id,
                specialty: q.specialty.clone(),
                method: *method,
                priority_score: score_by_topic
                    .get(q.specialty.as_str())
                    .copied()
                    .unwrap_or(1.0),
            })
            .collect();

        Selection {
            questions: picks.into_iter().map(|(q, _)| q).collect(),
            log,
        }
    }

    /// Weighted draw with replacement over the top20/important topics, one
    /// unanswered question per drawn topic.
    fn pareto_bucket<R: Rng>(
        &self,
        rng: &mut R,
        count: usize,
        filter: &SelectionFilter,
        answered: &HashSet<i64>,
        selected_ids: &mut HashSet<i64>,
    ) -> Vec<Question> {
        if count == 0 {
            return Vec::new();
        }

        let candidates: Vec<&TopicFrequency> = self
            .frequencies
            .iter()
            .filter(|tf| {
                matches!(tf.pareto_tier, ParetoTier::Top20 | ParetoTier::Important)
                    && filter.allows_specialty(&tf.specialty)
            })
            .collect();

        if candidates.is_empty() {
            return Vec::new();
        }

        let weights: Vec<f64> = candidates.iter().map(|tf| tf.importance_score).collect();
        let dist = match WeightedIndex::new(&weights) {
            Ok(dist) => dist,
            Err(_) => return Vec::new(),
        };

        let draws = count.min(candidates.len());
        let mut questions = Vec::with_capacity(draws);
        for _ in 0..draws {
            let topic = &candidates[dist.sample(rng)].specialty;
            if let Some(q) =
                self.pick_from_topic(rng, topic, filter, Some(answered), selected_ids)
            {
                questions.push(q);
            }
        }
        questions
    }

    /// Walk the user's topics by descending final priority and take one
    /// question per topic. Previously answered questions are allowed here;
    /// this bucket targets review.
    fn performance_bucket<R: Rng>(
        &self,
        rng: &mut R,
        count: usize,
        filter: &SelectionFilter,
        priorities: &[TopicPriority],
        selected_ids: &mut HashSet<i64>,
    ) -> Vec<Question> {
        if count == 0 || priorities.is_empty() {
            return Vec::new();
        }

        let mut ordered: Vec<&TopicPriority> = priorities
            .iter()
            .filter(|p| filter.allows_specialty(&p.specialty))
            .collect();
        // Stable sort keeps encounter order for equal priorities
        ordered.sort_by(|a, b| {
            b.final_priority
                .partial_cmp(&a.final_priority)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut questions = Vec::new();
        for priority in ordered {
            if questions.len() >= count {
                break;
            }
            if let Some(q) =
                self.pick_from_topic(rng, &priority.specialty, filter, None, selected_ids)
            {
                questions.push(q);
            }
        }
        questions
    }

    /// Uniform draw over the remaining unanswered bank to fill the quota.
    fn random_backfill<R: Rng>(
        &self,
        rng: &mut R,
        count: usize,
        filter: &SelectionFilter,
        answered: &HashSet<i64>,
        selected_ids: &mut HashSet<i64>,
    ) -> Vec<Question> {
        let pool: Vec<&Question> = self
            .bank
            .matching(filter)
            .filter(|q| !answered.contains(&q.id) && !selected_ids.contains(&q.id))
            .collect();

        let chosen: Vec<Question> = pool
            .choose_multiple(rng, count)
            .map(|q| (*q).clone())
            .collect();
        for q in &chosen {
            selected_ids.insert(q.id);
        }
        chosen
    }

    /// One uniform pick from a topic's pool, excluding ids already selected
    /// in this call and, when given, the user's answered set.
    fn pick_from_topic<R: Rng>(
        &self,
        rng: &mut R,
        specialty: &str,
        filter: &SelectionFilter,
        answered: Option<&HashSet<i64>>,
        selected_ids: &mut HashSet<i64>,
    ) -> Option<Question> {
        let pool: Vec<&Question> = self
            .bank
            .topic_pool(specialty, filter)
            .filter(|q| !selected_ids.contains(&q.id))
            .filter(|q| answered.map_or(true, |a| !a.contains(&q.id)))
            .collect();

        let question = pool.choose(rng).map(|q| (*q).clone())?;
        selected_ids.insert(question.id);
        Some(question)
    }
}

/// Final priority per topic, falling back to the topic's base importance
/// when the user has no row yet.
fn priority_scores<'a>(
    frequencies: &'a [TopicFrequency],
    priorities: &'a [TopicPriority],
) -> HashMap<&'a str, f64> {
    let mut scores: HashMap<&str, f64> = frequencies
        .iter()
        .map(|tf| (tf.specialty.as_str(), tf.importance_score))
        .collect();
    for p in priorities {
        scores.insert(p.specialty.as_str(), p.final_priority);
    }
    scores
}
