//! BM25 lexical scoring (spec.md §4.5 step 1), the concrete algorithm
//! behind "BM25-like scoring over insight text using query tokens". Uses
//! the conventional defaults (k1=1.2, b=0.75) over a whitespace/punctuation
//! tokenizer.

use std::collections::HashMap;

use crate::advisory::context::tokenize;
use crate::distillation::Distillation;
use crate::insight::Insight;

use super::{AdviceSource, Candidate};

const K1: f64 = 1.2;
const B: f64 = 0.75;

/// A tiny in-memory BM25 index over a fixed corpus, built fresh per query
/// since the insight store is small (hundreds to low thousands of rows,
/// per SPEC_FULL's semantic-index sizing note) and retrieval runs on the
/// advisory hot path where staleness would be worse than a cheap rebuild.
pub struct Bm25Index {
    doc_tokens: Vec<Vec<String>>,
    doc_freq: HashMap<String, usize>,
    avg_len: f64,
}

impl Bm25Index {
    pub fn build(documents: &[&str]) -> Self {
        let doc_tokens: Vec<Vec<String>> = documents.iter().map(|d| tokenize(d)).collect();
        let mut doc_freq: HashMap<String, usize> = HashMap::new();
        for tokens in &doc_tokens {
            let unique: std::collections::HashSet<&String> = tokens.iter().collect();
            for term in unique {
                *doc_freq.entry(term.clone()).or_insert(0) += 1;
            }
        }
        let total_len: usize = doc_tokens.iter().map(|t| t.len()).sum();
        let avg_len = if doc_tokens.is_empty() {
            0.0
        } else {
            total_len as f64 / doc_tokens.len() as f64
        };
        Self {
            doc_tokens,
            doc_freq,
            avg_len,
        }
    }

    fn idf(&self, term: &str) -> f64 {
        let n = self.doc_tokens.len() as f64;
        let df = *self.doc_freq.get(term).unwrap_or(&0) as f64;
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }

    /// BM25 score of the document at `idx` against `query_tokens`.
    pub fn score(&self, idx: usize, query_tokens: &[String]) -> f64 {
        let Some(doc) = self.doc_tokens.get(idx) else {
            return 0.0;
        };
        if doc.is_empty() || self.avg_len == 0.0 {
            return 0.0;
        }
        let mut term_freq: HashMap<&str, usize> = HashMap::new();
        for t in doc {
            *term_freq.entry(t.as_str()).or_insert(0) += 1;
        }
        let doc_len = doc.len() as f64;
        let mut score = 0.0;
        for term in query_tokens {
            let tf = *term_freq.get(term.as_str()).unwrap_or(&0) as f64;
            if tf == 0.0 {
                continue;
            }
            let idf = self.idf(term);
            let numerator = tf * (K1 + 1.0);
            let denominator = tf + K1 * (1.0 - B + B * doc_len / self.avg_len);
            score += idf * numerator / denominator;
        }
        score
    }
}

/// Score a set of insights against query tokens, tagging results with
/// `source` (callers use `AdviceSource::Cognitive` or `::Chip`).
pub fn score_insights(
    query_tokens: &[String],
    insights: &[Insight],
    source: AdviceSource,
) -> Vec<Candidate> {
    let texts: Vec<&str> = insights.iter().map(|i| i.text.as_str()).collect();
    let index = Bm25Index::build(&texts);
    insights
        .iter()
        .enumerate()
        .filter_map(|(idx, insight)| {
            let score = index.score(idx, query_tokens);
            if score <= 0.0 {
                return None;
            }
            Some(Candidate {
                source,
                key: Some(insight.key.clone()),
                text: insight.text.clone(),
                score,
                rationale: "lexical match".into(),
                reliability: insight.reliability,
            })
        })
        .collect()
}

pub fn score_distillations(
    query_tokens: &[String],
    distillations: &[Distillation],
) -> Vec<Candidate> {
    let texts: Vec<&str> = distillations.iter().map(|d| d.statement.as_str()).collect();
    let index = Bm25Index::build(&texts);
    distillations
        .iter()
        .enumerate()
        .filter_map(|(idx, d)| {
            let score = index.score(idx, query_tokens);
            if score <= 0.0 {
                return None;
            }
            Some(Candidate {
                source: AdviceSource::Eidos,
                key: Some(d.id.clone()),
                text: d.statement.clone(),
                score,
                rationale: format!("distillation:{:?}", d.kind),
                reliability: d.help_rate().unwrap_or(0.5),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_term_match_scores_higher_than_unrelated_doc() {
        let docs = ["always run pytest before committing", "prefer tabs over spaces"];
        let index = Bm25Index::build(&docs);
        let query = vec!["pytest".to_string()];
        assert!(index.score(0, &query) > index.score(1, &query));
    }

    #[test]
    fn empty_query_scores_zero() {
        let docs = ["some insight text"];
        let index = Bm25Index::build(&docs);
        assert_eq!(index.score(0, &[]), 0.0);
    }

    #[test]
    fn rarer_terms_score_higher_due_to_idf() {
        let docs = [
            "use snake_case naming",
            "use snake_case naming",
            "use the unusual zephyr pattern",
        ];
        let index = Bm25Index::build(&docs);
        let common_query = vec!["snake_case".to_string()];
        let rare_query = vec!["zephyr".to_string()];
        assert!(index.score(2, &rare_query) > index.score(0, &common_query));
    }
}
