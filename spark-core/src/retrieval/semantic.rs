//! Semantic index (spec.md §4.5 step 2, "semantic retrieval"). The trait
//! boundary lets the advisory engine stay agnostic to what produces
//! embeddings; `NullIndex` is the always-disabled default and `FlatIndex`
//! is a small linear cosine-similarity scan suitable for the hundreds-to-
//! low-thousands corpus size SPEC_FULL.md calls out — no ANN structure is
//! warranted at that scale.

use std::sync::RwLock;

/// One ranked hit from a semantic search.
#[derive(Debug, Clone)]
pub struct SemanticHit {
    pub id: String,
    pub text: String,
    pub similarity: f32,
}

pub trait SemanticIndex: Send + Sync {
    fn is_empty(&self) -> bool;
    fn search(&self, query: &str, top_k: usize) -> Vec<SemanticHit>;
}

/// Disabled by default: `is_empty()` is always `true`, so the retriever
/// skips the semantic branch entirely.
pub struct NullIndex;

impl SemanticIndex for NullIndex {
    fn is_empty(&self) -> bool {
        true
    }

    fn search(&self, _query: &str, _top_k: usize) -> Vec<SemanticHit> {
        Vec::new()
    }
}

struct Entry {
    id: String,
    text: String,
    embedding: Vec<f32>,
}

/// A linear-scan flat index. Embedding generation is out of scope here
/// (callers supply pre-computed vectors, e.g. from an external embedding
/// service); this type owns only the storage and cosine search.
pub struct FlatIndex {
    entries: RwLock<Vec<Entry>>,
}

impl Default for FlatIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl FlatIndex {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    pub fn insert(&self, id: impl Into<String>, text: impl Into<String>, embedding: Vec<f32>) {
        let mut entries = self.entries.write().expect("flat index lock poisoned");
        entries.push(Entry {
            id: id.into(),
            text: text.into(),
            embedding,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.read().expect("flat index lock poisoned").len()
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

impl SemanticIndex for FlatIndex {
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Embeds `query` is the caller's job in a real deployment; this flat
    /// index only ever sees pre-embedded queries through `search_embedding`.
    /// The plain string `search` here treats `query` as already being a
    /// cache key into nothing — kept for trait-object symmetry with
    /// `NullIndex` but real callers should prefer `search_embedding`.
    fn search(&self, _query: &str, _top_k: usize) -> Vec<SemanticHit> {
        Vec::new()
    }
}

impl FlatIndex {
    pub fn search_embedding(&self, query: &[f32], top_k: usize) -> Vec<SemanticHit> {
        let entries = self.entries.read().expect("flat index lock poisoned");
        let mut scored: Vec<SemanticHit> = entries
            .iter()
            .map(|e| SemanticHit {
                id: e.id.clone(),
                text: e.text.clone(),
                similarity: cosine(query, &e.embedding),
            })
            .collect();
        scored.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        scored
    }
}
