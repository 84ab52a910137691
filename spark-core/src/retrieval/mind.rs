//! Mind client (SPEC_FULL.md's "Mind" supplement): an optional remote
//! server-ranked retrieval source. The wire protocol is deliberately left
//! unspecified (an Open Question resolved as "trait boundary only" in
//! DESIGN.md) — callers configure a concrete implementation out of band;
//! when none is configured `NullMind` keeps the retrieval pipeline correct
//! and side-effect free.

use async_trait::async_trait;

use crate::error::Result;

/// One ranked hit returned by a Mind server.
#[derive(Debug, Clone)]
pub struct MindHit {
    pub id: String,
    pub text: String,
    pub score: f64,
}

#[async_trait]
pub trait MindClient: Send + Sync {
    /// Whether a Mind endpoint is configured at all. The retrieval layer
    /// skips the network round trip entirely when this is `false`.
    fn is_configured(&self) -> bool;

    /// Fetch up to `k` server-ranked hits for `query`. Callers wrap this in
    /// a timeout (spec.md §4.5 step 4: Mind is a best-effort source, never
    /// a hard dependency of the hot path).
    async fn top_k(&self, query: &str, k: usize) -> Result<Vec<MindHit>>;
}

/// The default when no Mind endpoint is configured.
pub struct NullMind;

#[async_trait]
impl MindClient for NullMind {
    fn is_configured(&self) -> bool {
        false
    }

    async fn top_k(&self, _query: &str, _k: usize) -> Result<Vec<MindHit>> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_mind_reports_unconfigured_and_returns_nothing() {
        let mind = NullMind;
        assert!(!mind.is_configured());
        assert!(mind.top_k("anything", 5).await.unwrap().is_empty());
    }
}
