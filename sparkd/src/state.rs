//! Shared daemon state (spec.md §5 "Concurrency & Resource Model"): the
//! insight store and distillation store are `Arc`-shared between the
//! ingest hot path and the bridge-cycle worker exactly as the resource
//! model prescribes ("the advisory engine (hot path) only reads insights
//! and takes a short lock for retrieval snapshots"); the advisory engine
//! itself sits behind a `tokio::sync::RwLock` so tuneables hot-reload
//! (write lock, once per bridge cycle) never blocks concurrent readers
//! for longer than the swap itself.

use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use spark_core::advisory::{default_baseline, load_baseline, AdvisoryEngine};
use spark_core::bridge::{BridgeCycle, BridgeStats};
use spark_core::distillation::DistillationStore;
use spark_core::error::Result;
use spark_core::insight_store::InsightStore;
use spark_core::meta_ralph::MetaRalphConfig;
use spark_core::queue::EventQueue;
use spark_core::retrieval::BaselineAdvice;
use spark_core::state_dir::{StateDir, StateDirLock};
use spark_core::RuntimeFlags;

pub struct AppState {
    pub state_dir: StateDir,
    pub queue: Arc<EventQueue>,
    pub insight_store: Arc<InsightStore>,
    pub distillations: Arc<DistillationStore>,
    pub engine: Arc<tokio::sync::RwLock<AdvisoryEngine>>,
    pub baseline: Vec<BaselineAdvice>,
    pub token: Option<String>,
    pub flags: RuntimeFlags,
    pub last_bridge_stats: Mutex<BridgeStats>,
    /// True while a bridge cycle is in flight, so a timer tick that fires
    /// before the previous cycle finished is coalesced into a no-op
    /// instead of running two cycles concurrently (spec.md §4.3
    /// "Bridge cycles must not overlap").
    pub bridge_in_flight: AtomicBool,
    _lock: StateDirLock,
}

impl AppState {
    pub fn open(state_dir: StateDir, token: Option<String>) -> Result<Self> {
        let lock = state_dir.acquire_lock()?;

        let queue = Arc::new(EventQueue::open(state_dir.events_queue())?);
        let insight_store = Arc::new(InsightStore::open(
            state_dir.cognitive_insights(),
            state_dir.insight_quarantine(),
            state_dir.roast_history(),
            MetaRalphConfig::default(),
        )?);
        let distillations = Arc::new(DistillationStore::open(state_dir.distillations())?);

        let baseline = load_baseline(state_dir.baseline_advice()).unwrap_or_else(|_| default_baseline());

        let semantic = Arc::new(spark_core::retrieval::NullIndex);
        let mind = Arc::new(spark_core::retrieval::NullMind);
        let retriever = spark_core::retrieval::Retriever::new(semantic, mind);
        let synthesizer = spark_core::advisory::Synthesizer::new(Arc::new(NullAdviceWriter));
        let engine = AdvisoryEngine::open(&state_dir, retriever, synthesizer)?;

        Ok(Self {
            queue,
            insight_store,
            distillations,
            engine: Arc::new(tokio::sync::RwLock::new(engine)),
            baseline,
            token,
            flags: RuntimeFlags::from_env(),
            last_bridge_stats: Mutex::new(BridgeStats::default()),
            bridge_in_flight: AtomicBool::new(false),
            _lock: lock,
            state_dir,
        })
    }

    pub fn open_bridge_cycle(&self) -> Result<BridgeCycle> {
        BridgeCycle::open(
            self.state_dir.clone(),
            self.queue.clone(),
            self.insight_store.clone(),
            self.distillations.clone(),
        )
    }
}

/// No selective-AI provider ships with the core (spec.md §1 non-goal:
/// synthesis is templated-or-delegated, never hosted here); synthesis
/// always falls back to the programmatic path.
struct NullAdviceWriter;

#[async_trait::async_trait]
impl spark_core::advisory::synthesis::AdviceWriter for NullAdviceWriter {
    async fn write(
        &self,
        _context: &spark_core::advisory::AdvisoryContext,
        _candidates: &[spark_core::retrieval::Candidate],
    ) -> Result<String> {
        Err(spark_core::error::Error::internal("no advice writer configured"))
    }
}

pub fn record_bridge_stats(state: &AppState, stats: BridgeStats) {
    if let Ok(mut guard) = state.last_bridge_stats.lock() {
        *guard = stats;
    }
}
