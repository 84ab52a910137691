//! # spark-core
//!
//! The pre-tool advisory engine and learning loop for the Spark coding-agent
//! daemon. This crate contains the hot-path decision logic described in
//! spec.md §2 (C1-C7); `sparkd` is a thin binary wrapping it with an HTTP
//! surface and a timer-driven bridge cycle.
//!
//! Data flows left to right: adapters POST events into the queue; the
//! bridge cycle drains the queue into the insight store through the
//! Meta-Ralph write gate; the retrieval layer and advisory engine read that
//! store (plus distillations and chips) to answer pre-tool advisory
//! requests; the outcome loop closes the feedback cycle back into
//! reliability and source boosts.

pub mod adapters;
pub mod advisory;
pub mod bridge;
pub mod chips;
pub mod config;
pub mod distillation;
pub mod era;
pub mod error;
pub mod event;
pub mod heartbeat;
pub mod insight;
pub mod insight_store;
pub mod meta_ralph;
pub mod outcome;
pub mod queue;
pub mod retrieval;
pub mod state_dir;

pub use config::{RuntimeFlags, Tuneables, TuneablesWatcher};
pub use error::{Error, Result};
pub use event::{Event, EventKind, QueuedEvent};
pub use insight::{Insight, InsightCandidate, InsightCategory};
pub use insight_store::InsightStore;
pub use queue::EventQueue;
pub use state_dir::StateDir;
