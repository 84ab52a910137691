//! The advisory engine and gate (spec.md §4.6, C6): the hot path that turns
//! a `pre_tool` event into an emit-or-suppress decision under a strict
//! latency budget.
//!
//! Submodules mirror the pipeline order in spec.md: `context` builds the
//! query context (tool/phase/intent), `packet` caches fused candidates by
//! fingerprint, `synthesis` turns candidates into advisory text, `gate`
//! applies suppression policy, `dedupe` and `ledger` back the gate's
//! persistent state, and `engine` wires the whole pipeline together behind
//! a deadline.

pub mod baseline;
pub mod context;
pub mod dedupe;
pub mod engine;
pub mod gate;
pub mod ledger;
pub mod packet;
pub mod synthesis;

pub use baseline::{default_baseline, load_baseline};
pub use context::{AdvisoryContext, Phase};
pub use engine::{AdvisoryEngine, AdvisoryOutcome, AdvisoryRequest, SuppressReason};
pub use gate::{AdvisoryGate, GateVerdict};
pub use ledger::{DecisionLedger, LedgerRow};
pub use packet::{Packet, PacketCache};
pub use synthesis::{AdviceItem, Synthesizer};
