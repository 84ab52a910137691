//! Adapters (spec.md §4.1/§4.3 step 1 supplement, C1): the ingest-side
//! wire contract (`IngestEvent`) and the output-side frontend contract
//! (`FrontendAdapter` + the shared marker-bounded writer). Implementing
//! the tailer adapters themselves (JSONL watchers that POST to `/ingest`)
//! is out of scope (spec.md §1) — only the contracts they meet are.

pub mod claude_code;
pub mod common;
pub mod cursor;
pub mod ingest;
pub mod openclaw;

pub use common::{write_marked_section, FrontendAdapter};
pub use ingest::{validate_ingest_event, IngestEvent, MAX_PAYLOAD_BYTES};
