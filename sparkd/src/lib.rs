//! Library surface for `sparkd`, split out from `main.rs` so integration
//! tests can drive the axum router in-process via `tower::ServiceExt`
//! without binding a real socket.

pub mod bridge_task;
pub mod cli;
pub mod http;
pub mod state;
