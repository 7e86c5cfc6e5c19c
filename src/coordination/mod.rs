//! Swap coordination across chains
//!
//! This module provides:
//! - Payout planning from a verified swap
//! - The register, verify, swap and stable passes of the pipeline
//! - Judging of sign requests on oracle nodes
//! - The engine running all workers

pub mod accept;
pub mod engine;
pub mod payout;
pub mod pipeline;

pub use accept::AcceptVerifier;
pub use engine::{CoordinationEngine, Reloader, WorkerIntervals};
pub use payout::PayoutPlanner;
pub use pipeline::{failure_status, PassStats, SwapPipeline};
