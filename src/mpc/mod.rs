//! Threshold signing through an external MPC network
//!
//! This module provides:
//! - Node API client and wire types
//! - Signed request envelopes
//! - Signer nodes and signing groups
//! - The coordinator that drives sign and accept flows

pub mod coordinator;
pub mod envelope;
pub mod node;
pub mod rpc;

pub use coordinator::{AcceptDecision, AcceptRound, MpcCoordinator, SignOutcome};
pub use node::{SignerNode, SigningGroup};
pub use rpc::{HttpMpcClient, MpcRpc, SignInfoData};
