//! # Batch Settlement
//!
//! Client side of the coordinator-driven settlement round: registration check,
//! MuSig2 tree signing, and finalization with boarding signatures and forfeits.

pub mod coordinator;
pub mod events;
pub mod forfeit;
pub mod provider;
pub mod session;

#[cfg(test)]
mod tests;

pub use coordinator::{BatchSettlement, BatchTrees, Step};
pub use events::BatchEvent;
pub use provider::{
    ArkProvider, FinalizationRequest, FinalizationResponse, IntrospectorProvider, ServerInfo,
    TreeNonces, TreePartialSigs, TreeSignerSession,
};
pub use session::{BatchSession, Intent, Phase, WalletInput};
