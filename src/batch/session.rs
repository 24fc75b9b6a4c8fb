//! Per-round session state and the wallet data a round operates on.

use crate::error::{ArkError, ArkResult};
use crate::vtxo_script::VtxoScriptTree;
use bitcoin::taproot::{ControlBlock, TapLeafHash};
use bitcoin::{Amount, OutPoint, ScriptBuf, TxOut};
use std::fmt;

/// Round phase. Transitions only move forward; `Done` and `Skipped` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Idle,
    Registered,
    TreeSigning,
    NoncesPending,
    Signed,
    Finalizing,
    Done,
    Skipped,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Done | Phase::Skipped)
    }

    fn rank(self) -> u8 {
        match self {
            Phase::Idle => 0,
            Phase::Registered => 1,
            Phase::TreeSigning => 2,
            Phase::NoncesPending => 3,
            Phase::Signed => 4,
            Phase::Finalizing => 5,
            Phase::Done | Phase::Skipped => 6,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Registered => "registered",
            Phase::TreeSigning => "tree-signing",
            Phase::NoncesPending => "nonces-pending",
            Phase::Signed => "signed",
            Phase::Finalizing => "finalizing",
            Phase::Done => "done",
            Phase::Skipped => "skipped",
        };
        f.write_str(name)
    }
}

/// Mutable state of one round, owned by a single coordinator.
///
/// `batch_id` and `sweep_leaf_hash` are written when the round starts and only
/// read afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSession {
    batch_id: Option<String>,
    sweep_leaf_hash: Option<TapLeafHash>,
    phase: Phase,
}

impl Default for BatchSession {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchSession {
    pub fn new() -> Self {
        Self {
            batch_id: None,
            sweep_leaf_hash: None,
            phase: Phase::Idle,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn batch_id(&self) -> Option<&str> {
        self.batch_id.as_deref()
    }

    pub fn sweep_leaf_hash(&self) -> Option<TapLeafHash> {
        self.sweep_leaf_hash
    }

    /// Record the round identity. Only allowed once, before registration.
    pub(crate) fn start(&mut self, batch_id: String, sweep_leaf_hash: TapLeafHash) -> ArkResult<()> {
        self.require(&[Phase::Idle], Phase::Registered)?;
        self.batch_id = Some(batch_id);
        self.sweep_leaf_hash = Some(sweep_leaf_hash);
        Ok(())
    }

    /// Fail with `InvalidStateTransition` unless the current phase is one of `allowed`
    pub(crate) fn require(&self, allowed: &[Phase], requested: Phase) -> ArkResult<()> {
        if allowed.contains(&self.phase) {
            Ok(())
        } else {
            Err(self.invalid(requested))
        }
    }

    /// Move to `next`. Backward moves and moves out of a terminal phase are rejected;
    /// `NoncesPending` may repeat.
    pub(crate) fn advance(&mut self, next: Phase) -> ArkResult<()> {
        let repeat = self.phase == next && next == Phase::NoncesPending;
        if self.phase.is_terminal() || (next.rank() <= self.phase.rank() && !repeat) {
            return Err(self.invalid(next));
        }
        self.phase = next;
        Ok(())
    }

    fn invalid(&self, requested: Phase) -> ArkError {
        ArkError::InvalidStateTransition {
            current: self.phase.to_string(),
            requested: requested.to_string(),
        }
    }
}

/// The wallet's registration for a round
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Intent {
    pub id: String,
    /// Ownership proof (signed PSBT), forwarded verbatim to the introspector
    pub proof: String,
    pub message: String,
}

/// A wallet coin taking part in a round.
///
/// Whether it is a boarding input or a VTXO being settled is decided at
/// finalization, by looking for its outpoint in the commitment transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletInput {
    pub outpoint: OutPoint,
    pub prevout: TxOut,
    pub leaf_script: ScriptBuf,
    pub control_block: ControlBlock,
    pub embedded_script: Vec<u8>,
}

impl WalletInput {
    /// Input spending Arkade leaf `leaf_index` of `tree`
    pub fn from_tree(
        outpoint: OutPoint,
        amount: Amount,
        tree: &VtxoScriptTree,
        leaf_index: usize,
    ) -> ArkResult<Self> {
        let embedded_script = tree
            .embedded_script(leaf_index)
            .ok_or_else(|| ArkError::missing(format!("embedded script for leaf {}", leaf_index)))?
            .to_vec();
        let (control_block, leaf_script) = tree.leaf_proof(leaf_index)?;

        Ok(Self {
            outpoint,
            prevout: TxOut {
                value: amount,
                script_pubkey: tree.script_pubkey(),
            },
            leaf_script,
            control_block,
            embedded_script,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::hashes::Hash;

    #[test]
    fn test_forward_transitions() {
        let mut session = BatchSession::new();
        session
            .start("batch-1".to_string(), TapLeafHash::all_zeros())
            .unwrap();
        for phase in [
            Phase::Registered,
            Phase::TreeSigning,
            Phase::NoncesPending,
            Phase::NoncesPending,
            Phase::Signed,
            Phase::Finalizing,
            Phase::Done,
        ] {
            session.advance(phase).unwrap();
        }
        assert!(session.phase().is_terminal());
        assert_eq!(session.batch_id(), Some("batch-1"));
    }

    #[test]
    fn test_backward_and_terminal_rejected() {
        let mut session = BatchSession::new();
        session.advance(Phase::Registered).unwrap();
        session.advance(Phase::TreeSigning).unwrap();
        assert!(matches!(
            session.advance(Phase::Registered),
            Err(ArkError::InvalidStateTransition { .. })
        ));
        assert!(session.advance(Phase::TreeSigning).is_err());

        session.advance(Phase::Skipped).unwrap();
        assert!(session.advance(Phase::Done).is_err());
        assert_eq!(session.phase(), Phase::Skipped);
    }

    #[test]
    fn test_require_reports_phases() {
        let session = BatchSession::new();
        let err = session.require(&[Phase::Signed], Phase::Finalizing).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid batch phase transition from idle to finalizing"
        );
    }
}
