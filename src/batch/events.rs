//! Events broadcast by the round coordinator.
//!
//! JSON field names are camelCase; [`BatchEvent`] is tagged by a `type` field.

use crate::tree::TxTreeNode;
use bitcoin::Txid;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Tree-tx chunk belongs to the VTXO tree
pub const VTXO_TREE_INDEX: u32 = 0;
/// Tree-tx chunk belongs to the connector tree
pub const CONNECTOR_TREE_INDEX: u32 = 1;

/// A new round started; lists the hashes of the admitted intents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchStartedEvent {
    pub id: String,
    /// Hex SHA-256 of each admitted intent id
    pub intent_id_hashes: Vec<String>,
    /// Relative expiry of batch outputs (blocks if < 512, else seconds)
    pub batch_expiry: u64,
}

/// Tree cosigners were selected; the unsigned commitment transaction is final
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeSigningStartedEvent {
    pub id: String,
    /// Base64 PSBT
    pub unsigned_commitment_tx: String,
    /// Hex public keys (x-only or compressed)
    pub cosigners_pubkeys: Vec<String>,
}

/// Nonces of the cosigners for one tree transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeNoncesEvent {
    pub id: String,
    pub txid: Txid,
    /// Cosigner public key -> public nonce
    pub nonces: BTreeMap<String, String>,
}

/// The commitment transaction is ready for forfeits and boarding signatures
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchFinalizationEvent {
    pub id: String,
    /// Base64 PSBT
    pub commitment_tx: String,
}

/// One node of the VTXO or connector tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeTxEvent {
    pub id: String,
    #[serde(default)]
    pub topic: Vec<String>,
    pub batch_index: u32,
    pub node: TxTreeNode,
}

impl TreeTxEvent {
    pub fn is_connector(&self) -> bool {
        self.batch_index == CONNECTOR_TREE_INDEX
    }
}

/// The coordinator aborted the round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchFailedEvent {
    pub id: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BatchEvent {
    BatchStarted(BatchStartedEvent),
    TreeSigningStarted(TreeSigningStartedEvent),
    TreeNonces(TreeNoncesEvent),
    TreeTx(TreeTxEvent),
    BatchFinalization(BatchFinalizationEvent),
    BatchFailed(BatchFailedEvent),
}

impl BatchEvent {
    pub fn batch_id(&self) -> &str {
        match self {
            BatchEvent::BatchStarted(e) => &e.id,
            BatchEvent::TreeSigningStarted(e) => &e.id,
            BatchEvent::TreeNonces(e) => &e.id,
            BatchEvent::TreeTx(e) => &e.id,
            BatchEvent::BatchFinalization(e) => &e.id,
            BatchEvent::BatchFailed(e) => &e.id,
        }
    }
}
