//! Collaborators of the batch coordinator.
//!
//! The round coordinator (Ark server), the tree signing session and the
//! introspector are reached through these traits so the state machine can be
//! driven by HTTP clients in production and by mocks in tests.

use crate::error::{ArkError, ArkResult};
use crate::tree::{TxTree, TxTreeNode};
use async_trait::async_trait;
use bitcoin::secp256k1::{PublicKey, XOnlyPublicKey};
use bitcoin::taproot::TapLeafHash;
use bitcoin::{Address, Amount, ScriptBuf, Txid};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Tree txid -> this signer's public nonce
pub type TreeNonces = BTreeMap<Txid, String>;

/// Tree txid -> this signer's partial signature
pub type TreePartialSigs = BTreeMap<Txid, String>;

/// Coordinator parameters needed to build sweep leaves and forfeits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    /// Hex public key (x-only or compressed)
    pub forfeit_pubkey: String,
    pub forfeit_address: String,
}

impl ServerInfo {
    pub fn forfeit_key(&self) -> ArkResult<XOnlyPublicKey> {
        parse_x_only(&self.forfeit_pubkey)
    }

    /// Output script of the forfeit address
    pub fn forfeit_script(&self) -> ArkResult<ScriptBuf> {
        let address = Address::from_str(&self.forfeit_address).map_err(|e| {
            ArkError::transaction(format!("invalid forfeit address {}: {}", self.forfeit_address, e))
        })?;
        Ok(address.assume_checked().script_pubkey())
    }
}

/// Parse a hex public key given as 32-byte x-only or 33-byte compressed
pub fn parse_x_only(hex_key: &str) -> ArkResult<XOnlyPublicKey> {
    let bytes = hex::decode(hex_key)
        .map_err(|e| ArkError::crypto(format!("invalid public key hex {}: {}", hex_key, e)))?;
    match bytes.len() {
        32 => Ok(XOnlyPublicKey::from_slice(&bytes)?),
        33 => Ok(PublicKey::from_slice(&bytes)?.x_only_public_key().0),
        len => Err(ArkError::crypto(format!(
            "public key must be 32 or 33 bytes, got {}",
            len
        ))),
    }
}

/// Round coordinator RPCs
#[async_trait]
pub trait ArkProvider: Send + Sync {
    async fn get_info(&self) -> ArkResult<ServerInfo>;

    async fn confirm_registration(&self, intent_id: &str) -> ArkResult<()>;

    async fn submit_tree_nonces(
        &self,
        batch_id: &str,
        pubkey: &str,
        nonces: &TreeNonces,
    ) -> ArkResult<()>;

    async fn submit_tree_signatures(
        &self,
        batch_id: &str,
        pubkey: &str,
        signatures: &TreePartialSigs,
    ) -> ArkResult<()>;

    /// Complete the round with co-signed forfeits and, if the wallet boarded,
    /// the signed commitment transaction
    async fn submit_signed_forfeit_txs(
        &self,
        forfeits: &[String],
        commitment_tx: Option<&str>,
    ) -> ArkResult<()>;
}

/// MuSig2 signing session over the VTXO tree
#[async_trait]
pub trait TreeSignerSession: Send + Sync {
    async fn init(&self, tree: &TxTree, sweep_leaf_hash: TapLeafHash, amount: Amount) -> ArkResult<()>;

    /// Hex public key this session signs with
    async fn get_public_key(&self) -> ArkResult<String>;

    async fn get_nonces(&self) -> ArkResult<TreeNonces>;

    /// Feed the cosigners' nonces for `txid`; returns `true` once every tree
    /// transaction has all nonces
    async fn aggregated_nonces(&self, txid: Txid, nonces: &BTreeMap<String, String>) -> ArkResult<bool>;

    async fn sign(&self) -> ArkResult<TreePartialSigs>;
}

/// Request co-signatures from the introspector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizationRequest {
    pub proof: String,
    pub message: String,
    /// Base64 forfeit PSBTs signed by the wallet
    pub forfeits: Vec<String>,
    pub connector_tree: Option<Vec<TxTreeNode>>,
    /// Base64 commitment PSBT, only when the wallet signed boarding inputs
    pub commitment_tx: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizationResponse {
    #[serde(default)]
    pub signed_forfeits: Vec<String>,
    #[serde(default)]
    pub signed_commitment_tx: Option<String>,
}

/// Introspector co-signer
#[async_trait]
pub trait IntrospectorProvider: Send + Sync {
    async fn submit_finalization(&self, request: &FinalizationRequest) -> ArkResult<FinalizationResponse>;
}
