//! # Batch Settlement
//!
//! Client side of one settlement round. The coordinator broadcasts events; each
//! event is fed to the matching phase handler, which talks to the collaborators
//! and advances the [`BatchSession`].
//!
//! ```text
//! Idle --BatchStarted--> Registered --TreeSigningStarted--> TreeSigning
//!   --TreeNonces*--> NoncesPending --TreeNonces--> Signed
//!   --BatchFinalization--> Finalizing --> Done
//! ```
//!
//! A wallet whose intent was not admitted, or that was not chosen as a tree
//! cosigner, moves to `Skipped`. Any error aborts the round; the wallet joins the
//! next one with a fresh [`BatchSettlement`].

use super::events::{
    BatchEvent, BatchFinalizationEvent, BatchStartedEvent, TreeNoncesEvent, TreeSigningStartedEvent,
    TreeTxEvent,
};
use super::forfeit::{build_forfeit, connectors};
use super::provider::{
    parse_x_only, ArkProvider, FinalizationRequest, IntrospectorProvider, ServerInfo,
    TreeSignerSession,
};
use super::session::{BatchSession, Intent, Phase, WalletInput};
use crate::error::{ArkError, ArkResult};
use crate::identity::Identity;
use crate::psbt_ext::{input_mut, set_embedded_script, set_tap_leaf_script};
use crate::tapscript::sweep_leaf;
use crate::tree::{TxTree, TxTreeNode};
use bitcoin::hashes::{sha256, Hash};
use bitcoin::taproot::{LeafVersion, TapLeafHash};
use bitcoin::{OutPoint, Psbt};
use log::{debug, info, warn};
use std::str::FromStr;
use std::sync::Arc;

/// Outcome of handling one event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Round continues, wait for the next event
    Continue,
    /// Wallet is not part of this round
    Skipped,
    /// Round completed
    Done,
    /// Event did not concern this round
    Ignored,
}

/// Tree nodes streamed by the coordinator before the signing and finalization events
#[derive(Debug, Clone, Default)]
pub struct BatchTrees {
    vtxo_nodes: Vec<TxTreeNode>,
    connector_nodes: Vec<TxTreeNode>,
}

impl BatchTrees {
    pub fn push(&mut self, event: &TreeTxEvent) {
        if event.is_connector() {
            self.connector_nodes.push(event.node.clone());
        } else {
            self.vtxo_nodes.push(event.node.clone());
        }
    }

    pub fn vtxo_tree(&self) -> ArkResult<Option<TxTree>> {
        Self::assemble(&self.vtxo_nodes)
    }

    pub fn connector_tree(&self) -> ArkResult<Option<TxTree>> {
        Self::assemble(&self.connector_nodes)
    }

    fn assemble(nodes: &[TxTreeNode]) -> ArkResult<Option<TxTree>> {
        if nodes.is_empty() {
            return Ok(None);
        }
        TxTree::from_nodes(nodes.to_vec()).map(Some)
    }
}

/// Drives one wallet through one settlement round
pub struct BatchSettlement {
    intent: Intent,
    inputs: Vec<WalletInput>,
    identity: Arc<dyn Identity>,
    signer: Arc<dyn TreeSignerSession>,
    ark: Arc<dyn ArkProvider>,
    introspector: Arc<dyn IntrospectorProvider>,
    session: BatchSession,
    server_info: Option<ServerInfo>,
    trees: BatchTrees,
}

impl BatchSettlement {
    pub fn new(
        intent: Intent,
        inputs: Vec<WalletInput>,
        identity: Arc<dyn Identity>,
        signer: Arc<dyn TreeSignerSession>,
        ark: Arc<dyn ArkProvider>,
        introspector: Arc<dyn IntrospectorProvider>,
    ) -> Self {
        Self {
            intent,
            inputs,
            identity,
            signer,
            ark,
            introspector,
            session: BatchSession::new(),
            server_info: None,
            trees: BatchTrees::default(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.session.phase()
    }

    pub fn session(&self) -> &BatchSession {
        &self.session
    }

    fn batch_id(&self) -> ArkResult<String> {
        self.session
            .batch_id()
            .map(str::to_string)
            .ok_or_else(|| ArkError::missing("batch id"))
    }

    /// Route a coordinator event to its phase handler
    pub async fn handle_event(&mut self, event: &BatchEvent) -> ArkResult<Step> {
        if let BatchEvent::BatchStarted(started) = event {
            if self.session.phase() != Phase::Idle {
                warn!("Ignoring batch {} start, already in {}", started.id, self.phase());
                return Ok(Step::Ignored);
            }
            let skipped = self.on_batch_started(started).await?;
            return Ok(if skipped { Step::Skipped } else { Step::Continue });
        }

        if self.session.batch_id() != Some(event.batch_id()) || self.phase().is_terminal() {
            warn!("Ignoring event for batch {} in {}", event.batch_id(), self.phase());
            return Ok(Step::Ignored);
        }

        match event {
            BatchEvent::BatchStarted(_) => Ok(Step::Ignored),
            BatchEvent::TreeTx(tree_tx) => {
                self.trees.push(tree_tx);
                Ok(Step::Continue)
            }
            BatchEvent::TreeSigningStarted(signing) => {
                let vtxo_tree = self
                    .trees
                    .vtxo_tree()?
                    .ok_or_else(|| ArkError::missing("VTXO tree"))?;
                let skipped = self.on_tree_signing_started(signing, &vtxo_tree).await?;
                Ok(if skipped { Step::Skipped } else { Step::Continue })
            }
            BatchEvent::TreeNonces(nonces) => {
                self.on_tree_nonces(nonces).await?;
                Ok(Step::Continue)
            }
            BatchEvent::BatchFinalization(finalization) => {
                let vtxo_tree = self.trees.vtxo_tree()?;
                let connector_tree = self.trees.connector_tree()?;
                self.on_batch_finalization(finalization, vtxo_tree.as_ref(), connector_tree.as_ref())
                    .await?;
                Ok(Step::Done)
            }
            BatchEvent::BatchFailed(failed) => Err(ArkError::RoundFailed {
                batch_id: failed.id.clone(),
                reason: failed.reason.clone(),
            }),
        }
    }

    /// Phase 1. Returns `true` when this wallet's intent was not admitted.
    pub async fn on_batch_started(&mut self, event: &BatchStartedEvent) -> ArkResult<bool> {
        self.session.require(&[Phase::Idle], Phase::Registered)?;

        let intent_hash = sha256::Hash::hash(self.intent.id.as_bytes()).to_string();
        let admitted = event
            .intent_id_hashes
            .iter()
            .any(|hash| hash.eq_ignore_ascii_case(&intent_hash));
        if !admitted {
            warn!("Intent not admitted to batch {}, skipping", event.id);
            self.session.advance(Phase::Skipped)?;
            return Ok(true);
        }

        self.ark.confirm_registration(&self.intent.id).await?;
        let info = self.ark.get_info().await?;

        let sweep_script = sweep_leaf(info.forfeit_key()?, event.batch_expiry)?;
        let sweep_leaf_hash = TapLeafHash::from_script(&sweep_script, LeafVersion::TapScript);

        self.session.start(event.id.clone(), sweep_leaf_hash)?;
        self.server_info = Some(info);
        self.session.advance(Phase::Registered)?;

        info!("Registered in batch {}", event.id);
        Ok(false)
    }

    /// Phase 2. Returns `true` when this wallet was not selected as a tree cosigner.
    pub async fn on_tree_signing_started(
        &mut self,
        event: &TreeSigningStartedEvent,
        vtxo_tree: &TxTree,
    ) -> ArkResult<bool> {
        self.session.require(&[Phase::Registered], Phase::TreeSigning)?;

        let signer_pubkey = self.signer.get_public_key().await?;
        let signer_key = parse_x_only(&signer_pubkey)?;
        let selected = event
            .cosigners_pubkeys
            .iter()
            .filter_map(|key| parse_x_only(key).ok())
            .any(|key| key == signer_key);
        if !selected {
            warn!("Not selected as cosigner for batch {}, skipping", event.id);
            self.session.advance(Phase::Skipped)?;
            return Ok(true);
        }

        let commitment = Psbt::from_str(&event.unsigned_commitment_tx)?;
        let shared_amount = commitment
            .unsigned_tx
            .output
            .first()
            .map(|output| output.value)
            .ok_or_else(|| ArkError::missing("shared output of commitment transaction"))?;
        let sweep_leaf_hash = self
            .session
            .sweep_leaf_hash()
            .ok_or_else(|| ArkError::missing("sweep leaf hash"))?;

        self.signer.init(vtxo_tree, sweep_leaf_hash, shared_amount).await?;
        let nonces = self.signer.get_nonces().await?;
        let batch_id = self.batch_id()?;
        self.ark
            .submit_tree_nonces(&batch_id, &signer_pubkey, &nonces)
            .await?;

        self.session.advance(Phase::TreeSigning)?;
        info!("Submitted {} tree nonces for batch {}", nonces.len(), batch_id);
        Ok(false)
    }

    /// Phase 3. Returns `true` once partial signatures were submitted.
    ///
    /// Call once per `TreeNonces` event until it returns `true`.
    pub async fn on_tree_nonces(&mut self, event: &TreeNoncesEvent) -> ArkResult<bool> {
        self.session
            .require(&[Phase::TreeSigning, Phase::NoncesPending], Phase::Signed)?;

        let has_all_nonces = self.signer.aggregated_nonces(event.txid, &event.nonces).await?;
        if !has_all_nonces {
            debug!("Nonces for {} aggregated, waiting for more", event.txid);
            self.session.advance(Phase::NoncesPending)?;
            return Ok(false);
        }

        let signatures = self.signer.sign().await?;
        let signer_pubkey = self.signer.get_public_key().await?;
        let batch_id = self.batch_id()?;
        self.ark
            .submit_tree_signatures(&batch_id, &signer_pubkey, &signatures)
            .await?;

        self.session.advance(Phase::Signed)?;
        info!("Submitted {} tree signatures for batch {}", signatures.len(), batch_id);
        Ok(true)
    }

    /// Phase 4. Sign boarding inputs in the commitment transaction, build and sign
    /// forfeits for settled VTXOs, collect co-signatures and complete the round.
    pub async fn on_batch_finalization(
        &mut self,
        event: &BatchFinalizationEvent,
        vtxo_tree: Option<&TxTree>,
        connector_tree: Option<&TxTree>,
    ) -> ArkResult<()> {
        self.session.require(&[Phase::Signed], Phase::Finalizing)?;
        self.session.advance(Phase::Finalizing)?;

        let forfeit_script = self
            .server_info
            .as_ref()
            .ok_or_else(|| ArkError::missing("server info"))?
            .forfeit_script()?;
        let mut commitment = Psbt::from_str(&event.commitment_tx)?;
        let commitment_txid = commitment.unsigned_tx.compute_txid();

        if let Some(tree) = vtxo_tree {
            let shared_output = OutPoint::new(commitment_txid, 0);
            let spends_shared = tree
                .root
                .unsigned_tx
                .input
                .iter()
                .any(|input| input.previous_output == shared_output);
            if !spends_shared {
                return Err(ArkError::transaction(format!(
                    "VTXO tree root does not spend {}",
                    shared_output
                )));
            }
        }

        let available = match connector_tree {
            Some(tree) => connectors(tree)?,
            None => Vec::new(),
        };
        let mut next_connector = available.iter();
        let mut used_connectors = 0;
        let mut forfeits = Vec::new();
        let mut boarding_signed = false;

        for input in &self.inputs {
            // First match wins
            let boarding_index = commitment
                .unsigned_tx
                .input
                .iter()
                .position(|txin| txin.previous_output == input.outpoint);

            match boarding_index {
                Some(index) => {
                    debug!("Signing boarding input {} at index {}", input.outpoint, index);
                    let psbt_input = input_mut(&mut commitment, index)?;
                    set_tap_leaf_script(
                        psbt_input,
                        input.control_block.clone(),
                        input.leaf_script.clone(),
                    );
                    set_embedded_script(psbt_input, &input.embedded_script);
                    if psbt_input.witness_utxo.is_none() {
                        psbt_input.witness_utxo = Some(input.prevout.clone());
                    }
                    self.identity.sign(&mut commitment, &[index]).await?;
                    boarding_signed = true;
                }
                None => {
                    let connector = next_connector.next().ok_or(ArkError::ConnectorsExhausted {
                        needed: used_connectors + 1,
                        available: available.len(),
                    })?;
                    used_connectors += 1;
                    debug!("Forfeiting {} with connector {}", input.outpoint, connector.outpoint);

                    let mut forfeit = build_forfeit(input, connector, &forfeit_script)?;
                    self.identity.sign(&mut forfeit, &[0]).await?;
                    forfeits.push(forfeit.to_string());
                }
            }
        }

        let local_commitment = boarding_signed.then(|| commitment.to_string());
        let request = FinalizationRequest {
            proof: self.intent.proof.clone(),
            message: self.intent.message.clone(),
            forfeits,
            connector_tree: connector_tree.map(TxTree::to_nodes),
            commitment_tx: local_commitment.clone(),
        };
        debug!(
            "Submitting {} forfeits to introspector (boarding: {})",
            request.forfeits.len(),
            boarding_signed
        );
        let response = self.introspector.submit_finalization(&request).await?;

        let commitment_tx = response.signed_commitment_tx.or(local_commitment);
        self.ark
            .submit_signed_forfeit_txs(&response.signed_forfeits, commitment_tx.as_deref())
            .await?;

        self.session.advance(Phase::Done)?;
        info!(
            "Batch {} finalized: {} forfeits, {} connectors used",
            self.batch_id()?,
            response.signed_forfeits.len(),
            used_connectors
        );
        Ok(())
    }
}
