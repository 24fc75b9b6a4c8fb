//! Forfeit transactions and connector outputs.
//!
//! A forfeit spends a settled VTXO together with one connector output to the
//! coordinator's forfeit address. The connector ties the forfeit to the
//! commitment transaction: the forfeit is only valid once the round confirms.

use super::session::WalletInput;
use crate::config::protocol::{FORFEIT_TX_VERSION, P2A_SCRIPT};
use crate::error::{ArkError, ArkResult};
use crate::psbt_ext::{set_embedded_script, set_tap_leaf_script};
use crate::tree::TxTree;
use bitcoin::absolute::LockTime;
use bitcoin::transaction::Version;
use bitcoin::{Amount, OutPoint, Psbt, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Witness};

/// One-time-use connector output at a connector tree leaf
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connector {
    pub outpoint: OutPoint,
    pub txout: TxOut,
}

/// Connector outputs of a connector tree, in leaf traversal order.
///
/// Each leaf exposes its connector as output 0.
pub fn connectors(tree: &TxTree) -> ArkResult<Vec<Connector>> {
    tree.leaves()
        .into_iter()
        .map(|leaf| {
            let txid = leaf.unsigned_tx.compute_txid();
            let txout = leaf
                .unsigned_tx
                .output
                .first()
                .cloned()
                .ok_or_else(|| ArkError::missing(format!("connector output of {}", txid)))?;
            Ok(Connector {
                outpoint: OutPoint::new(txid, 0),
                txout,
            })
        })
        .collect()
}

/// Zero-value pay-to-anchor output for CPFP fee bumping
pub fn fee_anchor() -> TxOut {
    TxOut {
        value: Amount::ZERO,
        script_pubkey: ScriptBuf::from_bytes(P2A_SCRIPT.to_vec()),
    }
}

/// Unsigned forfeit PSBT for `vtxo`, spending `connector` alongside it.
///
/// Input 0 carries the VTXO's tap leaf and embedded script; both inputs carry
/// their witness UTXO so the wallet and the introspector can sign.
pub fn build_forfeit(
    vtxo: &WalletInput,
    connector: &Connector,
    forfeit_script: &ScriptBuf,
) -> ArkResult<Psbt> {
    let value = vtxo
        .prevout
        .value
        .checked_add(connector.txout.value)
        .ok_or_else(|| ArkError::transaction("forfeit value overflow"))?;

    let tx = Transaction {
        version: Version(FORFEIT_TX_VERSION),
        lock_time: LockTime::ZERO,
        input: vec![
            TxIn {
                previous_output: vtxo.outpoint,
                script_sig: ScriptBuf::new(),
                sequence: Sequence::ZERO,
                witness: Witness::new(),
            },
            TxIn {
                previous_output: connector.outpoint,
                script_sig: ScriptBuf::new(),
                sequence: Sequence::ZERO,
                witness: Witness::new(),
            },
        ],
        output: vec![
            TxOut {
                value,
                script_pubkey: forfeit_script.clone(),
            },
            fee_anchor(),
        ],
    };

    let mut psbt = Psbt::from_unsigned_tx(tx)?;
    psbt.inputs[0].witness_utxo = Some(vtxo.prevout.clone());
    psbt.inputs[1].witness_utxo = Some(connector.txout.clone());
    set_tap_leaf_script(
        &mut psbt.inputs[0],
        vtxo.control_block.clone(),
        vtxo.leaf_script.clone(),
    );
    set_embedded_script(&mut psbt.inputs[0], &vtxo.embedded_script);

    Ok(psbt)
}
