//! # VTXO Script Tree
//!
//! Builds the taproot tree of a VTXO contract. Arkade leaves carry an embedded
//! script; their template gets one extra signer, the introspector key tweaked
//! with that script, so the introspector can only co-sign spends whose embedded
//! script it has evaluated. Raw leaves pass through byte-identical.

use crate::error::{ArkError, ArkResult};
use crate::tapscript::TapscriptTemplate;
use crate::tweak::tweak_x_only;
use bitcoin::secp256k1::Secp256k1;
use bitcoin::taproot::{ControlBlock, LeafVersion, TapLeafHash, TaprootBuilder, TaprootSpendInfo};
use bitcoin::{Address, Network, ScriptBuf, XOnlyPublicKey};
use log::debug;
use std::collections::BTreeMap;

/// BIP-341 NUMS point `H`, used as the internal key so only script paths can spend
const NUMS_POINT: [u8; 32] = [
    0x50, 0x92, 0x9b, 0x74, 0xc1, 0xa0, 0x49, 0x54, 0xb7, 0x8b, 0x4b, 0x60, 0x35, 0xe9, 0x7a, 0x5e,
    0x07, 0x8a, 0x5a, 0x0f, 0x28, 0xec, 0x96, 0xd5, 0x47, 0xbf, 0xee, 0x9a, 0xce, 0x80, 0x3a, 0xc0,
];

/// Unspendable internal key for VTXO outputs
pub fn unspendable_key() -> ArkResult<XOnlyPublicKey> {
    XOnlyPublicKey::from_slice(&NUMS_POINT)
        .map_err(|e| ArkError::crypto(format!("Failed to create NUMS key: {}", e)))
}

/// Leaf whose spending path is bound to an embedded script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArkadeLeaf {
    pub embedded_script: Vec<u8>,
    pub template: TapscriptTemplate,
}

/// Input leaf of a VTXO tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VtxoLeaf {
    Arkade(ArkadeLeaf),
    Raw(ScriptBuf),
}

impl From<ArkadeLeaf> for VtxoLeaf {
    fn from(leaf: ArkadeLeaf) -> Self {
        VtxoLeaf::Arkade(leaf)
    }
}

impl From<ScriptBuf> for VtxoLeaf {
    fn from(script: ScriptBuf) -> Self {
        VtxoLeaf::Raw(script)
    }
}

impl ArkadeLeaf {
    /// Template with the tweaked introspector key appended, encoded to tapscript
    pub fn to_script(&self, introspector_key: &XOnlyPublicKey) -> ArkResult<ScriptBuf> {
        let tweaked = tweak_x_only(introspector_key, &self.embedded_script)?;
        self.template.clone().with_pubkey(tweaked).encode()
    }
}

/// Finalized taproot tree of a VTXO contract
#[derive(Debug, Clone)]
pub struct VtxoScriptTree {
    leaves: Vec<ScriptBuf>,
    embedded_scripts: BTreeMap<usize, Vec<u8>>,
    spend_info: TaprootSpendInfo,
}

impl VtxoScriptTree {
    /// Rewrite Arkade leaves and build the taproot tree
    pub fn build(leaves: Vec<VtxoLeaf>, introspector_key: &XOnlyPublicKey) -> ArkResult<Self> {
        if leaves.is_empty() {
            return Err(ArkError::missing("VTXO tree leaves"));
        }

        let mut scripts = Vec::with_capacity(leaves.len());
        let mut embedded_scripts = BTreeMap::new();

        for (index, leaf) in leaves.into_iter().enumerate() {
            match leaf {
                VtxoLeaf::Arkade(leaf) => {
                    scripts.push(leaf.to_script(introspector_key)?);
                    embedded_scripts.insert(index, leaf.embedded_script);
                }
                VtxoLeaf::Raw(script) => scripts.push(script),
            }
        }

        debug!(
            "Building VTXO tree: {} leaves, {} with embedded scripts",
            scripts.len(),
            embedded_scripts.len()
        );

        let secp = Secp256k1::verification_only();
        let builder = TaprootBuilder::with_huffman_tree(scripts.iter().map(|s| (1, s.clone())))
            .map_err(|e| ArkError::transaction(format!("Failed to add leaves: {:?}", e)))?;
        let spend_info = builder
            .finalize(&secp, unspendable_key()?)
            .map_err(|_| ArkError::transaction("Failed to finalize taproot tree"))?;

        Ok(Self {
            leaves: scripts,
            embedded_scripts,
            spend_info,
        })
    }

    /// Leaf scripts in input order
    pub fn leaves(&self) -> &[ScriptBuf] {
        &self.leaves
    }

    /// Leaf index -> embedded script, for Arkade leaves only
    pub fn embedded_scripts(&self) -> &BTreeMap<usize, Vec<u8>> {
        &self.embedded_scripts
    }

    pub fn embedded_script(&self, index: usize) -> Option<&[u8]> {
        self.embedded_scripts.get(&index).map(Vec::as_slice)
    }

    pub fn spend_info(&self) -> &TaprootSpendInfo {
        &self.spend_info
    }

    /// Tweaked taproot output key
    pub fn output_key(&self) -> XOnlyPublicKey {
        self.spend_info.output_key().to_x_only_public_key()
    }

    pub fn script_pubkey(&self) -> ScriptBuf {
        ScriptBuf::new_p2tr_tweaked(self.spend_info.output_key())
    }

    pub fn address(&self, network: Network) -> Address {
        Address::p2tr_tweaked(self.spend_info.output_key(), network)
    }

    pub fn leaf_hash(&self, index: usize) -> Option<TapLeafHash> {
        self.leaves
            .get(index)
            .map(|script| TapLeafHash::from_script(script, LeafVersion::TapScript))
    }

    /// Control block and script for spending leaf `index`
    pub fn leaf_proof(&self, index: usize) -> ArkResult<(ControlBlock, ScriptBuf)> {
        let script = self
            .leaves
            .get(index)
            .ok_or_else(|| ArkError::missing(format!("leaf {}", index)))?;
        let control_block = self
            .spend_info
            .control_block(&(script.clone(), LeafVersion::TapScript))
            .ok_or_else(|| ArkError::missing(format!("control block for leaf {}", index)))?;
        Ok((control_block, script.clone()))
    }
}
