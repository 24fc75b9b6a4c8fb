//! PSBT input annotations used by Arkade spends.
//!
//! The embedded script of an input travels in a proprietary field
//! (`prefix = "arkade"`, `subtype = 0x01`, empty key) so the introspector can
//! recompute the key tweak and evaluate the script before co-signing.

use crate::config::protocol::{PSBT_EMBEDDED_SCRIPT_SUBTYPE, PSBT_PROPRIETARY_PREFIX};
use crate::error::{ArkError, ArkResult};
use bitcoin::psbt::raw::ProprietaryKey;
use bitcoin::psbt::{Input, Psbt};
use bitcoin::taproot::{ControlBlock, LeafVersion};
use bitcoin::ScriptBuf;

fn embedded_script_key() -> ProprietaryKey {
    ProprietaryKey {
        prefix: PSBT_PROPRIETARY_PREFIX.to_vec(),
        subtype: PSBT_EMBEDDED_SCRIPT_SUBTYPE,
        key: Vec::new(),
    }
}

/// Attach the raw embedded script to an input, replacing any previous value
pub fn set_embedded_script(input: &mut Input, script: &[u8]) {
    input.proprietary.insert(embedded_script_key(), script.to_vec());
}

/// Raw embedded script of an input, if present
pub fn embedded_script(input: &Input) -> Option<&[u8]> {
    input
        .proprietary
        .get(&embedded_script_key())
        .map(Vec::as_slice)
}

/// Attach a tapscript leaf and its control block to an input
pub fn set_tap_leaf_script(input: &mut Input, control_block: ControlBlock, script: ScriptBuf) {
    input
        .tap_scripts
        .insert(control_block, (script, LeafVersion::TapScript));
}

/// Mutable input at `index`, or `MissingData`
pub fn input_mut(psbt: &mut Psbt, index: usize) -> ArkResult<&mut Input> {
    psbt.inputs
        .get_mut(index)
        .ok_or_else(|| ArkError::missing(format!("PSBT input {}", index)))
}
