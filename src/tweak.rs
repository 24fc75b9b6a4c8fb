//! # Script-Bound Key Tweak
//!
//! Binds an embedded script to a co-signing key:
//!
//! ```text
//! tweaked = lift_x(base) + (taggedHash("ArkScriptHash", script) mod n)·G
//! ```
//!
//! The base key is always lifted with even Y, so the wallet and the introspector
//! reconstruct the same point without carrying a parity bit.

use crate::config::protocol::SCRIPT_HASH_TAG;
use crate::error::{ArkError, ArkResult};
use bitcoin::hashes::{sha256, Hash};
use bitcoin::secp256k1::constants::CURVE_ORDER;
use bitcoin::secp256k1::{Parity, PublicKey, Scalar, Secp256k1, XOnlyPublicKey};
use sha2::{Digest, Sha256};

/// BIP-340 tagged hash: `SHA256(SHA256(tag) || SHA256(tag) || msg)`
pub fn tagged_hash(tag: &str, msg: &[u8]) -> [u8; 32] {
    let tag_hash = sha256::Hash::hash(tag.as_bytes());
    let mut hasher = Sha256::new();
    hasher.update(tag_hash);
    hasher.update(tag_hash);
    hasher.update(msg);
    hasher.finalize().into()
}

/// Script hash under the protocol tag
pub fn script_hash(script: &[u8]) -> [u8; 32] {
    tagged_hash(SCRIPT_HASH_TAG, script)
}

/// Tweak scalar for a script: the script hash reduced mod n, with zero mapped to one
pub fn script_tweak(script: &[u8]) -> Scalar {
    let scalar = reduce_mod_order(script_hash(script));
    if scalar == Scalar::ZERO {
        Scalar::ONE
    } else {
        scalar
    }
}

/// Tweak a serialized public key (32-byte x-only or 33-byte compressed)
pub fn tweak_public_key(base: &[u8], script: &[u8]) -> ArkResult<XOnlyPublicKey> {
    let x_only = match base.len() {
        32 => XOnlyPublicKey::from_slice(base)?,
        33 => PublicKey::from_slice(base)?.x_only_public_key().0,
        len => {
            return Err(ArkError::crypto(format!(
                "public key must be 32 or 33 bytes, got {}",
                len
            )))
        }
    };
    tweak_x_only(&x_only, script)
}

/// Tweak an x-only key with the hash of `script`
pub fn tweak_x_only(base: &XOnlyPublicKey, script: &[u8]) -> ArkResult<XOnlyPublicKey> {
    let secp = Secp256k1::verification_only();
    let point = base.public_key(Parity::Even);
    let tweaked = point.add_exp_tweak(&secp, &script_tweak(script))?;
    Ok(tweaked.x_only_public_key().0)
}

/// Reduce a 256-bit big-endian value mod the curve order.
///
/// Any 256-bit value is below 2n, so at most one subtraction is needed.
fn reduce_mod_order(bytes: [u8; 32]) -> Scalar {
    if let Ok(scalar) = Scalar::from_be_bytes(bytes) {
        return scalar;
    }

    let mut reduced = [0u8; 32];
    let mut borrow = 0i16;
    for i in (0..32).rev() {
        let mut diff = bytes[i] as i16 - CURVE_ORDER[i] as i16 - borrow;
        borrow = if diff < 0 {
            diff += 256;
            1
        } else {
            0
        };
        reduced[i] = diff as u8;
    }

    Scalar::from_be_bytes(reduced).unwrap_or(Scalar::ZERO)
}
