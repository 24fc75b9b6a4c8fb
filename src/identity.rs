//! # Wallet Identity
//!
//! Signing capability used by the batch coordinator. Inputs are always spent
//! through a tapscript leaf, so signatures are BIP-341 script-path signatures
//! stored in the PSBT's `tap_script_sigs`.

use crate::error::{ArkError, ArkResult};
use async_trait::async_trait;
use bitcoin::hashes::Hash;
use bitcoin::secp256k1::{All, Keypair, Message, Secp256k1, SecretKey, XOnlyPublicKey};
use bitcoin::sighash::{Prevouts, SighashCache, TapSighashType};
use bitcoin::taproot::{self, TapLeafHash};
use bitcoin::{Psbt, TxOut};
use log::debug;
use std::str::FromStr;

/// A wallet key able to sign PSBT inputs in place
#[async_trait]
pub trait Identity: Send + Sync {
    fn x_only_public_key(&self) -> XOnlyPublicKey;

    /// Sign the given inputs of `psbt`, adding script-path signatures
    async fn sign(&self, psbt: &mut Psbt, inputs: &[usize]) -> ArkResult<()>;
}

/// Identity backed by a single in-memory secret key
pub struct SingleKeyIdentity {
    keypair: Keypair,
    secp: Secp256k1<All>,
}

impl SingleKeyIdentity {
    pub fn new(secret_key: SecretKey) -> Self {
        let secp = Secp256k1::new();
        let keypair = Keypair::from_secret_key(&secp, &secret_key);
        Self { keypair, secp }
    }

    pub fn from_hex(secret_hex: &str) -> ArkResult<Self> {
        let secret_key = SecretKey::from_str(secret_hex)?;
        Ok(Self::new(secret_key))
    }
}

#[async_trait]
impl Identity for SingleKeyIdentity {
    fn x_only_public_key(&self) -> XOnlyPublicKey {
        self.keypair.x_only_public_key().0
    }

    async fn sign(&self, psbt: &mut Psbt, inputs: &[usize]) -> ArkResult<()> {
        let prevouts = psbt
            .inputs
            .iter()
            .enumerate()
            .map(|(index, input)| {
                input
                    .witness_utxo
                    .clone()
                    .ok_or_else(|| ArkError::missing(format!("witness utxo for input {}", index)))
            })
            .collect::<ArkResult<Vec<TxOut>>>()?;

        let pubkey = self.x_only_public_key();
        let mut signatures = Vec::new();
        {
            let mut cache = SighashCache::new(&psbt.unsigned_tx);
            for &index in inputs {
                let input = psbt
                    .inputs
                    .get(index)
                    .ok_or_else(|| ArkError::missing(format!("PSBT input {}", index)))?;
                if input.tap_scripts.is_empty() {
                    return Err(ArkError::missing(format!("tap leaf script for input {}", index)));
                }

                for (script, version) in input.tap_scripts.values() {
                    let leaf_hash = TapLeafHash::from_script(script, *version);
                    let sighash = cache
                        .taproot_script_spend_signature_hash(
                            index,
                            &Prevouts::All(&prevouts),
                            leaf_hash,
                            TapSighashType::Default,
                        )
                        .map_err(|e| ArkError::crypto(format!("sighash for input {}: {}", index, e)))?;
                    let message = Message::from_digest(sighash.to_byte_array());
                    let signature = self.secp.sign_schnorr_no_aux_rand(&message, &self.keypair);
                    signatures.push((index, leaf_hash, signature));
                }
            }
        }

        for (index, leaf_hash, signature) in signatures {
            debug!("Signed input {} leaf {}", index, leaf_hash);
            psbt.inputs[index].tap_script_sigs.insert(
                (pubkey, leaf_hash),
                taproot::Signature {
                    signature,
                    sighash_type: TapSighashType::Default,
                },
            );
        }

        Ok(())
    }
}
