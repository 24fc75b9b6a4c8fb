//! # Tapscript Templates
//!
//! The five spending-condition templates a VTXO leaf can use. Every template ends
//! in an n-of-n `CHECKSIGVERIFY ... CHECKSIG` chain; the variants differ in the
//! prefix (relative/absolute timelock, condition script) placed before it.
//!
//! Templates are also accepted as JSON descriptors:
//!
//! ```json
//! {"type": "csvMultisig", "pubkeys": ["<x-only hex>"], "timelock": 144}
//! ```

use crate::config::protocol::CSV_SECONDS_THRESHOLD;
use crate::error::{ArkError, ArkResult};
use bitcoin::absolute::LockTime;
use bitcoin::opcodes::all::*;
use bitcoin::script::Builder;
use bitcoin::{ScriptBuf, Sequence, XOnlyPublicKey};
use serde::{Deserialize, Serialize};

/// BIP-68 relative timelock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u64", try_from = "u64")]
pub enum RelativeTimelock {
    Blocks(u16),
    Seconds(u32),
}

impl RelativeTimelock {
    /// Interpret a raw lock value: below 512 is a block count, otherwise seconds
    pub fn from_value(value: u64) -> ArkResult<Self> {
        if value < CSV_SECONDS_THRESHOLD {
            return Ok(RelativeTimelock::Blocks(value as u16));
        }
        u32::try_from(value)
            .map(RelativeTimelock::Seconds)
            .map_err(|_| ArkError::transaction(format!("relative timelock {} out of range", value)))
    }

    pub fn value(&self) -> u64 {
        match self {
            RelativeTimelock::Blocks(blocks) => *blocks as u64,
            RelativeTimelock::Seconds(seconds) => *seconds as u64,
        }
    }

    /// BIP-68 sequence; seconds are rounded up to the next 512-second unit
    pub fn to_sequence(&self) -> ArkResult<Sequence> {
        match self {
            RelativeTimelock::Blocks(blocks) => Ok(Sequence::from_height(*blocks)),
            RelativeTimelock::Seconds(seconds) => Sequence::from_seconds_ceil(*seconds)
                .map_err(|e| ArkError::transaction(format!("relative timelock: {}", e))),
        }
    }
}

impl From<RelativeTimelock> for u64 {
    fn from(timelock: RelativeTimelock) -> u64 {
        timelock.value()
    }
}

impl TryFrom<u64> for RelativeTimelock {
    type Error = ArkError;

    fn try_from(value: u64) -> ArkResult<Self> {
        Self::from_value(value)
    }
}

/// Spending-condition template of a VTXO leaf
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "TemplateDescriptor", into = "TemplateDescriptor")]
pub enum TapscriptTemplate {
    /// `<pk1> CHECKSIGVERIFY ... <pkN> CHECKSIG`
    Multisig { pubkeys: Vec<XOnlyPublicKey> },
    /// `<sequence> CSV DROP <multisig>`
    CsvMultisig {
        pubkeys: Vec<XOnlyPublicKey>,
        timelock: RelativeTimelock,
    },
    /// `<condition> VERIFY <sequence> CSV DROP <multisig>`
    ConditionCsvMultisig {
        pubkeys: Vec<XOnlyPublicKey>,
        timelock: RelativeTimelock,
        condition: ScriptBuf,
    },
    /// `<condition> VERIFY <multisig>`
    ConditionMultisig {
        pubkeys: Vec<XOnlyPublicKey>,
        condition: ScriptBuf,
    },
    /// `<locktime> CLTV DROP <multisig>`
    CltvMultisig {
        pubkeys: Vec<XOnlyPublicKey>,
        locktime: LockTime,
    },
}

impl TapscriptTemplate {
    /// Descriptor type name
    pub fn kind(&self) -> &'static str {
        match self {
            TapscriptTemplate::Multisig { .. } => "multisig",
            TapscriptTemplate::CsvMultisig { .. } => "csvMultisig",
            TapscriptTemplate::ConditionCsvMultisig { .. } => "conditionCsvMultisig",
            TapscriptTemplate::ConditionMultisig { .. } => "conditionMultisig",
            TapscriptTemplate::CltvMultisig { .. } => "cltvMultisig",
        }
    }

    pub fn pubkeys(&self) -> &[XOnlyPublicKey] {
        match self {
            TapscriptTemplate::Multisig { pubkeys }
            | TapscriptTemplate::CsvMultisig { pubkeys, .. }
            | TapscriptTemplate::ConditionCsvMultisig { pubkeys, .. }
            | TapscriptTemplate::ConditionMultisig { pubkeys, .. }
            | TapscriptTemplate::CltvMultisig { pubkeys, .. } => pubkeys,
        }
    }

    fn pubkeys_mut(&mut self) -> &mut Vec<XOnlyPublicKey> {
        match self {
            TapscriptTemplate::Multisig { pubkeys }
            | TapscriptTemplate::CsvMultisig { pubkeys, .. }
            | TapscriptTemplate::ConditionCsvMultisig { pubkeys, .. }
            | TapscriptTemplate::ConditionMultisig { pubkeys, .. }
            | TapscriptTemplate::CltvMultisig { pubkeys, .. } => pubkeys,
        }
    }

    /// Same template with `key` appended as the last required signer
    pub fn with_pubkey(mut self, key: XOnlyPublicKey) -> Self {
        self.pubkeys_mut().push(key);
        self
    }

    /// Encode to tapscript bytes
    pub fn encode(&self) -> ArkResult<ScriptBuf> {
        if self.pubkeys().is_empty() {
            return Err(ArkError::missing(format!("public keys for {} template", self.kind())));
        }

        let script = match self {
            TapscriptTemplate::Multisig { pubkeys } => multisig(Builder::new(), pubkeys),
            TapscriptTemplate::CsvMultisig { pubkeys, timelock } => {
                multisig(csv_prefix(Builder::new(), timelock)?, pubkeys)
            }
            TapscriptTemplate::ConditionCsvMultisig {
                pubkeys,
                timelock,
                condition,
            } => {
                let tail = multisig(csv_prefix(Builder::new(), timelock)?, pubkeys);
                with_condition(condition, tail)
            }
            TapscriptTemplate::ConditionMultisig { pubkeys, condition } => {
                with_condition(condition, multisig(Builder::new(), pubkeys))
            }
            TapscriptTemplate::CltvMultisig { pubkeys, locktime } => {
                let builder = Builder::new()
                    .push_lock_time(*locktime)
                    .push_opcode(OP_CLTV)
                    .push_opcode(OP_DROP);
                multisig(builder, pubkeys)
            }
        };

        Ok(script)
    }
}

/// CSV sweep leaf letting the coordinator reclaim a batch output after expiry
pub fn sweep_leaf(forfeit_key: XOnlyPublicKey, batch_expiry: u64) -> ArkResult<ScriptBuf> {
    TapscriptTemplate::CsvMultisig {
        pubkeys: vec![forfeit_key],
        timelock: RelativeTimelock::from_value(batch_expiry)?,
    }
    .encode()
}

fn multisig(mut builder: Builder, pubkeys: &[XOnlyPublicKey]) -> ScriptBuf {
    let last = pubkeys.len().saturating_sub(1);
    for (i, key) in pubkeys.iter().enumerate() {
        builder = builder.push_x_only_key(key).push_opcode(if i == last {
            OP_CHECKSIG
        } else {
            OP_CHECKSIGVERIFY
        });
    }
    builder.into_script()
}

fn csv_prefix(builder: Builder, timelock: &RelativeTimelock) -> ArkResult<Builder> {
    Ok(builder
        .push_sequence(timelock.to_sequence()?)
        .push_opcode(OP_CSV)
        .push_opcode(OP_DROP))
}

// Condition scripts are inlined, not pushed
fn with_condition(condition: &ScriptBuf, tail: ScriptBuf) -> ScriptBuf {
    let mut bytes = condition.to_bytes();
    bytes.push(OP_VERIFY.to_u8());
    bytes.extend_from_slice(tail.as_bytes());
    ScriptBuf::from_bytes(bytes)
}

/// JSON form of a template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateDescriptor {
    #[serde(rename = "type")]
    pub kind: String,
    pub pubkeys: Vec<XOnlyPublicKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timelock: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locktime: Option<u32>,
    /// Hex-encoded condition script
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

impl TemplateDescriptor {
    fn timelock(&self) -> ArkResult<RelativeTimelock> {
        let value = self
            .timelock
            .ok_or_else(|| ArkError::missing(format!("timelock for {} template", self.kind)))?;
        RelativeTimelock::from_value(value)
    }

    fn condition(&self) -> ArkResult<ScriptBuf> {
        let condition = self
            .condition
            .as_deref()
            .ok_or_else(|| ArkError::missing(format!("condition for {} template", self.kind)))?;
        let bytes = hex::decode(condition)
            .map_err(|e| ArkError::transaction(format!("invalid condition hex: {}", e)))?;
        Ok(ScriptBuf::from_bytes(bytes))
    }
}

impl TryFrom<TemplateDescriptor> for TapscriptTemplate {
    type Error = ArkError;

    fn try_from(descriptor: TemplateDescriptor) -> ArkResult<Self> {
        let template = match descriptor.kind.as_str() {
            "multisig" => TapscriptTemplate::Multisig {
                pubkeys: descriptor.pubkeys.clone(),
            },
            "csvMultisig" => TapscriptTemplate::CsvMultisig {
                pubkeys: descriptor.pubkeys.clone(),
                timelock: descriptor.timelock()?,
            },
            "conditionCsvMultisig" => TapscriptTemplate::ConditionCsvMultisig {
                pubkeys: descriptor.pubkeys.clone(),
                timelock: descriptor.timelock()?,
                condition: descriptor.condition()?,
            },
            "conditionMultisig" => TapscriptTemplate::ConditionMultisig {
                pubkeys: descriptor.pubkeys.clone(),
                condition: descriptor.condition()?,
            },
            "cltvMultisig" => {
                let locktime = descriptor
                    .locktime
                    .ok_or_else(|| ArkError::missing("locktime for cltvMultisig template"))?;
                TapscriptTemplate::CltvMultisig {
                    pubkeys: descriptor.pubkeys.clone(),
                    locktime: LockTime::from_consensus(locktime),
                }
            }
            other => {
                return Err(ArkError::UnsupportedTemplate {
                    kind: other.to_string(),
                })
            }
        };
        Ok(template)
    }
}

impl From<TapscriptTemplate> for TemplateDescriptor {
    fn from(template: TapscriptTemplate) -> Self {
        let mut descriptor = TemplateDescriptor {
            kind: template.kind().to_string(),
            pubkeys: template.pubkeys().to_vec(),
            timelock: None,
            locktime: None,
            condition: None,
        };
        match template {
            TapscriptTemplate::Multisig { .. } => {}
            TapscriptTemplate::CsvMultisig { timelock, .. } => {
                descriptor.timelock = Some(timelock.value());
            }
            TapscriptTemplate::ConditionCsvMultisig {
                timelock, condition, ..
            } => {
                descriptor.timelock = Some(timelock.value());
                descriptor.condition = Some(hex::encode(condition.as_bytes()));
            }
            TapscriptTemplate::ConditionMultisig { condition, .. } => {
                descriptor.condition = Some(hex::encode(condition.as_bytes()));
            }
            TapscriptTemplate::CltvMultisig { locktime, .. } => {
                descriptor.locktime = Some(locktime.to_consensus_u32());
            }
        }
        descriptor
    }
}
