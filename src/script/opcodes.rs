//! # Opcode Registry
//!
//! Bidirectional map between opcode mnemonics and byte values. The table is the
//! standard tapscript opcode set merged with the Arkade extension opcodes, which
//! live in the reserved range `0xC4..=0xF2`.
//!
//! Data-push opcodes (`0x01..=0x4b`) are not stored; they are synthesized on
//! lookup as `DATA_<n>`. Mnemonics are stored without the `OP_` prefix and
//! lookups accept either form.

use crate::error::{ScriptError, ScriptResult};
use bitcoin::opcodes::{all::*, Opcode as BitcoinOpcode};
use lazy_static::lazy_static;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::ops::RangeInclusive;

/// Byte range reserved for Arkade extension opcodes
pub const EXTENSION_RANGE: RangeInclusive<u8> = 0xc4..=0xf2;

/// Largest length a single-byte data push can carry
pub const MAX_DIRECT_PUSH: u8 = 0x4b;

/// Prefix of synthesized data-push mnemonics
const DATA_PREFIX: &str = "DATA_";

/// Arkade extension opcodes.
///
/// Values are fixed by the protocol; the introspector interprets the same bytes.
pub mod ext {
    use super::Opcode;

    // Streaming SHA-256
    pub const OP_SHA256INITIALIZE: Opcode = Opcode(0xc4);
    pub const OP_SHA256UPDATE: Opcode = Opcode(0xc5);
    pub const OP_SHA256FINALIZE: Opcode = Opcode(0xc6);

    // Input introspection
    pub const OP_INSPECTINPUTOUTPOINT: Opcode = Opcode(0xc7);
    pub const OP_INSPECTINPUTARKADESCRIPTHASH: Opcode = Opcode(0xc8);
    pub const OP_INSPECTINPUTVALUE: Opcode = Opcode(0xc9);
    pub const OP_INSPECTINPUTSCRIPTPUBKEY: Opcode = Opcode(0xca);
    pub const OP_INSPECTINPUTSEQUENCE: Opcode = Opcode(0xcb);
    pub const OP_CHECKSIGFROMSTACK: Opcode = Opcode(0xcc);
    pub const OP_PUSHCURRENTINPUTINDEX: Opcode = Opcode(0xcd);
    pub const OP_INSPECTINPUTARKADEWITNESSHASH: Opcode = Opcode(0xce);

    // Output introspection
    pub const OP_INSPECTOUTPUTVALUE: Opcode = Opcode(0xcf);
    pub const OP_CHECKSIGFROMSTACKVERIFY: Opcode = Opcode(0xd0);
    pub const OP_INSPECTOUTPUTSCRIPTPUBKEY: Opcode = Opcode(0xd1);

    // Transaction introspection
    pub const OP_INSPECTVERSION: Opcode = Opcode(0xd2);
    pub const OP_INSPECTLOCKTIME: Opcode = Opcode(0xd3);
    pub const OP_INSPECTNUMINPUTS: Opcode = Opcode(0xd4);
    pub const OP_INSPECTNUMOUTPUTS: Opcode = Opcode(0xd5);
    pub const OP_TXWEIGHT: Opcode = Opcode(0xd6);

    // 64-bit arithmetic
    pub const OP_ADD64: Opcode = Opcode(0xd7);
    pub const OP_SUB64: Opcode = Opcode(0xd8);
    pub const OP_MUL64: Opcode = Opcode(0xd9);
    pub const OP_DIV64: Opcode = Opcode(0xda);
    pub const OP_NEG64: Opcode = Opcode(0xdb);
    pub const OP_LESSTHAN64: Opcode = Opcode(0xdc);
    pub const OP_LESSTHANOREQUAL64: Opcode = Opcode(0xdd);
    pub const OP_GREATERTHAN64: Opcode = Opcode(0xde);
    pub const OP_GREATERTHANOREQUAL64: Opcode = Opcode(0xdf);

    // Conversions
    pub const OP_SCRIPTNUMTOLE64: Opcode = Opcode(0xe0);
    pub const OP_LE64TOSCRIPTNUM: Opcode = Opcode(0xe1);
    pub const OP_LE32TOLE64: Opcode = Opcode(0xe2);

    // Elliptic curve
    pub const OP_ECMULSCALARVERIFY: Opcode = Opcode(0xe3);
    pub const OP_TWEAKVERIFY: Opcode = Opcode(0xe4);
}

/// Which table an opcode comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpcodeRange {
    /// Standard Bitcoin script opcode
    Base,
    /// Arkade extension opcode in `0xC4..=0xF2`
    Extension,
}

/// A registered, non-push opcode.
///
/// Values in `0x01..=0x4e` are data pushes and are never represented as an
/// [`Opcode`]; they only appear as `Push` operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Opcode(u8);

impl Opcode {
    /// Look up an opcode by mnemonic (with or without `OP_`)
    pub fn from_name(name: &str) -> ScriptResult<Self> {
        let value = name_to_value(name)
            .ok_or_else(|| ScriptError::UnknownOpcodeName(name.to_string()))?;
        Self::from_u8(value)
    }

    /// Look up an opcode by byte value
    pub fn from_u8(value: u8) -> ScriptResult<Self> {
        if is_push_value(value) {
            return Err(ScriptError::PushOpcode(value));
        }
        if REGISTRY.by_value.contains_key(&value) {
            Ok(Opcode(value))
        } else {
            Err(ScriptError::UnknownOpcode(value))
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// Canonical mnemonic without the `OP_` prefix
    pub fn name(self) -> &'static str {
        REGISTRY.by_value.get(&self.0).copied().unwrap_or("INVALIDOPCODE")
    }

    pub fn range(self) -> OpcodeRange {
        if EXTENSION_RANGE.contains(&self.0) {
            OpcodeRange::Extension
        } else {
            OpcodeRange::Base
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OP_{}", self.name())
    }
}

impl TryFrom<BitcoinOpcode> for Opcode {
    type Error = ScriptError;

    fn try_from(op: BitcoinOpcode) -> ScriptResult<Self> {
        Self::from_u8(op.to_u8())
    }
}

/// Resolve a mnemonic to its byte value.
///
/// Accepts names with or without the `OP_` prefix and synthesizes `DATA_<n>`
/// for `n` in `1..=75`.
pub fn name_to_value(name: &str) -> Option<u8> {
    let name = name.strip_prefix("OP_").unwrap_or(name);
    if let Some(len) = name.strip_prefix(DATA_PREFIX) {
        return len
            .parse::<u8>()
            .ok()
            .filter(|n| (1..=MAX_DIRECT_PUSH).contains(n))
            .filter(|n| n.to_string() == len);
    }
    REGISTRY.by_name.get(name).copied()
}

/// Resolve a byte value to its canonical mnemonic (without `OP_`)
pub fn value_to_name(value: u8) -> Option<Cow<'static, str>> {
    if (1..=MAX_DIRECT_PUSH).contains(&value) {
        return Some(Cow::Owned(format!("{}{}", DATA_PREFIX, value)));
    }
    REGISTRY.by_value.get(&value).map(|name| Cow::Borrowed(*name))
}

/// Every canonical `(name, value)` pair in the registry, ordered by value
pub fn registered() -> Vec<(&'static str, u8)> {
    let mut entries: Vec<_> = REGISTRY
        .by_value
        .iter()
        .map(|(value, name)| (*name, *value))
        .collect();
    entries.sort_by_key(|(_, value)| *value);
    entries
}

/// `0x01..=0x4e`: direct pushes and PUSHDATA1/2/4
pub(crate) fn is_push_value(value: u8) -> bool {
    (0x01..=OP_PUSHDATA4.to_u8()).contains(&value)
}

struct Registry {
    by_name: HashMap<&'static str, u8>,
    by_value: HashMap<u8, &'static str>,
}

impl Registry {
    fn build() -> Self {
        let mut by_name = HashMap::new();
        let mut by_value = HashMap::new();

        let base = base_opcodes()
            .into_iter()
            .map(|(name, op)| (name, op.to_u8()));
        let extension = extension_opcodes()
            .into_iter()
            .map(|(name, op)| (name, op.value()));

        for (name, value) in base.chain(extension) {
            let previous_name = by_value.insert(value, name);
            let previous_value = by_name.insert(name, value);
            debug_assert!(previous_name.is_none(), "duplicate opcode value 0x{:02x}", value);
            debug_assert!(previous_value.is_none(), "duplicate opcode name {}", name);
        }

        for (alias, op) in aliases() {
            by_name.entry(alias).or_insert(op.to_u8());
        }

        Self { by_name, by_value }
    }
}

lazy_static! {
    static ref REGISTRY: Registry = Registry::build();
}

/// Standard opcodes. Names are never purely numeric so ASM hex tokens cannot
/// collide with a mnemonic.
fn base_opcodes() -> Vec<(&'static str, BitcoinOpcode)> {
    vec![
        // Constants
        ("FALSE", OP_PUSHBYTES_0),
        ("PUSHDATA1", OP_PUSHDATA1),
        ("PUSHDATA2", OP_PUSHDATA2),
        ("PUSHDATA4", OP_PUSHDATA4),
        ("1NEGATE", OP_PUSHNUM_NEG1),
        ("RESERVED", OP_RESERVED),
        ("PUSHNUM_1", OP_PUSHNUM_1),
        ("PUSHNUM_2", OP_PUSHNUM_2),
        ("PUSHNUM_3", OP_PUSHNUM_3),
        ("PUSHNUM_4", OP_PUSHNUM_4),
        ("PUSHNUM_5", OP_PUSHNUM_5),
        ("PUSHNUM_6", OP_PUSHNUM_6),
        ("PUSHNUM_7", OP_PUSHNUM_7),
        ("PUSHNUM_8", OP_PUSHNUM_8),
        ("PUSHNUM_9", OP_PUSHNUM_9),
        ("PUSHNUM_10", OP_PUSHNUM_10),
        ("PUSHNUM_11", OP_PUSHNUM_11),
        ("PUSHNUM_12", OP_PUSHNUM_12),
        ("PUSHNUM_13", OP_PUSHNUM_13),
        ("PUSHNUM_14", OP_PUSHNUM_14),
        ("PUSHNUM_15", OP_PUSHNUM_15),
        ("PUSHNUM_16", OP_PUSHNUM_16),
        // Flow control
        ("NOP", OP_NOP),
        ("VER", OP_VER),
        ("IF", OP_IF),
        ("NOTIF", OP_NOTIF),
        ("VERIF", OP_VERIF),
        ("VERNOTIF", OP_VERNOTIF),
        ("ELSE", OP_ELSE),
        ("ENDIF", OP_ENDIF),
        ("VERIFY", OP_VERIFY),
        ("RETURN", OP_RETURN),
        // Stack
        ("TOALTSTACK", OP_TOALTSTACK),
        ("FROMALTSTACK", OP_FROMALTSTACK),
        ("2DROP", OP_2DROP),
        ("2DUP", OP_2DUP),
        ("3DUP", OP_3DUP),
        ("2OVER", OP_2OVER),
        ("2ROT", OP_2ROT),
        ("2SWAP", OP_2SWAP),
        ("IFDUP", OP_IFDUP),
        ("DEPTH", OP_DEPTH),
        ("DROP", OP_DROP),
        ("DUP", OP_DUP),
        ("NIP", OP_NIP),
        ("OVER", OP_OVER),
        ("PICK", OP_PICK),
        ("ROLL", OP_ROLL),
        ("ROT", OP_ROT),
        ("SWAP", OP_SWAP),
        ("TUCK", OP_TUCK),
        // Splice
        ("CAT", OP_CAT),
        ("SUBSTR", OP_SUBSTR),
        ("LEFT", OP_LEFT),
        ("RIGHT", OP_RIGHT),
        ("SIZE", OP_SIZE),
        // Bitwise logic
        ("INVERT", OP_INVERT),
        ("AND", OP_AND),
        ("OR", OP_OR),
        ("XOR", OP_XOR),
        ("EQUAL", OP_EQUAL),
        ("EQUALVERIFY", OP_EQUALVERIFY),
        ("RESERVED1", OP_RESERVED1),
        ("RESERVED2", OP_RESERVED2),
        // Arithmetic
        ("1ADD", OP_1ADD),
        ("1SUB", OP_1SUB),
        ("2MUL", OP_2MUL),
        ("2DIV", OP_2DIV),
        ("NEGATE", OP_NEGATE),
        ("ABS", OP_ABS),
        ("NOT", OP_NOT),
        ("0NOTEQUAL", OP_0NOTEQUAL),
        ("ADD", OP_ADD),
        ("SUB", OP_SUB),
        ("MUL", OP_MUL),
        ("DIV", OP_DIV),
        ("MOD", OP_MOD),
        ("LSHIFT", OP_LSHIFT),
        ("RSHIFT", OP_RSHIFT),
        ("BOOLAND", OP_BOOLAND),
        ("BOOLOR", OP_BOOLOR),
        ("NUMEQUAL", OP_NUMEQUAL),
        ("NUMEQUALVERIFY", OP_NUMEQUALVERIFY),
        ("NUMNOTEQUAL", OP_NUMNOTEQUAL),
        ("LESSTHAN", OP_LESSTHAN),
        ("GREATERTHAN", OP_GREATERTHAN),
        ("LESSTHANOREQUAL", OP_LESSTHANOREQUAL),
        ("GREATERTHANOREQUAL", OP_GREATERTHANOREQUAL),
        ("MIN", OP_MIN),
        ("MAX", OP_MAX),
        ("WITHIN", OP_WITHIN),
        // Crypto
        ("RIPEMD160", OP_RIPEMD160),
        ("SHA1", OP_SHA1),
        ("SHA256", OP_SHA256),
        ("HASH160", OP_HASH160),
        ("HASH256", OP_HASH256),
        ("CODESEPARATOR", OP_CODESEPARATOR),
        ("CHECKSIG", OP_CHECKSIG),
        ("CHECKSIGVERIFY", OP_CHECKSIGVERIFY),
        ("CHECKMULTISIG", OP_CHECKMULTISIG),
        ("CHECKMULTISIGVERIFY", OP_CHECKMULTISIGVERIFY),
        // Locktime and expansion
        ("NOP1", OP_NOP1),
        ("CHECKLOCKTIMEVERIFY", OP_CLTV),
        ("CHECKSEQUENCEVERIFY", OP_CSV),
        ("NOP4", OP_NOP4),
        ("NOP5", OP_NOP5),
        ("NOP6", OP_NOP6),
        ("NOP7", OP_NOP7),
        ("NOP8", OP_NOP8),
        ("NOP9", OP_NOP9),
        ("NOP10", OP_NOP10),
        ("CHECKSIGADD", OP_CHECKSIGADD),
        ("INVALIDOPCODE", OP_INVALIDOPCODE),
    ]
}

fn extension_opcodes() -> Vec<(&'static str, Opcode)> {
    use self::ext::*;

    vec![
        ("SHA256INITIALIZE", OP_SHA256INITIALIZE),
        ("SHA256UPDATE", OP_SHA256UPDATE),
        ("SHA256FINALIZE", OP_SHA256FINALIZE),
        ("INSPECTINPUTOUTPOINT", OP_INSPECTINPUTOUTPOINT),
        ("INSPECTINPUTARKADESCRIPTHASH", OP_INSPECTINPUTARKADESCRIPTHASH),
        ("INSPECTINPUTVALUE", OP_INSPECTINPUTVALUE),
        ("INSPECTINPUTSCRIPTPUBKEY", OP_INSPECTINPUTSCRIPTPUBKEY),
        ("INSPECTINPUTSEQUENCE", OP_INSPECTINPUTSEQUENCE),
        ("CHECKSIGFROMSTACK", OP_CHECKSIGFROMSTACK),
        ("PUSHCURRENTINPUTINDEX", OP_PUSHCURRENTINPUTINDEX),
        ("INSPECTINPUTARKADEWITNESSHASH", OP_INSPECTINPUTARKADEWITNESSHASH),
        ("INSPECTOUTPUTVALUE", OP_INSPECTOUTPUTVALUE),
        ("CHECKSIGFROMSTACKVERIFY", OP_CHECKSIGFROMSTACKVERIFY),
        ("INSPECTOUTPUTSCRIPTPUBKEY", OP_INSPECTOUTPUTSCRIPTPUBKEY),
        ("INSPECTVERSION", OP_INSPECTVERSION),
        ("INSPECTLOCKTIME", OP_INSPECTLOCKTIME),
        ("INSPECTNUMINPUTS", OP_INSPECTNUMINPUTS),
        ("INSPECTNUMOUTPUTS", OP_INSPECTNUMOUTPUTS),
        ("TXWEIGHT", OP_TXWEIGHT),
        ("ADD64", OP_ADD64),
        ("SUB64", OP_SUB64),
        ("MUL64", OP_MUL64),
        ("DIV64", OP_DIV64),
        ("NEG64", OP_NEG64),
        ("LESSTHAN64", OP_LESSTHAN64),
        ("LESSTHANOREQUAL64", OP_LESSTHANOREQUAL64),
        ("GREATERTHAN64", OP_GREATERTHAN64),
        ("GREATERTHANOREQUAL64", OP_GREATERTHANOREQUAL64),
        ("SCRIPTNUMTOLE64", OP_SCRIPTNUMTOLE64),
        ("LE64TOSCRIPTNUM", OP_LE64TOSCRIPTNUM),
        ("LE32TOLE64", OP_LE32TOLE64),
        ("ECMULSCALARVERIFY", OP_ECMULSCALARVERIFY),
        ("TWEAKVERIFY", OP_TWEAKVERIFY),
    ]
}

/// Accepted on lookup, never produced
fn aliases() -> Vec<(&'static str, BitcoinOpcode)> {
    vec![
        ("TRUE", OP_PUSHNUM_1),
        ("NOP2", OP_CLTV),
        ("CLTV", OP_CLTV),
        ("NOP3", OP_CSV),
        ("CSV", OP_CSV),
    ]
}
