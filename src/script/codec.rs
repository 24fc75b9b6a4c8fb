//! # Script Codec
//!
//! Conversion between structured script operations and raw script bytes.
//!
//! Small integers (0..=16) are normalized to [`ScriptOp::SmallInt`] on both
//! construction and decoding, so `decode(encode(ops)) == ops` holds for any
//! script built through the [`ScriptOp`] constructors.

use super::opcodes::{self, Opcode};
use crate::error::{ScriptError, ScriptResult};
use bitcoin::opcodes::all::{OP_PUSHDATA1, OP_PUSHDATA2, OP_PUSHDATA4, OP_PUSHNUM_1, OP_PUSHNUM_16};
use bitcoin::ScriptBuf;

/// A single script operation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScriptOp {
    /// Non-push opcode (base or extension)
    Op(Opcode),
    /// Small integer, encoded as `OP_0` or `OP_1..OP_16`
    SmallInt(u8),
    /// Data push with minimal length prefix.
    ///
    /// An empty payload is the `OP_0` byte and decodes as `SmallInt(0)`; build
    /// pushes with [`ScriptOp::push`] to get the normalized form up front.
    Push(Vec<u8>),
}

impl ScriptOp {
    /// Wrap an opcode, normalizing `OP_0` and `OP_1..OP_16` to small integers
    pub fn op(opcode: Opcode) -> Self {
        match opcode.value() {
            0x00 => ScriptOp::SmallInt(0),
            v if (OP_PUSHNUM_1.to_u8()..=OP_PUSHNUM_16.to_u8()).contains(&v) => {
                ScriptOp::SmallInt(v - 0x50)
            }
            _ => ScriptOp::Op(opcode),
        }
    }

    /// Look up an opcode by mnemonic
    pub fn named(name: &str) -> ScriptResult<Self> {
        Opcode::from_name(name).map(Self::op)
    }

    pub fn small_int(n: u8) -> ScriptResult<Self> {
        if n > 16 {
            return Err(ScriptError::SmallIntOutOfRange(n as i64));
        }
        Ok(ScriptOp::SmallInt(n))
    }

    /// Numeric literal: small integers use the dedicated opcodes, anything else
    /// is pushed as a minimally encoded script number
    pub fn number(n: i64) -> Self {
        if (0..=16).contains(&n) {
            ScriptOp::SmallInt(n as u8)
        } else {
            ScriptOp::Push(script_num(n))
        }
    }

    /// Data push. An empty push is the same byte as `OP_0` and becomes `SmallInt(0)`.
    pub fn push(data: impl Into<Vec<u8>>) -> Self {
        let data = data.into();
        if data.is_empty() {
            ScriptOp::SmallInt(0)
        } else {
            ScriptOp::Push(data)
        }
    }
}

impl From<Opcode> for ScriptOp {
    fn from(opcode: Opcode) -> Self {
        ScriptOp::op(opcode)
    }
}

/// Minimal script-number encoding (little-endian, sign bit in the last byte)
pub fn script_num(n: i64) -> Vec<u8> {
    if n == 0 {
        return Vec::new();
    }

    let negative = n < 0;
    let mut abs = n.unsigned_abs();
    let mut bytes = Vec::with_capacity(9);
    while abs > 0 {
        bytes.push((abs & 0xff) as u8);
        abs >>= 8;
    }

    // bytes is non-empty since n != 0
    let last = bytes.len() - 1;
    if bytes[last] & 0x80 != 0 {
        bytes.push(if negative { 0x80 } else { 0x00 });
    } else if negative {
        bytes[last] |= 0x80;
    }
    bytes
}

/// Serialize operations to raw script bytes
pub fn encode(ops: &[ScriptOp]) -> Vec<u8> {
    let mut out = Vec::new();
    for op in ops {
        match op {
            ScriptOp::Op(opcode) => out.push(opcode.value()),
            ScriptOp::SmallInt(0) => out.push(0x00),
            ScriptOp::SmallInt(n) if *n <= 16 => out.push(0x50 + n),
            ScriptOp::SmallInt(n) => write_push(&mut out, &script_num(*n as i64)),
            ScriptOp::Push(data) => write_push(&mut out, data),
        }
    }
    out
}

/// Serialize operations into a [`ScriptBuf`]
pub fn encode_script(ops: &[ScriptOp]) -> ScriptBuf {
    ScriptBuf::from_bytes(encode(ops))
}

fn write_push(out: &mut Vec<u8>, data: &[u8]) {
    let len = data.len();
    if len == 0 {
        out.push(0x00);
        return;
    }
    if len <= opcodes::MAX_DIRECT_PUSH as usize {
        out.push(len as u8);
    } else if len <= 0xff {
        out.push(OP_PUSHDATA1.to_u8());
        out.push(len as u8);
    } else if len <= 0xffff {
        out.push(OP_PUSHDATA2.to_u8());
        out.extend_from_slice(&(len as u16).to_le_bytes());
    } else {
        out.push(OP_PUSHDATA4.to_u8());
        out.extend_from_slice(&(len as u32).to_le_bytes());
    }
    out.extend_from_slice(data);
}

/// Parse raw script bytes into operations
pub fn decode(bytes: &[u8]) -> ScriptResult<Vec<ScriptOp>> {
    let mut ops = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let offset = pos;
        let byte = bytes[pos];
        pos += 1;

        let op = match byte {
            0x00 => ScriptOp::SmallInt(0),
            0x01..=0x4b => {
                let data = take(bytes, &mut pos, byte as usize, offset)?;
                ScriptOp::Push(data.to_vec())
            }
            b if b == OP_PUSHDATA1.to_u8() => {
                let len = read_len(bytes, &mut pos, 1, offset)?;
                ScriptOp::Push(take(bytes, &mut pos, len, offset)?.to_vec())
            }
            b if b == OP_PUSHDATA2.to_u8() => {
                let len = read_len(bytes, &mut pos, 2, offset)?;
                ScriptOp::Push(take(bytes, &mut pos, len, offset)?.to_vec())
            }
            b if b == OP_PUSHDATA4.to_u8() => {
                let len = read_len(bytes, &mut pos, 4, offset)?;
                ScriptOp::Push(take(bytes, &mut pos, len, offset)?.to_vec())
            }
            0x51..=0x60 => ScriptOp::SmallInt(byte - 0x50),
            _ => ScriptOp::Op(Opcode::from_u8(byte)?),
        };
        ops.push(op);
    }

    Ok(ops)
}

fn read_len(bytes: &[u8], pos: &mut usize, width: usize, offset: usize) -> ScriptResult<usize> {
    let raw = take(bytes, pos, width, offset)?;
    let mut buf = [0u8; 4];
    buf[..width].copy_from_slice(raw);
    Ok(u32::from_le_bytes(buf) as usize)
}

fn take<'a>(bytes: &'a [u8], pos: &mut usize, needed: usize, offset: usize) -> ScriptResult<&'a [u8]> {
    let available = bytes.len() - *pos;
    if needed > available {
        return Err(ScriptError::TruncatedPush {
            offset,
            needed,
            available,
        });
    }
    let slice = &bytes[*pos..*pos + needed];
    *pos += needed;
    Ok(slice)
}
