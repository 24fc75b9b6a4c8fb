//! Space-separated ASM rendering and parsing.
//!
//! Opcodes render as `OP_<NAME>`, small integers as `OP_<n>` and pushes as
//! lowercase hex. Parsing accepts the same forms plus unprefixed mnemonics.

use super::codec::{script_num, ScriptOp};
use super::opcodes::{self, Opcode};
use crate::error::{ScriptError, ScriptResult};

/// Render operations as an ASM string
pub fn to_asm(ops: &[ScriptOp]) -> String {
    ops.iter().map(token).collect::<Vec<_>>().join(" ")
}

/// Parse an ASM string into operations
pub fn from_asm(asm: &str) -> ScriptResult<Vec<ScriptOp>> {
    asm.split_whitespace().map(parse_token).collect()
}

fn token(op: &ScriptOp) -> String {
    match op {
        ScriptOp::Op(opcode) => opcode_token(*opcode),
        ScriptOp::SmallInt(n) if *n <= 16 => format!("OP_{}", n),
        ScriptOp::SmallInt(n) => hex::encode(script_num(*n as i64)),
        ScriptOp::Push(data) if data.is_empty() => "OP_0".to_string(),
        ScriptOp::Push(data) => hex::encode(data),
    }
}

fn opcode_token(opcode: Opcode) -> String {
    let name = opcode.name();
    if name.starts_with("OP_") {
        name.to_string()
    } else {
        format!("OP_{}", name)
    }
}

fn parse_token(token: &str) -> ScriptResult<ScriptOp> {
    if let Some(n) = token.strip_prefix("OP_").and_then(|rest| rest.parse::<u8>().ok()) {
        if n <= 16 {
            return Ok(ScriptOp::SmallInt(n));
        }
    }

    if let Some(value) = opcodes::name_to_value(token) {
        return match Opcode::from_u8(value) {
            Ok(opcode) => Ok(ScriptOp::op(opcode)),
            Err(_) => Err(ScriptError::InvalidAsmToken(token.to_string())),
        };
    }

    if token.len() % 2 == 0 {
        if let Ok(data) = hex::decode(token) {
            return Ok(ScriptOp::push(data));
        }
    }

    Err(ScriptError::InvalidAsmToken(token.to_string()))
}
