//! # Arkade Script
//!
//! Opcode registry and script codec for tapscript extended with the Arkade
//! introspection and 64-bit arithmetic opcodes.
//!
//! ```
//! use arkade::script::{decode, encode, from_asm, to_asm};
//!
//! let ops = from_asm("OP_DUP OP_ADD64").unwrap();
//! assert_eq!(encode(&ops), vec![0x76, 0xd7]);
//! assert_eq!(to_asm(&decode(&[0x76, 0xd7]).unwrap()), "OP_DUP OP_ADD64");
//! ```

pub mod asm;
pub mod codec;
pub mod opcodes;

pub use asm::{from_asm, to_asm};
pub use codec::{decode, encode, encode_script, script_num, ScriptOp};
pub use opcodes::{Opcode, OpcodeRange};
