//! # Arkade: Ark Client with Script Introspection
//!
//! Core library for Arkade VTXOs: tapscript extended with introspection and
//! 64-bit arithmetic opcodes, introspector keys tweaked by the script they
//! enforce, and the client side of the batch settlement round.

pub mod batch;
pub mod config;
pub mod error;
pub mod identity;
pub mod psbt_ext;
pub mod script;
pub mod services;
pub mod tapscript;
pub mod tree;
pub mod tweak;
pub mod vtxo_script;

// Re-export commonly used types
pub use batch::{BatchEvent, BatchSettlement, Phase, Step, WalletInput};
pub use error::{ArkError, ArkResult, ScriptError};
pub use identity::{Identity, SingleKeyIdentity};
pub use services::{RestArkProvider, RestIntrospectorProvider};
pub use tapscript::TapscriptTemplate;
pub use vtxo_script::{ArkadeLeaf, VtxoLeaf, VtxoScriptTree};
