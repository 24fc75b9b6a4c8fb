//! # Error Types for the Arkade Client
//!
//! This module provides error handling for script encoding, key tweaking,
//! VTXO tree construction and the batch settlement round.

use thiserror::Error;

/// Main error type for all client operations
#[derive(Debug, Error)]
pub enum ArkError {
    /// Configuration errors during client setup
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Errors during transaction construction or validation
    #[error("Transaction error: {message}")]
    Transaction { message: String },

    /// PSBT parsing, construction or update failures
    #[error("PSBT error: {message}")]
    Psbt { message: String },

    /// Script encoding and decoding failures
    #[error("Script error: {source}")]
    Script {
        #[from]
        source: ScriptError,
    },

    /// Network request failures (coordinator, introspector)
    #[error("Network request failed: {source}")]
    Network {
        #[from]
        source: reqwest::Error,
    },

    /// A service answered with an error status
    #[error("Service error: {source}")]
    Http {
        #[from]
        source: NetworkError,
    },

    /// A datum required by the current phase is absent
    #[error("Missing data: {what}")]
    MissingData { what: String },

    /// Tapscript template of a kind this client cannot encode
    #[error("Unsupported tapscript template: {kind}")]
    UnsupportedTemplate { kind: String },

    /// More settlement inputs than connector leaves
    #[error("Not enough connectors: needed at least {needed}, available {available}")]
    ConnectorsExhausted { needed: usize, available: usize },

    /// Phase handler invoked out of order
    #[error("Invalid batch phase transition from {current} to {requested}")]
    InvalidStateTransition { current: String, requested: String },

    /// The coordinator aborted the round
    #[error("Batch {batch_id} failed: {reason}")]
    RoundFailed { batch_id: String, reason: String },

    /// Cryptographic operation failures
    #[error("Cryptographic operation failed: {message}")]
    Cryptography { message: String },
}

/// Result type alias for client operations
pub type ArkResult<T> = Result<T, ArkError>;

impl ArkError {
    /// Create a configuration error with a message
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a cryptography error with a message
    pub fn crypto(message: impl Into<String>) -> Self {
        Self::Cryptography {
            message: message.into(),
        }
    }

    /// Create a transaction error with a message
    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
        }
    }

    /// Create a PSBT error with a message
    pub fn psbt(message: impl Into<String>) -> Self {
        Self::Psbt {
            message: message.into(),
        }
    }

    /// Create a missing data error naming the absent datum
    pub fn missing(what: impl Into<String>) -> Self {
        Self::MissingData { what: what.into() }
    }

    /// Check if this error is retryable (network/temporary issues).
    ///
    /// Transport failures always are; service replies only for 5xx and 429.
    pub fn is_retryable(&self) -> bool {
        match self {
            ArkError::Network { .. } => true,
            ArkError::Http {
                source: NetworkError::HttpError { status, .. },
            } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Check if this error forces the wallet to abandon the current round.
    ///
    /// Every error raised by a phase handler aborts the round; the wallet rejoins
    /// on the next announcement. Only configuration problems survive the round.
    pub fn aborts_round(&self) -> bool {
        !matches!(self, ArkError::Configuration { .. })
    }
}

impl From<bitcoin::psbt::Error> for ArkError {
    fn from(err: bitcoin::psbt::Error) -> Self {
        ArkError::psbt(err.to_string())
    }
}

impl From<bitcoin::psbt::PsbtParseError> for ArkError {
    fn from(err: bitcoin::psbt::PsbtParseError) -> Self {
        ArkError::psbt(err.to_string())
    }
}

impl From<bitcoin::secp256k1::Error> for ArkError {
    fn from(err: bitcoin::secp256k1::Error) -> Self {
        ArkError::crypto(err.to_string())
    }
}

/// Script codec errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    /// Opcode byte with no registered mnemonic
    #[error("unknown opcode 0x{0:02x}")]
    UnknownOpcode(u8),

    /// Mnemonic with no registered opcode
    #[error("unknown opcode name: {0}")]
    UnknownOpcodeName(String),

    /// ASM token that is neither an opcode, a small integer nor hex
    #[error("invalid ASM token: {0}")]
    InvalidAsmToken(String),

    /// Push length prefix points past the end of the script
    #[error("malformed push at offset {offset}: needed {needed} bytes, {available} available")]
    TruncatedPush {
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// Data push opcodes cannot be used as standalone operations
    #[error("opcode 0x{0:02x} is a data push, not an operation")]
    PushOpcode(u8),

    /// Small integer outside 0..=16
    #[error("small integer out of range: {0}")]
    SmallIntOutOfRange(i64),
}

/// Result type alias for script codec operations
pub type ScriptResult<T> = Result<T, ScriptError>;

/// Network client specific errors
#[derive(Debug, Error)]
pub enum NetworkError {
    /// HTTP request failures
    #[error("HTTP request failed: {status} - {message}")]
    HttpError { status: u16, message: String },
}
