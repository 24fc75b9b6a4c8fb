//! # Configuration Constants
//!
//! Protocol constants shared with the coordinator and the introspector, network
//! defaults, and the environment-backed [`ClientConfig`].

use std::time::Duration;

/// Protocol constants
///
/// These values are part of the wire contract: the introspector recomputes key
/// tweaks and reads PSBT fields using the same constants.
pub mod protocol {
    /// Domain tag for the script-binding tagged hash.
    ///
    /// `tweak = taggedHash(SCRIPT_HASH_TAG, embedded_script)`; both the wallet and
    /// the introspector must agree on this tag byte for byte.
    pub const SCRIPT_HASH_TAG: &str = "ArkScriptHash";

    /// Proprietary PSBT key prefix for Arkade fields
    pub const PSBT_PROPRIETARY_PREFIX: &[u8] = b"arkade";

    /// Proprietary PSBT subtype carrying the raw embedded script of an input
    pub const PSBT_EMBEDDED_SCRIPT_SUBTYPE: u8 = 0x01;

    /// BIP-68 boundary: relative lock values below this are block counts,
    /// values at or above it are seconds
    pub const CSV_SECONDS_THRESHOLD: u64 = 512;

    /// Pay-to-anchor script (`OP_1 <0x4e73>`) used as the forfeit fee anchor
    pub const P2A_SCRIPT: [u8; 4] = [0x51, 0x02, 0x4e, 0x73];

    /// Forfeit transactions are version 3 (TRUC) so the anchor can be spent by CPFP
    pub const FORFEIT_TX_VERSION: i32 = 3;
}

/// Network configuration
pub mod network {
    use std::time::Duration;

    /// Default round coordinator (Ark server) endpoint
    pub const DEFAULT_ARK_SERVER_URL: &str = "http://127.0.0.1:7070";

    /// Default introspector endpoint
    pub const DEFAULT_INTROSPECTOR_URL: &str = "http://127.0.0.1:7073";

    /// Request timeout for network operations
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
}

/// Environment variable names
pub mod env {
    /// Round coordinator URL override
    pub const ARK_SERVER_URL: &str = "ARK_SERVER_URL";

    /// Introspector URL override
    pub const INTROSPECTOR_URL: &str = "ARK_INTROSPECTOR_URL";

    /// Request timeout override, in seconds
    pub const REQUEST_TIMEOUT_SECS: &str = "ARK_REQUEST_TIMEOUT_SECS";
}

/// Endpoints and timeouts used by the HTTP providers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub ark_server_url: String,
    pub introspector_url: String,
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ark_server_url: network::DEFAULT_ARK_SERVER_URL.to_string(),
            introspector_url: network::DEFAULT_INTROSPECTOR_URL.to_string(),
            request_timeout: network::REQUEST_TIMEOUT,
        }
    }
}

impl ClientConfig {
    /// Load configuration from the environment (and `.env`), falling back to defaults
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        let defaults = Self::default();
        let ark_server_url = std::env::var(self::env::ARK_SERVER_URL).unwrap_or(defaults.ark_server_url);
        let introspector_url =
            std::env::var(self::env::INTROSPECTOR_URL).unwrap_or(defaults.introspector_url);
        let request_timeout = std::env::var(self::env::REQUEST_TIMEOUT_SECS)
            .ok()
            .and_then(|secs| secs.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.request_timeout);

        Self {
            ark_server_url: ark_server_url.trim_end_matches('/').to_string(),
            introspector_url: introspector_url.trim_end_matches('/').to_string(),
            request_timeout,
        }
    }
}
