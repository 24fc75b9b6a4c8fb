//! # Services Module
//!
//! HTTP clients for the services a settlement round talks to.
//!
//! ## Components
//!
//! - **Ark Client**: round coordinator RPCs (info, registration, tree signing, forfeits)
//! - **Introspector Client**: finalization co-signing

pub mod ark_client;
pub mod introspector_client;

pub use ark_client::RestArkProvider;
pub use introspector_client::RestIntrospectorProvider;

use crate::error::{ArkError, ArkResult, NetworkError};
use reqwest::{Client, Response};
use std::time::Duration;

/// Build an HTTP client with the configured request timeout
pub(crate) fn http_client(timeout: Duration) -> ArkResult<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ArkError::config(format!("failed to build HTTP client: {}", e)))
}

/// Join a base URL and an endpoint path
pub(crate) fn endpoint(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Turn a non-2xx response into [`NetworkError::HttpError`]
pub(crate) async fn check_status(response: Response) -> ArkResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(NetworkError::HttpError {
        status: status.as_u16(),
        message,
    }
    .into())
}
