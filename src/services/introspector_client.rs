use super::{check_status, endpoint, http_client};
use crate::batch::{FinalizationRequest, FinalizationResponse, IntrospectorProvider};
use crate::config::ClientConfig;
use crate::error::{ArkError, ArkResult};
use async_trait::async_trait;
use log::debug;
use reqwest::Client;

/// Introspector client: submits wallet-signed forfeits and commitment for co-signing
#[derive(Debug, Clone)]
pub struct RestIntrospectorProvider {
    client: Client,
    base_url: String,
}

impl RestIntrospectorProvider {
    pub fn new(config: &ClientConfig) -> ArkResult<Self> {
        Ok(Self {
            client: http_client(config.request_timeout)?,
            base_url: config.introspector_url.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl IntrospectorProvider for RestIntrospectorProvider {
    async fn submit_finalization(
        &self,
        request: &FinalizationRequest,
    ) -> ArkResult<FinalizationResponse> {
        let url = endpoint(&self.base_url, "/v1/finalization");
        debug!(
            "POST {} ({} forfeits, commitment: {})",
            url,
            request.forfeits.len(),
            request.commitment_tx.is_some()
        );

        let response = self.client.post(&url).json(request).send().await?;
        let response = check_status(response).await?;
        response
            .json::<FinalizationResponse>()
            .await
            .map_err(ArkError::from)
    }
}
