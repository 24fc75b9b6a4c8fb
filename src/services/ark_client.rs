use super::{check_status, endpoint, http_client};
use crate::batch::{ArkProvider, ServerInfo, TreeNonces, TreePartialSigs};
use crate::config::ClientConfig;
use crate::error::{ArkError, ArkResult};
use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfirmRegistrationRequest<'a> {
    intent_id: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitNoncesRequest<'a> {
    batch_id: &'a str,
    pubkey: &'a str,
    tree_nonces: &'a TreeNonces,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitSignaturesRequest<'a> {
    batch_id: &'a str,
    pubkey: &'a str,
    tree_signatures: &'a TreePartialSigs,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitForfeitsRequest<'a> {
    signed_forfeit_txs: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    signed_commitment_tx: Option<&'a str>,
}

/// Round coordinator client over its JSON REST gateway
#[derive(Debug, Clone)]
pub struct RestArkProvider {
    client: Client,
    base_url: String,
}

impl RestArkProvider {
    pub fn new(config: &ClientConfig) -> ArkResult<Self> {
        Ok(Self {
            client: http_client(config.request_timeout)?,
            base_url: config.ark_server_url.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> ArkResult<()> {
        let url = endpoint(&self.base_url, path);
        debug!("POST {}", url);
        let response = self.client.post(&url).json(body).send().await?;
        check_status(response).await?;
        Ok(())
    }
}

#[async_trait]
impl ArkProvider for RestArkProvider {
    async fn get_info(&self) -> ArkResult<ServerInfo> {
        let url = endpoint(&self.base_url, "/v1/info");
        debug!("GET {}", url);
        let response = check_status(self.client.get(&url).send().await?).await?;
        response.json::<ServerInfo>().await.map_err(ArkError::from)
    }

    async fn confirm_registration(&self, intent_id: &str) -> ArkResult<()> {
        self.post("/v1/batch/ack", &ConfirmRegistrationRequest { intent_id })
            .await
    }

    async fn submit_tree_nonces(
        &self,
        batch_id: &str,
        pubkey: &str,
        nonces: &TreeNonces,
    ) -> ArkResult<()> {
        let body = SubmitNoncesRequest {
            batch_id,
            pubkey,
            tree_nonces: nonces,
        };
        self.post("/v1/batch/tree/submitNonces", &body).await
    }

    async fn submit_tree_signatures(
        &self,
        batch_id: &str,
        pubkey: &str,
        signatures: &TreePartialSigs,
    ) -> ArkResult<()> {
        let body = SubmitSignaturesRequest {
            batch_id,
            pubkey,
            tree_signatures: signatures,
        };
        self.post("/v1/batch/tree/submitSignatures", &body).await
    }

    async fn submit_signed_forfeit_txs(
        &self,
        forfeits: &[String],
        commitment_tx: Option<&str>,
    ) -> ArkResult<()> {
        let body = SubmitForfeitsRequest {
            signed_forfeit_txs: forfeits,
            signed_commitment_tx: commitment_tx,
        };
        self.post("/v1/batch/submitForfeitTxs", &body).await
    }
}
