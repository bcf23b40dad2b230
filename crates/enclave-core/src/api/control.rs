use reqwest::Client;
use serde::Serialize;
use tracing::{debug, warn};

use super::error::{error_for_status, ApiError};
use super::wire::{parse_body, KeyNameRequest, MessageBody};
use super::{ControlPlane, KeyOpResult};

const SERVICE: &str = "control plane";

/// Client for the key lifecycle service.
#[derive(Clone)]
pub struct ControlPlaneClient {
    client: Client,
    base_url: String,
}

impl ControlPlaneClient {
    pub fn new(base_url: &str) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint)
    }

    async fn get(&self, endpoint: &str) -> Result<MessageBody, ApiError> {
        let url = self.url(endpoint);
        debug!(%url, "control plane GET");

        let response = self
            .client
            .get(&url)
            .header("Content-Type", "application/json")
            .send()
            .await?;
        Self::read(response).await
    }

    async fn post<B: Serialize>(&self, endpoint: &str, body: &B) -> Result<MessageBody, ApiError> {
        let url = self.url(endpoint);
        debug!(%url, "control plane POST");

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await?;
        Self::read(response).await
    }

    async fn read(response: reqwest::Response) -> Result<MessageBody, ApiError> {
        let response = error_for_status(response, "Error").await?;
        let bytes = response.bytes().await?;
        parse_body(&bytes).map_err(|_| ApiError::Parse { service: SERVICE })
    }

    fn settle(endpoint: &str, result: Result<MessageBody, ApiError>) -> KeyOpResult {
        match result {
            Ok(body) => {
                debug!(endpoint, "control plane call succeeded");
                KeyOpResult::ok(body.message.unwrap_or_default())
            }
            Err(e) => {
                warn!(endpoint, error = %e, "control plane call failed");
                KeyOpResult::failed(e.to_string())
            }
        }
    }
}

impl ControlPlane for ControlPlaneClient {
    async fn create_key_directory(&self) -> KeyOpResult {
        Self::settle("create_key_directory", self.get("create_key_directory").await)
    }

    async fn retrieve_server_key(&self) -> KeyOpResult {
        Self::settle("retrieve_server_key", self.get("retrieve_server_key").await)
    }

    async fn generate_key(&self, key_name: &str) -> KeyOpResult {
        let body = KeyNameRequest { key_name };
        Self::settle("generate_key", self.post("generate_key", &body).await)
    }

    async fn encrypt_key_a(&self) -> KeyOpResult {
        Self::settle("encrypt_key_a", self.get("encrypt_key_a").await)
    }

    async fn send_encrypted_key_a(&self) -> KeyOpResult {
        Self::settle("send_encrypted_key_a", self.get("send_encrypted_key_a").await)
    }

    async fn send_public_key_b(&self) -> KeyOpResult {
        Self::settle("send_public_key_b", self.get("send_public_key_b").await)
    }

    async fn delete_key(&self, key_name: &str) -> KeyOpResult {
        let body = KeyNameRequest { key_name };
        Self::settle("delete_key", self.post("delete_key", &body).await)
    }

    async fn delete_all_keys(&self) -> KeyOpResult {
        Self::settle("delete_all_keys", self.get("delete_all_keys").await)
    }
}
