use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::error::{error_for_status, ApiError};
use super::wire::{
    parse_body, parse_generate_body, DecryptBody, DecryptRequest, EncryptPromptBody, EncryptedPayload,
    GenerateOutcome, GenerateRequest, PromptRequest,
};
use super::{ChatResponse, DataPlane, Progress};
use crate::stage::PipelineHop;

/// Client for the chat pipeline. Encryption and decryption live on the
/// crypto host, generation on the TEE host; the two may be the same.
#[derive(Clone)]
pub struct DataPlaneClient {
    client: Client,
    crypto_url: String,
    tee_url: String,
}

/// Artifacts of a pipeline run where every hop succeeded.
#[derive(Debug)]
struct PipelineOutput {
    encrypted_prompt: EncryptedPayload,
    encrypted_response: EncryptedPayload,
    decrypted_response: String,
}

impl DataPlaneClient {
    pub fn new(crypto_url: &str, tee_url: &str) -> Self {
        Self::with_client(Client::new(), crypto_url, tee_url)
    }

    pub fn with_client(client: Client, crypto_url: &str, tee_url: &str) -> Self {
        Self {
            client,
            crypto_url: crypto_url.trim_end_matches('/').to_string(),
            tee_url: tee_url.trim_end_matches('/').to_string(),
        }
    }

    async fn post_json<B: Serialize>(&self, url: &str, body: &B, error_prefix: &str) -> Result<Vec<u8>, ApiError> {
        let (_, bytes) = self.post_json_typed(url, body, error_prefix).await?;
        Ok(bytes)
    }

    /// Like `post_json`, also returning the response `Content-Type`.
    async fn post_json_typed<B: Serialize>(
        &self,
        url: &str,
        body: &B,
        error_prefix: &str,
    ) -> Result<(Option<String>, Vec<u8>), ApiError> {
        debug!(%url, "data plane POST");
        let response = self.client.post(url).json(body).send().await?;
        let response = error_for_status(response, error_prefix).await?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        Ok((content_type, response.bytes().await?.to_vec()))
    }

    async fn encrypt_prompt(&self, prompt: &str) -> Result<EncryptedPayload, ApiError> {
        let url = format!("{}/encrypt_prompt", self.crypto_url);
        let bytes = self.post_json(&url, &PromptRequest { prompt }, "Encryption error").await?;

        let body: EncryptPromptBody = parse_body(&bytes)
            .map_err(|_| ApiError::Parse { service: "encryption service" })?;
        match body.encrypted_prompt {
            Some(payload) if !payload.is_empty() => Ok(payload),
            _ => Err(ApiError::Rejected(
                body.message.unwrap_or_else(|| "Failed to encrypt prompt".to_string()),
            )),
        }
    }

    async fn generate(&self, encrypted_prompt: &EncryptedPayload) -> Result<EncryptedPayload, ApiError> {
        let url = format!("{}/generate_text", self.tee_url);
        let (content_type, bytes) = self
            .post_json_typed(&url, &GenerateRequest { encrypted_prompt }, "TEE error")
            .await?;

        match parse_generate_body(content_type.as_deref(), &bytes) {
            GenerateOutcome::Payload(payload) => Ok(payload),
            GenerateOutcome::Missing(None) => Err(ApiError::Parse { service: "TEE service" }),
            GenerateOutcome::Missing(Some(message)) => Err(ApiError::Rejected(message)),
        }
    }

    async fn decrypt(&self, encrypted_response: &EncryptedPayload) -> Result<String, ApiError> {
        let url = format!("{}/decrypt_response", self.crypto_url);
        let bytes = self
            .post_json(&url, &DecryptRequest { encrypted_response }, "Decryption error")
            .await?;

        let body: DecryptBody = parse_body(&bytes)
            .map_err(|_| ApiError::Parse { service: "decryption service" })?;
        body.decrypted_response.ok_or_else(|| {
            ApiError::Rejected(body.message.unwrap_or_else(|| "Failed to decrypt response".to_string()))
        })
    }

    async fn run_pipeline(&self, prompt: &str, progress: &Progress) -> Result<PipelineOutput, ApiError> {
        let encrypted_prompt = self.encrypt_prompt(prompt).await?;
        progress.report(PipelineHop::PromptEncrypted);

        let encrypted_response = self.generate(&encrypted_prompt).await?;
        progress.report(PipelineHop::ResponseGenerated);

        progress.report(PipelineHop::DecryptStarted);
        let decrypted_response = self.decrypt(&encrypted_response).await?;

        Ok(PipelineOutput {
            encrypted_prompt,
            encrypted_response,
            decrypted_response,
        })
    }
}

impl DataPlane for DataPlaneClient {
    async fn encrypt_and_send_prompt(&self, prompt: &str, progress: Progress) -> ChatResponse {
        match self.run_pipeline(prompt, &progress).await {
            Ok(output) => {
                info!(turn = progress.turn(), "chat pipeline completed");
                ChatResponse::completed(
                    &output.encrypted_prompt,
                    &output.encrypted_response,
                    output.decrypted_response,
                )
            }
            Err(e) => {
                warn!(turn = progress.turn(), error = %e, "chat pipeline failed, using simulated response");
                ChatResponse::fallback(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_services_fall_back() {
        let client = DataPlaneClient::new("http://127.0.0.1:9/api", "http://127.0.0.1:9");
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let response = client.encrypt_and_send_prompt("hello", Progress::new(1, tx)).await;

        assert!(!response.success);
        assert!(response.simulated);
        assert!(response.message.is_some());
        // first hop never completed, so no progress was reported
        assert!(rx.try_recv().is_err());
    }
}
