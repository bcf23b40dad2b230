//! Remote API client for the control plane (key lifecycle) and the data
//! plane (encrypt → generate in TEE → decrypt).
//!
//! Every operation issues plain request/response HTTP calls with no retries
//! and never fails past its own boundary: errors come back as
//! failure-shaped [`KeyOpResult`] or [`ChatResponse`] values.

pub mod control;
pub mod data;
pub mod error;
pub mod wire;

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use reqwest::Client;
use tokio::sync::mpsc::UnboundedSender;

use crate::stage::{PipelineEvent, PipelineHop, TurnId};

pub use control::ControlPlaneClient;
pub use data::DataPlaneClient;
pub use error::ApiError;
pub use wire::EncryptedPayload;

/// Shown in place of the prompt ciphertext when no real artifact exists.
pub const PLACEHOLDER_ENCRYPTED_PROMPT: &str =
    "[0x8f, 0x3a, 0xd2, 0xf7, 0x5b, 0xe2, 0x9c, 0x1a, 0x6b, 0x4d, 0x0e, 0xc8, 0x7f, 0x2b, 0xaa, 0x95...]";
/// Shown in place of the response ciphertext when no real artifact exists.
pub const PLACEHOLDER_ENCRYPTED_RESPONSE: &str =
    "[0xc4, 0x7b, 0xf1, 0x2a, 0x9e, 0x5d, 0x0f, 0x3b, 0xa2, 0x6c, 0x8d, 0x4e, 0xb5, 0x1f, 0xd3, 0x70...]";
/// Assistant text used when one of the pipeline hops failed.
pub const CONNECTION_APOLOGY: &str = "I'm sorry, I couldn't process your message due to a connection issue. \
Please try again or check your network connection.";

/// Outcome of a control-plane call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyOpResult {
    pub success: bool,
    pub message: String,
}

impl KeyOpResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self { success: true, message: message.into() }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self { success: false, message: message.into() }
    }
}

/// Outcome of the three-hop chat pipeline.
///
/// Digests are display strings, not the ciphertext itself. When `simulated`
/// is set, the digests are placeholders and `decrypted_response` is a canned
/// apology.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatResponse {
    pub success: bool,
    pub encrypted_prompt_digest: String,
    pub encrypted_response_digest: String,
    pub decrypted_response: String,
    pub simulated: bool,
    pub message: Option<String>,
}

impl ChatResponse {
    pub fn completed(
        encrypted_prompt: &EncryptedPayload,
        encrypted_response: &EncryptedPayload,
        decrypted_response: String,
    ) -> Self {
        Self {
            success: true,
            encrypted_prompt_digest: encrypted_prompt.digest(),
            encrypted_response_digest: encrypted_response.digest(),
            decrypted_response,
            simulated: false,
            message: None,
        }
    }

    /// Stand-in envelope so the timeline can still be rendered after a failed hop.
    pub fn fallback(message: impl Into<String>) -> Self {
        Self {
            success: false,
            encrypted_prompt_digest: PLACEHOLDER_ENCRYPTED_PROMPT.to_string(),
            encrypted_response_digest: PLACEHOLDER_ENCRYPTED_RESPONSE.to_string(),
            decrypted_response: CONNECTION_APOLOGY.to_string(),
            simulated: true,
            message: Some(message.into()),
        }
    }
}

/// Reports pipeline hops for one turn. Sends are best-effort: a dropped
/// receiver just means nobody is watching the indicator.
#[derive(Debug, Clone)]
pub struct Progress {
    turn: TurnId,
    tx: Option<UnboundedSender<PipelineEvent>>,
}

impl Progress {
    pub fn new(turn: TurnId, tx: UnboundedSender<PipelineEvent>) -> Self {
        Self { turn, tx: Some(tx) }
    }

    pub fn silent(turn: TurnId) -> Self {
        Self { turn, tx: None }
    }

    pub fn turn(&self) -> TurnId {
        self.turn
    }

    pub fn report(&self, hop: PipelineHop) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(PipelineEvent { turn: self.turn, hop });
        }
    }
}

/// Key lifecycle operations.
pub trait ControlPlane: Send + Sync {
    fn create_key_directory(&self) -> impl Future<Output = KeyOpResult> + Send;
    fn retrieve_server_key(&self) -> impl Future<Output = KeyOpResult> + Send;
    fn generate_key(&self, key_name: &str) -> impl Future<Output = KeyOpResult> + Send;
    fn encrypt_key_a(&self) -> impl Future<Output = KeyOpResult> + Send;
    fn send_encrypted_key_a(&self) -> impl Future<Output = KeyOpResult> + Send;
    fn send_public_key_b(&self) -> impl Future<Output = KeyOpResult> + Send;
    fn delete_key(&self, key_name: &str) -> impl Future<Output = KeyOpResult> + Send;
    fn delete_all_keys(&self) -> impl Future<Output = KeyOpResult> + Send;
}

/// The encrypted chat pipeline.
pub trait DataPlane: Send + Sync {
    fn encrypt_and_send_prompt(
        &self,
        prompt: &str,
        progress: Progress,
    ) -> impl Future<Output = ChatResponse> + Send;
}

/// Shared reqwest client; no timeout unless one is configured.
pub fn http_client(timeout: Option<Duration>) -> Result<Client> {
    let mut builder = Client::builder();
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    Ok(builder.build()?)
}
