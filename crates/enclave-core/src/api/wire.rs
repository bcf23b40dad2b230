//! JSON bodies exchanged with the control plane and the data plane.
//!
//! The services are loose about envelopes (`success` vs `status`, optional
//! `message`), so every response field is optional and presence of the
//! artifact is what counts.

use serde::{Deserialize, Serialize};

/// Characters of a text artifact shown before truncating.
const TEXT_PREVIEW_CHARS: usize = 64;
/// Bytes of a binary artifact shown before truncating.
const BYTE_PREVIEW_LEN: usize = 16;

#[derive(Serialize)]
pub(crate) struct KeyNameRequest<'a> {
    pub key_name: &'a str,
}

#[derive(Serialize)]
pub(crate) struct PromptRequest<'a> {
    pub prompt: &'a str,
}

#[derive(Serialize)]
pub(crate) struct GenerateRequest<'a> {
    pub encrypted_prompt: &'a EncryptedPayload,
}

#[derive(Serialize)]
pub(crate) struct DecryptRequest<'a> {
    pub encrypted_response: &'a EncryptedPayload,
}

/// Generic `{status, message}` answer of the control plane.
#[derive(Deserialize, Default, Debug)]
pub(crate) struct MessageBody {
    #[allow(dead_code)]
    pub status: Option<String>,
    pub message: Option<String>,
}

#[derive(Deserialize, Default, Debug)]
pub(crate) struct EncryptPromptBody {
    pub encrypted_prompt: Option<EncryptedPayload>,
    pub message: Option<String>,
}

#[derive(Deserialize, Default, Debug)]
pub(crate) struct GenerateBody {
    pub encrypted_response: Option<EncryptedPayload>,
    pub message: Option<String>,
}

#[derive(Deserialize, Default, Debug)]
pub(crate) struct DecryptBody {
    pub decrypted_response: Option<String>,
    pub message: Option<String>,
}

/// Ciphertext as the services hand it around: base64 text in the JSON
/// variant, a plain byte buffer in the raw variant. It is forwarded in the
/// same shape it arrived in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EncryptedPayload {
    Text(String),
    Bytes(Vec<u8>),
}

impl EncryptedPayload {
    pub fn is_empty(&self) -> bool {
        match self {
            EncryptedPayload::Text(text) => text.is_empty(),
            EncryptedPayload::Bytes(bytes) => bytes.is_empty(),
        }
    }

    /// Short display form for the chat log.
    pub fn digest(&self) -> String {
        match self {
            EncryptedPayload::Text(text) => {
                if text.chars().count() > TEXT_PREVIEW_CHARS {
                    let head: String = text.chars().take(TEXT_PREVIEW_CHARS).collect();
                    format!("{}...", head)
                } else {
                    text.clone()
                }
            }
            EncryptedPayload::Bytes(bytes) => byte_preview(bytes),
        }
    }
}

/// `[0x8f, 0x3a, ...]` rendering of the first bytes of a buffer.
pub fn byte_preview(bytes: &[u8]) -> String {
    let shown: Vec<String> = bytes
        .iter()
        .take(BYTE_PREVIEW_LEN)
        .map(|b| format!("0x{:02x}", b))
        .collect();
    let ellipsis = if bytes.len() > BYTE_PREVIEW_LEN { "..." } else { "" };
    format!("[{}{}]", shown.join(", "), ellipsis)
}

/// Decode a JSON body, treating an empty body as `{}`.
pub(crate) fn parse_body<T>(bytes: &[u8]) -> Result<T, serde_json::Error>
where
    T: for<'de> Deserialize<'de> + Default,
{
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(bytes)
}

/// The TEE answers either with JSON carrying `encrypted_response` or with
/// the raw ciphertext bytes.
pub(crate) enum GenerateOutcome {
    Payload(EncryptedPayload),
    Missing(Option<String>),
}

fn is_octet_stream(content_type: Option<&str>) -> bool {
    content_type
        .and_then(|ct| ct.split(';').next())
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/octet-stream"))
}

/// An `application/octet-stream` body is ciphertext even when it happens to
/// look like JSON. Anything else is tried as JSON first.
pub(crate) fn parse_generate_body(content_type: Option<&str>, bytes: &[u8]) -> GenerateOutcome {
    if is_octet_stream(content_type) {
        return if bytes.is_empty() {
            GenerateOutcome::Missing(None)
        } else {
            GenerateOutcome::Payload(EncryptedPayload::Bytes(bytes.to_vec()))
        };
    }

    match serde_json::from_slice::<GenerateBody>(bytes) {
        Ok(GenerateBody { encrypted_response: Some(payload), .. }) => GenerateOutcome::Payload(payload),
        Ok(GenerateBody { message, .. }) => GenerateOutcome::Missing(message),
        Err(_) if bytes.is_empty() => GenerateOutcome::Missing(None),
        Err(_) => GenerateOutcome::Payload(EncryptedPayload::Bytes(bytes.to_vec())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_digest_is_verbatim() {
        assert_eq!(EncryptedPayload::Text("E1".to_string()).digest(), "E1");
    }

    #[test]
    fn test_long_text_digest_is_truncated() {
        let long = "A".repeat(100);
        let digest = EncryptedPayload::Text(long).digest();
        assert_eq!(digest.len(), 67);
        assert!(digest.ends_with("..."));
    }

    #[test]
    fn test_byte_preview() {
        assert_eq!(byte_preview(&[]), "[]");
        assert_eq!(byte_preview(&[0x8f, 0x3a]), "[0x8f, 0x3a]");

        let bytes: Vec<u8> = (0..20).collect();
        let preview = byte_preview(&bytes);
        assert!(preview.starts_with("[0x00, 0x01"));
        assert!(preview.ends_with("0x0f...]"));
    }

    #[test]
    fn test_payload_shapes_on_the_wire() {
        let text: EncryptedPayload = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(text, EncryptedPayload::Text("abc".to_string()));

        let bytes: EncryptedPayload = serde_json::from_str("[1, 2, 255]").unwrap();
        assert_eq!(bytes, EncryptedPayload::Bytes(vec![1, 2, 255]));

        let body = DecryptRequest { encrypted_response: &bytes };
        assert_eq!(serde_json::to_string(&body).unwrap(), r#"{"encrypted_response":[1,2,255]}"#);
    }

    #[test]
    fn test_empty_body_parses_as_default() {
        let body: MessageBody = parse_body(b"").unwrap();
        assert!(body.message.is_none());
        let body: MessageBody = parse_body(b"  \n").unwrap();
        assert!(body.message.is_none());
        assert!(parse_body::<MessageBody>(b"<html>").is_err());
    }

    #[test]
    fn test_encrypt_body_accepts_both_envelopes() {
        let plain: EncryptPromptBody = parse_body(br#"{"encrypted_prompt": "E1"}"#).unwrap();
        assert_eq!(plain.encrypted_prompt, Some(EncryptedPayload::Text("E1".to_string())));

        let wrapped: EncryptPromptBody =
            parse_body(br#"{"status": "success", "success": true, "encrypted_prompt": "E1"}"#).unwrap();
        assert_eq!(wrapped.encrypted_prompt, Some(EncryptedPayload::Text("E1".to_string())));
    }

    #[test]
    fn test_generate_body_variants() {
        match parse_generate_body(Some("application/json"), br#"{"encrypted_response": "E2"}"#) {
            GenerateOutcome::Payload(p) => assert_eq!(p, EncryptedPayload::Text("E2".to_string())),
            GenerateOutcome::Missing(_) => panic!("expected payload"),
        }

        match parse_generate_body(None, &[0xc4, 0x7b, 0xf1]) {
            GenerateOutcome::Payload(p) => assert_eq!(p, EncryptedPayload::Bytes(vec![0xc4, 0x7b, 0xf1])),
            GenerateOutcome::Missing(_) => panic!("expected raw bytes"),
        }

        match parse_generate_body(Some("application/json"), br#"{"status": "error", "message": "Key B public key not found."}"#) {
            GenerateOutcome::Missing(msg) => assert_eq!(msg.as_deref(), Some("Key B public key not found.")),
            GenerateOutcome::Payload(_) => panic!("expected missing"),
        }

        assert!(matches!(parse_generate_body(None, b""), GenerateOutcome::Missing(None)));
    }

    #[test]
    fn test_octet_stream_is_never_read_as_json() {
        let body = br#"{"x":1}"#;
        match parse_generate_body(Some("application/octet-stream"), body) {
            GenerateOutcome::Payload(p) => assert_eq!(p, EncryptedPayload::Bytes(body.to_vec())),
            GenerateOutcome::Missing(_) => panic!("expected raw bytes"),
        }

        // parameters and case do not matter
        let outcome = parse_generate_body(Some("Application/Octet-Stream; charset=binary"), br#"{"encrypted_response": "E2"}"#);
        assert!(matches!(outcome, GenerateOutcome::Payload(EncryptedPayload::Bytes(_))));

        assert!(matches!(
            parse_generate_body(Some("application/octet-stream"), b""),
            GenerateOutcome::Missing(None)
        ));

        // without the header the same body is a JSON object lacking the field
        assert!(matches!(parse_generate_body(None, body), GenerateOutcome::Missing(None)));
    }
}
