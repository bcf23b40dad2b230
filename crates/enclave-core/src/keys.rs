//! Key-provisioning lifecycle.
//!
//! ```text
//! idle → dir-created → server-key-retrieved → {keyA-generated → keyA-encrypted → keyA-sent}
//!                                            → {keyB-generated → keyB-sent}
//! ```
//!
//! The flags themselves are independent booleans; ordering is enforced by
//! [`KeyLifecycle::is_enabled`], which front-ends use to disable actions.

use std::fmt;

use crate::api::{ControlPlane, KeyOpResult};

pub const KEY_A: &str = "key_a";
pub const KEY_B: &str = "key_b";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyLifecycle {
    pub directory_created: bool,
    pub server_key_retrieved: bool,
    pub key_a_generated: bool,
    pub key_b_generated: bool,
    pub key_a_encrypted: bool,
    pub key_a_sent: bool,
    pub key_b_sent: bool,
}

/// A user-triggerable key operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyAction {
    CreateDirectory,
    RetrieveServerKey,
    GenerateKeyA,
    EncryptKeyA,
    SendKeyA,
    DeleteKeyA,
    GenerateKeyB,
    SendKeyB,
    DeleteAllKeys,
}

impl KeyAction {
    /// Panel order.
    pub const ALL: [KeyAction; 9] = [
        KeyAction::CreateDirectory,
        KeyAction::RetrieveServerKey,
        KeyAction::GenerateKeyA,
        KeyAction::EncryptKeyA,
        KeyAction::SendKeyA,
        KeyAction::DeleteKeyA,
        KeyAction::GenerateKeyB,
        KeyAction::SendKeyB,
        KeyAction::DeleteAllKeys,
    ];

    /// The happy-path provisioning sequence.
    pub const SETUP: [KeyAction; 7] = [
        KeyAction::CreateDirectory,
        KeyAction::RetrieveServerKey,
        KeyAction::GenerateKeyA,
        KeyAction::EncryptKeyA,
        KeyAction::SendKeyA,
        KeyAction::GenerateKeyB,
        KeyAction::SendKeyB,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            KeyAction::CreateDirectory => "Create Key Directory",
            KeyAction::RetrieveServerKey => "Retrieve Server Key",
            KeyAction::GenerateKeyA => "Generate Key A",
            KeyAction::EncryptKeyA => "Encrypt Key A (Private)",
            KeyAction::SendKeyA => "Send Encrypted Key A",
            KeyAction::DeleteKeyA => "Delete Key A (Private)",
            KeyAction::GenerateKeyB => "Generate Key B",
            KeyAction::SendKeyB => "Send Key B (Public) to TEE",
            KeyAction::DeleteAllKeys => "Delete All Keys",
        }
    }

    /// Shown while the call is in flight.
    pub fn progress_label(&self) -> &'static str {
        match self {
            KeyAction::CreateDirectory => "Creating key directory",
            KeyAction::RetrieveServerKey => "Retrieving server key",
            KeyAction::GenerateKeyA => "Generating Key A",
            KeyAction::EncryptKeyA => "Encrypting Key A",
            KeyAction::SendKeyA => "Sending encrypted Key A",
            KeyAction::DeleteKeyA => "Deleting Key A",
            KeyAction::GenerateKeyB => "Generating Key B",
            KeyAction::SendKeyB => "Sending Key B",
            KeyAction::DeleteAllKeys => "Deleting all keys",
        }
    }

    pub fn success_notice(&self) -> &'static str {
        match self {
            KeyAction::CreateDirectory => "Key directory created successfully",
            KeyAction::RetrieveServerKey => "Server key retrieved successfully",
            KeyAction::GenerateKeyA => "Key A generated successfully",
            KeyAction::EncryptKeyA => "Key A encrypted successfully",
            KeyAction::SendKeyA => "Encrypted Key A sent successfully",
            KeyAction::DeleteKeyA => "Key A deleted successfully",
            KeyAction::GenerateKeyB => "Key B generated successfully",
            KeyAction::SendKeyB => "Key B sent successfully",
            KeyAction::DeleteAllKeys => "All keys deleted successfully",
        }
    }

    pub fn is_destructive(&self) -> bool {
        matches!(self, KeyAction::DeleteKeyA | KeyAction::DeleteAllKeys)
    }

    /// Issue the control-plane call backing this action.
    pub async fn invoke<C: ControlPlane>(self, control: &C) -> KeyOpResult {
        match self {
            KeyAction::CreateDirectory => control.create_key_directory().await,
            KeyAction::RetrieveServerKey => control.retrieve_server_key().await,
            KeyAction::GenerateKeyA => control.generate_key(KEY_A).await,
            KeyAction::EncryptKeyA => control.encrypt_key_a().await,
            KeyAction::SendKeyA => control.send_encrypted_key_a().await,
            KeyAction::DeleteKeyA => control.delete_key(KEY_A).await,
            KeyAction::GenerateKeyB => control.generate_key(KEY_B).await,
            KeyAction::SendKeyB => control.send_public_key_b().await,
            KeyAction::DeleteAllKeys => control.delete_all_keys().await,
        }
    }
}

impl fmt::Display for KeyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl KeyLifecycle {
    /// Whether the prerequisites of `action` hold. Does not consider whether
    /// another action is in flight; the session layers that on top.
    pub fn is_enabled(&self, action: KeyAction) -> bool {
        match action {
            KeyAction::CreateDirectory => !self.directory_created,
            KeyAction::RetrieveServerKey => self.directory_created && !self.server_key_retrieved,
            KeyAction::GenerateKeyA => self.server_key_retrieved && !self.key_a_generated,
            KeyAction::EncryptKeyA => self.key_a_generated && !self.key_a_encrypted,
            KeyAction::SendKeyA => self.key_a_encrypted && !self.key_a_sent,
            KeyAction::DeleteKeyA => self.key_a_generated,
            KeyAction::GenerateKeyB => self.server_key_retrieved && !self.key_b_generated,
            KeyAction::SendKeyB => self.key_b_generated && !self.key_b_sent,
            KeyAction::DeleteAllKeys => self.directory_created,
        }
    }

    /// Whether the flag owned by `action` is already set. Delete actions own
    /// no flag.
    pub fn is_done(&self, action: KeyAction) -> bool {
        match action {
            KeyAction::CreateDirectory => self.directory_created,
            KeyAction::RetrieveServerKey => self.server_key_retrieved,
            KeyAction::GenerateKeyA => self.key_a_generated,
            KeyAction::EncryptKeyA => self.key_a_encrypted,
            KeyAction::SendKeyA => self.key_a_sent,
            KeyAction::GenerateKeyB => self.key_b_generated,
            KeyAction::SendKeyB => self.key_b_sent,
            KeyAction::DeleteKeyA | KeyAction::DeleteAllKeys => false,
        }
    }

    /// Record a successful call.
    pub fn apply_success(&mut self, action: KeyAction) {
        match action {
            KeyAction::CreateDirectory => self.directory_created = true,
            KeyAction::RetrieveServerKey => self.server_key_retrieved = true,
            KeyAction::GenerateKeyA => self.key_a_generated = true,
            KeyAction::EncryptKeyA => self.key_a_encrypted = true,
            KeyAction::SendKeyA => self.key_a_sent = true,
            KeyAction::DeleteKeyA => {
                self.key_a_generated = false;
                self.key_a_encrypted = false;
                self.key_a_sent = false;
            }
            KeyAction::GenerateKeyB => self.key_b_generated = true,
            KeyAction::SendKeyB => self.key_b_sent = true,
            KeyAction::DeleteAllKeys => *self = KeyLifecycle::default(),
        }
    }

    /// Both keys have reached the TEE.
    pub fn keys_delivered(&self) -> bool {
        self.key_a_sent && self.key_b_sent
    }

    pub fn enabled_actions(&self) -> Vec<KeyAction> {
        KeyAction::ALL.iter().copied().filter(|a| self.is_enabled(*a)).collect()
    }
}
