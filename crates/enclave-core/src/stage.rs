//! Processing-stage indicator for the chat pipeline.
//!
//! The indicator is driven by lifecycle events reported by the data-plane
//! client as each hop starts or finishes, never by wall-clock timers. Events
//! carry the id of the turn that produced them so that a late event from an
//! earlier turn cannot move the indicator of the current one.

use std::fmt;

/// Identifies one chat submission.
pub type TurnId = u64;

/// Current stage of the encrypt → generate → decrypt pipeline.
///
/// Stages 3 and 4 happen inside the TEE and are not observable separately;
/// the indicator jumps over them to 5 once the encrypted response arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub enum ProcessingStage {
    #[default]
    Idle = 0,
    EncryptPrompt = 1,
    SendToTee = 2,
    DecryptPromptInTee = 3,
    GenerateInTee = 4,
    EncryptResponse = 5,
    DecryptResponse = 6,
}

impl ProcessingStage {
    /// The six visible stages, in order.
    pub const STEPS: [ProcessingStage; 6] = [
        ProcessingStage::EncryptPrompt,
        ProcessingStage::SendToTee,
        ProcessingStage::DecryptPromptInTee,
        ProcessingStage::GenerateInTee,
        ProcessingStage::EncryptResponse,
        ProcessingStage::DecryptResponse,
    ];

    pub fn number(self) -> u8 {
        self as u8
    }

    pub fn label(self) -> &'static str {
        match self {
            ProcessingStage::Idle => "Idle",
            ProcessingStage::EncryptPrompt => "Encrypt prompt with Key A (public)",
            ProcessingStage::SendToTee => "Send encrypted prompt to the TEE",
            ProcessingStage::DecryptPromptInTee => "Decrypt prompt in the TEE with Key A (private)",
            ProcessingStage::GenerateInTee => "Generate response in the TEE",
            ProcessingStage::EncryptResponse => "Encrypt response with Key B (public)",
            ProcessingStage::DecryptResponse => "Decrypt response with Key B (private)",
        }
    }

    /// A step is complete once the pipeline has moved past it.
    pub fn is_completed_at(self, current: ProcessingStage) -> bool {
        current > self
    }
}

impl fmt::Display for ProcessingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

/// Hop lifecycle reported by the data-plane client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineHop {
    /// `encrypt_prompt` returned the ciphertext
    PromptEncrypted,
    /// `generate_text` returned the encrypted response
    ResponseGenerated,
    /// `decrypt_response` is in flight
    DecryptStarted,
}

impl PipelineHop {
    pub fn stage(self) -> ProcessingStage {
        match self {
            PipelineHop::PromptEncrypted => ProcessingStage::SendToTee,
            PipelineHop::ResponseGenerated => ProcessingStage::EncryptResponse,
            PipelineHop::DecryptStarted => ProcessingStage::DecryptResponse,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineEvent {
    pub turn: TurnId,
    pub hop: PipelineHop,
}

/// Single source of truth for the displayed stage.
#[derive(Debug, Clone, Default)]
pub struct StageTracker {
    current: ProcessingStage,
    turn: Option<TurnId>,
}

impl StageTracker {
    pub fn current(&self) -> ProcessingStage {
        self.current
    }

    pub fn active_turn(&self) -> Option<TurnId> {
        self.turn
    }

    pub fn start(&mut self, turn: TurnId) {
        self.turn = Some(turn);
        self.current = ProcessingStage::EncryptPrompt;
    }

    /// Returns whether the event moved the indicator.
    pub fn apply(&mut self, event: PipelineEvent) -> bool {
        if self.turn != Some(event.turn) {
            return false;
        }
        let next = event.hop.stage();
        if next <= self.current {
            return false;
        }
        self.current = next;
        true
    }

    pub fn reset(&mut self) {
        self.turn = None;
        self.current = ProcessingStage::Idle;
    }
}
