//! Session controller.
//!
//! Owns every piece of transient client state (key lifecycle flags, chat
//! log, processing stage, loading flags, the latest notice) and exposes the
//! two orchestrators as methods over it:
//!
//! - key provisioning: [`Session::begin_key_action`] / [`Session::complete_key_action`]
//! - chat turns: [`Session::begin_turn`] / [`Session::apply_pipeline_event`] /
//!   [`Session::complete_turn`] / [`Session::fail_turn`]
//!
//! The split begin/complete form lets a front-end run the network call on a
//! background task and feed the result back later. [`Session::run_key_action`]
//! and [`Session::submit_prompt`] drive a whole operation in one await.

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::api::{
    ChatResponse, ControlPlane, DataPlane, KeyOpResult, Progress, PLACEHOLDER_ENCRYPTED_PROMPT,
    PLACEHOLDER_ENCRYPTED_RESPONSE,
};
use crate::config::Config;
use crate::keys::{KeyAction, KeyLifecycle};
use crate::stage::{PipelineEvent, ProcessingStage, StageTracker, TurnId};
use crate::state::{ChatMessage, ChatRole, MessageLog, Notice};

/// Assistant text used when the pipeline task itself died.
pub const TECHNICAL_ERROR_APOLOGY: &str =
    "Sorry, a technical error prevented your message from being processed. Please try again later.";

const SEND_FAILED_NOTICE: &str = "An error occurred while sending the message. Please try again.";
const PROCESSING_FAILED_NOTICE: &str = "Failed to process the message";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyActionRejected {
    #[error("{0} is not available yet")]
    Prerequisites(KeyAction),
    #[error("{0} is still in progress")]
    Busy(KeyAction),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ChatRejected {
    #[error("Complete the key setup before starting a chat")]
    NotReady,
    #[error("A message is already being processed")]
    Busy,
    #[error("Cannot send an empty message")]
    EmptyPrompt,
}

#[derive(Debug, Clone)]
pub struct Session {
    keys: KeyLifecycle,
    key_busy: Option<KeyAction>,
    log: MessageLog,
    stage: StageTracker,
    loading: bool,
    next_turn: TurnId,
    notice: Option<Notice>,
    require_key_setup: bool,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(false)
    }
}

impl Session {
    pub fn new(require_key_setup: bool) -> Self {
        Self {
            keys: KeyLifecycle::default(),
            key_busy: None,
            log: MessageLog::new(),
            stage: StageTracker::default(),
            loading: false,
            next_turn: 1,
            notice: None,
            require_key_setup,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.require_key_setup)
    }

    // Accessors

    pub fn keys(&self) -> &KeyLifecycle {
        &self.keys
    }

    pub fn messages(&self) -> &MessageLog {
        &self.log
    }

    pub fn stage(&self) -> ProcessingStage {
        self.stage.current()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Key action currently in flight, if any.
    pub fn key_busy(&self) -> Option<KeyAction> {
        self.key_busy
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    pub fn take_notice(&mut self) -> Option<Notice> {
        self.notice.take()
    }

    pub fn set_notice(&mut self, notice: Notice) {
        self.notice = Some(notice);
    }

    pub fn ready_to_chat(&self) -> bool {
        !self.require_key_setup || self.keys.keys_delivered()
    }

    /// Enabled/disabled contract for key controls.
    pub fn can_run(&self, action: KeyAction) -> bool {
        self.key_busy.is_none() && self.keys.is_enabled(action)
    }

    // Key provisioning

    pub fn begin_key_action(&mut self, action: KeyAction) -> Result<(), KeyActionRejected> {
        if let Some(busy) = self.key_busy {
            return Err(KeyActionRejected::Busy(busy));
        }
        if !self.keys.is_enabled(action) {
            return Err(KeyActionRejected::Prerequisites(action));
        }
        debug!(?action, "key action started");
        self.key_busy = Some(action);
        Ok(())
    }

    pub fn complete_key_action(&mut self, action: KeyAction, result: KeyOpResult) {
        if self.key_busy != Some(action) {
            warn!(?action, busy = ?self.key_busy, "completion for a key action that was not started");
        }
        self.key_busy = None;

        if result.success {
            self.keys.apply_success(action);
            info!(?action, "key action succeeded");
            self.notice = Some(Notice::success(action.success_notice()));
        } else {
            warn!(?action, message = %result.message, "key action failed");
            self.notice = Some(Notice::error(result.message));
        }
    }

    pub async fn run_key_action<C: ControlPlane>(
        &mut self,
        action: KeyAction,
        control: &C,
    ) -> Result<KeyOpResult, KeyActionRejected> {
        self.begin_key_action(action)?;
        let result = action.invoke(control).await;
        self.complete_key_action(action, result.clone());
        Ok(result)
    }

    /// Front-end only; the services keep no chat history.
    pub fn clear_chat(&mut self) {
        self.log.clear();
        self.notice = Some(Notice::success("Chat history cleared"));
    }

    // Chat turns

    /// Admit a prompt: append the user message and start the indicator.
    pub fn begin_turn(&mut self, prompt: &str) -> Result<TurnId, ChatRejected> {
        let rejection = if prompt.trim().is_empty() {
            Some(ChatRejected::EmptyPrompt)
        } else if self.loading {
            Some(ChatRejected::Busy)
        } else if !self.ready_to_chat() {
            Some(ChatRejected::NotReady)
        } else {
            None
        };
        if let Some(rejection) = rejection {
            self.notice = Some(Notice::error(rejection.to_string()));
            return Err(rejection);
        }

        let turn = self.next_turn;
        self.next_turn += 1;

        self.log.push(ChatMessage::user(prompt));
        self.loading = true;
        self.stage.start(turn);
        info!(turn, "chat turn started");
        Ok(turn)
    }

    pub fn apply_pipeline_event(&mut self, event: PipelineEvent) -> bool {
        let moved = self.stage.apply(event);
        if moved {
            debug!(turn = event.turn, stage = %self.stage.current(), "processing stage advanced");
        }
        moved
    }

    /// Whether `turn` is the turn currently in flight.
    pub fn is_current_turn(&self, turn: TurnId) -> bool {
        self.loading && self.stage.active_turn() == Some(turn)
    }

    /// Append the turn's artifacts and reply, then go idle.
    pub fn complete_turn(&mut self, turn: TurnId, response: ChatResponse) {
        if !self.is_current_turn(turn) {
            warn!(turn, "ignoring result for a turn that is no longer in flight");
            return;
        }

        let simulated = response.simulated || !response.success;
        self.log.push(ChatMessage::new(ChatRole::Encrypted, response.encrypted_prompt_digest, simulated));
        self.log.push(ChatMessage::new(ChatRole::Encrypted, response.encrypted_response_digest, simulated));
        self.log.push(ChatMessage::new(ChatRole::Assistant, response.decrypted_response, simulated));

        if !response.success {
            let text = response.message.unwrap_or_else(|| PROCESSING_FAILED_NOTICE.to_string());
            self.notice = Some(Notice::error(text));
        }
        self.finish_turn(turn);
    }

    /// The pipeline never produced an envelope (task panicked or was lost).
    pub fn fail_turn(&mut self, turn: TurnId, reason: &str) {
        if !self.is_current_turn(turn) {
            warn!(turn, "ignoring failure for a turn that is no longer in flight");
            return;
        }
        warn!(turn, reason, "chat turn failed");

        self.log.push(ChatMessage::new(ChatRole::Encrypted, PLACEHOLDER_ENCRYPTED_PROMPT, true));
        self.log.push(ChatMessage::new(ChatRole::Encrypted, PLACEHOLDER_ENCRYPTED_RESPONSE, true));
        self.log.push(ChatMessage::new(ChatRole::Assistant, TECHNICAL_ERROR_APOLOGY, true));
        self.notice = Some(Notice::error(SEND_FAILED_NOTICE));
        self.finish_turn(turn);
    }

    fn finish_turn(&mut self, turn: TurnId) {
        self.stage.reset();
        self.loading = false;
        info!(turn, "chat turn finished");
    }

    /// Run one chat turn end to end, advancing the stage from the
    /// client's progress reports while the call is in flight.
    pub async fn submit_prompt<D: DataPlane>(&mut self, prompt: &str, data: &D) -> Result<TurnId, ChatRejected> {
        let turn = self.begin_turn(prompt)?;
        let (tx, mut rx) = mpsc::unbounded_channel();

        let response = {
            let call = data.encrypt_and_send_prompt(prompt, Progress::new(turn, tx));
            tokio::pin!(call);
            loop {
                tokio::select! {
                    response = &mut call => break response,
                    Some(event) = rx.recv() => {
                        self.apply_pipeline_event(event);
                    }
                }
            }
        };
        while let Ok(event) = rx.try_recv() {
            self.apply_pipeline_event(event);
        }

        self.complete_turn(turn, response);
        Ok(turn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::EncryptedPayload;
    use crate::stage::PipelineHop;

    fn ready_session() -> Session {
        Session::new(false)
    }

    fn ok_response() -> ChatResponse {
        ChatResponse::completed(
            &EncryptedPayload::Text("E1".to_string()),
            &EncryptedPayload::Text("E2".to_string()),
            "hi there".to_string(),
        )
    }

    #[test]
    fn test_begin_key_action_checks_prerequisites() {
        let mut session = Session::default();
        assert_eq!(
            session.begin_key_action(KeyAction::GenerateKeyA),
            Err(KeyActionRejected::Prerequisites(KeyAction::GenerateKeyA))
        );
        assert_eq!(session.key_busy(), None);
        assert!(session.notice().is_none());
    }

    #[test]
    fn test_key_action_busy_blocks_others() {
        let mut session = Session::default();
        session.begin_key_action(KeyAction::CreateDirectory).unwrap();
        assert!(!session.can_run(KeyAction::CreateDirectory));
        assert_eq!(
            session.begin_key_action(KeyAction::CreateDirectory),
            Err(KeyActionRejected::Busy(KeyAction::CreateDirectory))
        );

        session.complete_key_action(KeyAction::CreateDirectory, KeyOpResult::ok("created"));
        assert!(session.keys().directory_created);
        assert_eq!(session.key_busy(), None);
        assert_eq!(session.notice(), Some(&Notice::success("Key directory created successfully")));
    }

    #[test]
    fn test_failed_key_action_leaves_flag_unset() {
        let mut session = Session::default();
        session.begin_key_action(KeyAction::CreateDirectory).unwrap();
        session.complete_key_action(KeyAction::CreateDirectory, KeyOpResult::failed("Error: 500 Internal Server Error"));

        assert!(!session.keys().directory_created);
        let notice = session.take_notice().unwrap();
        assert!(notice.is_error());
        assert_eq!(notice.text, "Error: 500 Internal Server Error");
        assert!(session.notice().is_none());
    }

    #[test]
    fn test_chat_requires_key_setup() {
        let mut session = Session::new(true);
        assert!(!session.ready_to_chat());
        assert_eq!(session.begin_turn("hello"), Err(ChatRejected::NotReady));
        assert!(session.messages().is_empty());
        assert!(!session.is_loading());
        assert!(session.notice().unwrap().is_error());
    }

    #[test]
    fn test_default_session_admits_chat() {
        let mut session = Session::from_config(&Config::new());
        assert!(session.ready_to_chat());
        session.begin_turn("hello").unwrap();
        assert_eq!(session.messages().len(), 1);
        assert!(session.is_loading());
    }

    #[test]
    fn test_empty_prompt_rejected() {
        let mut session = ready_session();
        assert_eq!(session.begin_turn("   "), Err(ChatRejected::EmptyPrompt));
        assert!(session.messages().is_empty());
    }

    #[test]
    fn test_second_prompt_rejected_while_loading() {
        let mut session = ready_session();
        session.begin_turn("one").unwrap();
        assert_eq!(session.begin_turn("two"), Err(ChatRejected::Busy));
        assert_eq!(session.messages().len(), 1);
    }

    #[test]
    fn test_turn_lifecycle() {
        let mut session = ready_session();
        let turn = session.begin_turn("hello").unwrap();

        assert!(session.is_loading());
        assert_eq!(session.stage(), ProcessingStage::EncryptPrompt);
        assert_eq!(session.messages().last().unwrap().role, ChatRole::User);

        session.apply_pipeline_event(PipelineEvent { turn, hop: PipelineHop::PromptEncrypted });
        assert_eq!(session.stage(), ProcessingStage::SendToTee);

        session.complete_turn(turn, ok_response());
        assert!(!session.is_loading());
        assert_eq!(session.stage(), ProcessingStage::Idle);

        let roles: Vec<ChatRole> = session.messages().iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![ChatRole::User, ChatRole::Encrypted, ChatRole::Encrypted, ChatRole::Assistant]
        );
        assert!(session.messages().iter().all(|m| !m.simulated));
    }

    #[test]
    fn test_stale_completion_is_ignored() {
        let mut session = ready_session();
        let first = session.begin_turn("one").unwrap();
        session.complete_turn(first, ok_response());
        let len = session.messages().len();

        session.complete_turn(first, ok_response());
        session.fail_turn(first, "late");
        assert_eq!(session.messages().len(), len);
    }

    #[test]
    fn test_fail_turn_appends_simulated_reply() {
        let mut session = ready_session();
        let turn = session.begin_turn("hello").unwrap();
        session.fail_turn(turn, "task panicked");

        let appended: Vec<&ChatMessage> = session.messages().iter().skip(1).collect();
        assert_eq!(appended.len(), 3);
        assert!(appended.iter().all(|m| m.simulated));
        assert_eq!(appended[2].role, ChatRole::Assistant);
        assert_eq!(appended[2].content, TECHNICAL_ERROR_APOLOGY);
        assert!(!session.is_loading());
        assert!(session.notice().unwrap().is_error());
    }

    #[test]
    fn test_clear_chat() {
        let mut session = ready_session();
        let turn = session.begin_turn("hello").unwrap();
        session.complete_turn(turn, ok_response());

        session.clear_chat();
        assert!(session.messages().is_empty());
        session.clear_chat();
        assert!(session.messages().is_empty());
    }
}
