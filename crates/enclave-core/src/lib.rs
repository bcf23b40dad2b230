pub mod api;
pub mod config;
pub mod keys;
pub mod session;
pub mod stage;
pub mod state;

// Re-export main types for convenience
pub use api::{
    ChatResponse, ControlPlane, ControlPlaneClient, DataPlane, DataPlaneClient, EncryptedPayload, KeyOpResult,
    Progress,
};
pub use config::{Config, Deployment, Endpoints};
pub use keys::{KeyAction, KeyLifecycle};
pub use session::{ChatRejected, KeyActionRejected, Session};
pub use stage::{PipelineEvent, PipelineHop, ProcessingStage, TurnId};
pub use state::{ChatMessage, ChatRole, MessageLog, Notice, NoticeLevel};
