//! 核心编排层：错误、状态机、会话、确认通道、会话监管与主控循环

pub mod builder;
pub mod confirmation;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod session;
pub mod session_supervisor;
pub mod state;

pub use builder::{SessionBuilder, SessionConfig};
pub use confirmation::{AutoApprove, ConfirmationChannel, ScriptedConfirmation};
pub use error::{AgencyError, StorageError};
pub use events::SessionEvent;
pub use orchestrator::Orchestrator;
pub use session::Session;
pub use session_supervisor::SessionSupervisor;
pub use state::{LoopState, SessionSummary, TerminationReason};
