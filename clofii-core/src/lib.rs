//! Interview session orchestration for clofii
//!
//! - **Plan & assembly**: `InterviewPlan` is rendered into the `SessionConfig`
//!   a live session starts with, always declaring `conclude_interview`
//! - **Orchestrator**: a single task that owns the live client, capture and
//!   playback, driven through an `InterviewHandle`
//! - **Questions**: generation of the interview questions during setup

pub mod assembly;
pub mod error;
pub mod frame_queue;
pub mod orchestrator;
pub mod plan;
pub mod questions;
pub mod state;
pub mod transcript;

pub use assembly::{AssemblyOptions, CONCLUDE_TOOL, InstructionStyle, assemble};
pub use error::{ConnectionFailure, ErrorKind, RecoveryAction, SessionError};
pub use frame_queue::FrameQueue;
pub use orchestrator::{InterviewHandle, OrchestratorEvent, OrchestratorOptions, SessionStats};
pub use plan::InterviewPlan;
pub use questions::{QuestionError, QuestionGenerator, fallback_questions};
pub use state::SessionState;
pub use transcript::Transcript;
