//! Services - business logic and state management
//!
//! - `client` - Command station client (connect, send, decode fan-out)
//! - `monitor` - Feedback statistics aggregation
//! - `journey` - Journey state machines and feedback routing
//! - `workflow` - Workflow engine (sequential/parallel scheduling)
//! - `actions` - Action dispatch and media backend seams

pub mod actions;
pub mod client;
pub mod journey;
pub mod monitor;
pub mod workflow;

// Re-export commonly used types
pub use actions::{ExecutionContext, SoundBackend, SpeechBackend};
pub use client::CommandStationClient;
pub use journey::{forward_feedback, JourneyDirector, JourneyRunner};
pub use monitor::FeedbackMonitor;
pub use workflow::{ActionFailure, WorkflowEngine};
