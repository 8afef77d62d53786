//! Agent module for orchestrating phone automation.

pub mod blocking;
mod cancel;
mod phone_agent;

pub use cancel::CancellationSignal;
pub use phone_agent::{AgentConfig, AgentError, PhoneAgent, StepOutcome, TaskState};
