// Copyright 2025 phone-pilot contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # Phone Pilot
//!
//! Agent core for driving Android phone interactions with a
//! vision-language model.
//!
//! The crate implements the step loop at the heart of a phone-automation
//! agent: capture the screen, ask the model what to do next, safely decode
//! its textual answer into a structured command, execute the command, and
//! decide whether to continue. Model calls are wrapped in retry with
//! backoff plus a circuit breaker; device operations can be guarded by a
//! connection recovery manager.
//!
//! The surrounding application supplies the collaborators: a
//! [`device::ScreenSource`] for frames, a [`device::DeviceOps`] for input
//! injection (ADB, scrcpy, emulator), and a [`ModelClient`] or custom
//! [`ChatModel`] for inference.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use phone_pilot::{AgentConfig, ModelClient, ModelConfig, PhoneAgent};
//! # use phone_pilot::device::{DeviceOps, ScreenSource};
//!
//! # async fn example(screen: Arc<dyn ScreenSource>, device: Arc<dyn DeviceOps>) -> anyhow::Result<()> {
//! let model = Arc::new(ModelClient::new(
//!     ModelConfig::default().with_base_url("http://localhost:8000/v1"),
//! ));
//! let mut agent = PhoneAgent::new(
//!     model,
//!     screen,
//!     device,
//!     AgentConfig::default().with_lang("en"),
//!     None,
//!     None,
//! );
//!
//! let result = agent.run("Open the calendar and create an event").await?;
//! println!("Task result: {}", result);
//! # Ok(())
//! # }
//! ```

pub mod actions;
pub mod agent;
pub mod config;
pub mod device;
pub mod model;
pub mod resilience;

pub use actions::{relative_to_absolute, ActionResult, Command, DecodeError, RELATIVE_COORDINATE_MAX};
pub use agent::{
    AgentConfig, AgentError, CancellationSignal, PhoneAgent, StepOutcome, TaskState,
};
pub use model::{ChatModel, History, ModelClient, ModelConfig, ModelError, ModelResponse};
pub use resilience::{CircuitBreaker, CircuitState, RecoveryManager, RetryPolicy};

/// Blocking presentation of the agent for callers without an async runtime.
pub mod blocking {
    pub use crate::agent::blocking::PhoneAgent;
}
