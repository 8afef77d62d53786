//! Step engine orchestrating the screenshot, model, decode, dispatch loop.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use thiserror::Error;

use crate::actions::{
    decode, ActionHandler, Command, ConfirmationCallback, TakeoverCallback,
};
use crate::config::get_system_prompt_with_resolution;
use crate::device::{DeviceOps, ScreenSource};
use crate::model::{ChatModel, History, ModelError, ModelResponse};
use crate::resilience::{retry_with_backoff, CircuitBreaker, RecoveryManager, RetryPolicy};

use super::cancel::CancellationSignal;

/// Agent errors.
#[derive(Error, Debug)]
pub enum AgentError {
    /// The task was cancelled through the [`CancellationSignal`]. A clean
    /// stop, not a failure.
    #[error("Task cancelled")]
    Cancelled,
    #[error("Task failed: {0}")]
    TaskFailed(String),
    #[error("Task required for first step")]
    TaskRequired,
}

/// Lifecycle of one task inside the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Idle,
    Running,
    Finished,
    Failed,
    Cancelled,
}

/// Configuration for the PhoneAgent.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Maximum number of steps before stopping.
    pub max_steps: u32,
    /// Language code ("cn" for Chinese, "en" for English).
    pub lang: String,
    /// Custom system prompt (if None, uses default based on lang).
    pub system_prompt: Option<String>,
    /// Maximum number of non-system messages kept in the history.
    pub max_context_messages: usize,
    /// Consecutive decode failures tolerated before the task fails.
    pub decode_failure_budget: u32,
    /// Retry policy applied to model calls.
    pub retry_policy: RetryPolicy,
    /// Consecutive model failures before the circuit breaker opens.
    pub breaker_threshold: u32,
    /// How long the breaker stays open before admitting a trial call.
    pub breaker_recovery_timeout: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: 100,
            lang: "cn".to_string(),
            system_prompt: None,
            max_context_messages: 10,
            decode_failure_budget: 3,
            retry_policy: RetryPolicy::default(),
            breaker_threshold: 5,
            breaker_recovery_timeout: Duration::from_secs(30),
        }
    }
}

impl AgentConfig {
    /// Create a new AgentConfig with custom language.
    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = lang.into();
        self
    }

    /// Create a new AgentConfig with custom max steps.
    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Override the default system prompt.
    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    /// Set the history cap applied by context trimming.
    pub fn with_max_context_messages(mut self, max_context_messages: usize) -> Self {
        self.max_context_messages = max_context_messages;
        self
    }

    /// Set how many consecutive decode failures fail the task.
    pub fn with_decode_failure_budget(mut self, budget: u32) -> Self {
        self.decode_failure_budget = budget.max(1);
        self
    }

    /// Set the retry policy for model calls.
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Set the circuit breaker parameters for model calls.
    pub fn with_breaker(mut self, threshold: u32, recovery_timeout: Duration) -> Self {
        self.breaker_threshold = threshold;
        self.breaker_recovery_timeout = recovery_timeout;
        self
    }

    /// Resolve the system prompt for the given screen dimensions.
    pub fn system_prompt_with_resolution(&self, width: u32, height: u32) -> String {
        self.system_prompt
            .clone()
            .unwrap_or_else(|| get_system_prompt_with_resolution(&self.lang, width, height))
    }
}

/// Result of a single agent step. Immutable once emitted.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    /// Whether the action was successful.
    pub success: bool,
    /// Whether the task is finished.
    pub finished: bool,
    /// The command that was executed, when one decoded.
    pub command: Option<Command>,
    /// The thinking process from the model.
    pub thinking: String,
    /// Optional message (e.g., finish message).
    pub message: Option<String>,
}

/// AI-powered agent for automating Android phone interactions.
///
/// The agent owns the conversation history and drives the step loop:
/// capture the screen, call the vision-language model, decode its answer
/// into a command, execute the command, and decide whether to continue.
/// Model calls go through retry with backoff plus a circuit breaker;
/// device dispatch optionally goes through a connection recovery manager.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use phone_pilot::{AgentConfig, ModelClient, ModelConfig, PhoneAgent};
/// # use phone_pilot::device::{DeviceOps, ScreenSource};
/// # async fn example(screen: Arc<dyn ScreenSource>, device: Arc<dyn DeviceOps>) -> anyhow::Result<()> {
/// let model = Arc::new(ModelClient::new(ModelConfig::from_env()));
/// let mut agent = PhoneAgent::new(model, screen, device, AgentConfig::default(), None, None);
/// let result = agent.run("打开微信").await?;
/// println!("Task result: {}", result);
/// # Ok(())
/// # }
/// ```
pub struct PhoneAgent {
    model: Arc<dyn ChatModel>,
    screen: Arc<dyn ScreenSource>,
    action_handler: ActionHandler,
    config: AgentConfig,
    breaker: CircuitBreaker,
    recovery: Option<RecoveryManager>,
    history: History,
    step_count: u32,
    decode_failures: u32,
    state: TaskState,
    cancel: CancellationSignal,
}

impl PhoneAgent {
    /// Create a new PhoneAgent.
    ///
    /// # Arguments
    /// * `model` - Chat completion collaborator (usually a [`crate::ModelClient`]).
    /// * `screen` - Screen state provider.
    /// * `device` - Device operation collaborator.
    /// * `config` - Configuration for the agent behavior.
    /// * `confirmation_callback` - Optional callback for sensitive action confirmation.
    /// * `takeover_callback` - Optional callback for takeover requests.
    pub fn new(
        model: Arc<dyn ChatModel>,
        screen: Arc<dyn ScreenSource>,
        device: Arc<dyn DeviceOps>,
        config: AgentConfig,
        confirmation_callback: Option<ConfirmationCallback>,
        takeover_callback: Option<TakeoverCallback>,
    ) -> Self {
        let breaker = CircuitBreaker::new(config.breaker_threshold, config.breaker_recovery_timeout);
        Self {
            model,
            screen,
            action_handler: ActionHandler::new(device, confirmation_callback, takeover_callback),
            config,
            breaker,
            recovery: None,
            history: History::new(),
            step_count: 0,
            decode_failures: 0,
            state: TaskState::Idle,
            cancel: CancellationSignal::new(),
        }
    }

    /// Attach a connection recovery manager checked before each step's
    /// device interaction.
    pub fn with_recovery_manager(mut self, recovery: RecoveryManager) -> Self {
        self.recovery = Some(recovery);
        self
    }

    /// Share a circuit breaker with other agents guarding the same model
    /// endpoint.
    pub fn with_circuit_breaker(mut self, breaker: CircuitBreaker) -> Self {
        self.breaker = breaker;
        self
    }

    /// Run the agent to complete a task.
    ///
    /// Returns the final message for a finished task, `"Max steps reached"`
    /// when the step budget runs out (a normal stop, not an error),
    /// [`AgentError::Cancelled`] when the cancellation signal was observed,
    /// and [`AgentError::TaskFailed`] when the task failed terminally.
    pub async fn run(&mut self, task: &str) -> Result<String, AgentError> {
        self.reset();
        self.state = TaskState::Running;
        tracing::info!("Starting task: {}", task);

        let mut outcome = self.execute_step(Some(task), true).await?;

        while !outcome.finished {
            if self.step_count >= self.config.max_steps {
                tracing::info!("Stopping after {} steps", self.step_count);
                return Ok("Max steps reached".to_string());
            }
            // Let sibling tasks make progress between steps.
            tokio::task::yield_now().await;
            outcome = self.execute_step(None, false).await?;
        }

        if self.state == TaskState::Failed {
            return Err(AgentError::TaskFailed(
                outcome.message.unwrap_or_else(|| "Task failed".to_string()),
            ));
        }

        tracing::info!("Task finished after {} steps", self.step_count);
        Ok(outcome
            .message
            .unwrap_or_else(|| "Task completed".to_string()))
    }

    /// Execute a single step of the agent.
    ///
    /// Useful for manual control or debugging. The task text is required
    /// on the first step of a task and ignored afterwards.
    pub async fn step(&mut self, task: Option<&str>) -> Result<StepOutcome, AgentError> {
        let is_first = self.history.is_empty();
        if is_first && task.is_none() {
            return Err(AgentError::TaskRequired);
        }
        if self.state == TaskState::Idle {
            self.state = TaskState::Running;
        }
        self.execute_step(task, is_first).await
    }

    /// Reset the agent state for a new task.
    pub fn reset(&mut self) {
        self.history.clear();
        self.step_count = 0;
        self.decode_failures = 0;
        self.state = TaskState::Idle;
        self.cancel.reset();
    }

    /// Request cancellation of the running task. The loop observes the
    /// signal at its next checkpoint.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// A cancellation handle settable from another thread or task.
    pub fn cancel_signal(&self) -> CancellationSignal {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    /// Get the current conversation history.
    pub fn history(&self) -> &History {
        &self.history
    }

    /// Get the current step count.
    pub fn step_count(&self) -> u32 {
        self.step_count
    }

    /// Execute a single step of the agent loop.
    async fn execute_step(
        &mut self,
        user_prompt: Option<&str>,
        is_first: bool,
    ) -> Result<StepOutcome, AgentError> {
        self.checkpoint()?;
        self.step_count += 1;
        tracing::debug!("Executing step {}", self.step_count);

        if let Some(recovery) = &self.recovery {
            if let Err(e) = recovery.ensure_connected().await {
                tracing::error!("Device recovery failed: {}", e);
                self.state = TaskState::Failed;
                return Ok(StepOutcome {
                    success: false,
                    finished: true,
                    command: None,
                    thinking: String::new(),
                    message: Some(format!("Device error: {e}")),
                });
            }
        }

        // Capture current screen state
        let frame = match self.screen.frame().await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                tracing::warn!("No frame available, will retry next step");
                return Ok(StepOutcome {
                    success: false,
                    finished: false,
                    command: None,
                    thinking: String::new(),
                    message: Some("Screen capture unavailable".to_string()),
                });
            }
            Err(e) => {
                tracing::warn!("Screen capture failed: {}", e);
                return Ok(StepOutcome {
                    success: false,
                    finished: false,
                    command: None,
                    thinking: String::new(),
                    message: Some(format!("Screen capture failed: {e}")),
                });
            }
        };
        let current_app = self.screen.foreground_app().await.unwrap_or_else(|e| {
            tracing::warn!("Foreground app lookup failed: {}", e);
            "Unknown".to_string()
        });
        let screen_info = screen_info(&current_app);

        // Build messages
        if is_first {
            // The system prompt carries the resolution so the model knows
            // the aspect ratio it is pointing at.
            self.history.push_system(
                self.config
                    .system_prompt_with_resolution(frame.width, frame.height),
            );
            let text_content = format!("{}\n\n{}", user_prompt.unwrap_or(""), screen_info);
            self.history
                .push_user(text_content, Some(frame.base64_data.clone()));
        } else {
            let text_content = format!("** Screen Info **\n\n{}", screen_info);
            self.history
                .push_user(text_content, Some(frame.base64_data.clone()));
        }

        // Suspension point before the costly network call.
        self.checkpoint()?;

        let response = match self.call_model().await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!("Model call failed: {}", e);
                self.state = TaskState::Failed;
                return Ok(StepOutcome {
                    success: false,
                    finished: true,
                    command: None,
                    thinking: String::new(),
                    message: Some(format!("Model error: {e}")),
                });
            }
        };

        // Decode the action from untrusted model text
        let command = match decode(&response.action) {
            Ok(command) => {
                self.decode_failures = 0;
                command
            }
            Err(e) => {
                self.decode_failures += 1;
                tracing::warn!(
                    "Failed to decode action ({}/{}): {}",
                    self.decode_failures,
                    self.config.decode_failure_budget,
                    e
                );
                if self.decode_failures >= self.config.decode_failure_budget {
                    self.state = TaskState::Failed;
                    return Ok(StepOutcome {
                        success: false,
                        finished: true,
                        command: None,
                        thinking: response.thinking,
                        message: Some(format!(
                            "Model failed to generate a valid action after {} attempts",
                            self.decode_failures
                        )),
                    });
                }
                return Ok(StepOutcome {
                    success: false,
                    finished: false,
                    command: None,
                    thinking: response.thinking,
                    message: Some(format!("Invalid action from model: {e}")),
                });
            }
        };

        // Suspension point before side-effecting device actions.
        self.checkpoint()?;

        let result = self
            .action_handler
            .execute(&command, frame.width, frame.height)
            .await;

        // The assistant turn records what the model actually said,
        // regardless of whether dispatch succeeded.
        self.history.push_assistant(format!(
            "<think>{}</think><answer>{}</answer>",
            response.thinking, response.action
        ));
        self.history.trim(self.config.max_context_messages);

        let finished = command.is_finish() || result.should_finish;
        if finished {
            self.state = TaskState::Finished;
        }

        let message = result.message.or_else(|| {
            command
                .param("message")
                .and_then(Value::as_str)
                .map(str::to_string)
        });

        Ok(StepOutcome {
            success: result.success,
            finished,
            command: Some(command),
            thinking: response.thinking,
            message,
        })
    }

    /// Model call wrapped by the circuit breaker inside retry-with-backoff.
    async fn call_model(&self) -> Result<ModelResponse, ModelError> {
        let model = &self.model;
        let breaker = &self.breaker;
        let history = &self.history;

        retry_with_backoff(&self.config.retry_policy, ModelError::retryable, move || async move {
            if !breaker.try_acquire() {
                return Err(ModelError::CircuitOpen);
            }
            match model.complete(history).await {
                Ok(response) => {
                    breaker.record_success();
                    Ok(response)
                }
                Err(e) => {
                    breaker.record_failure();
                    Err(e)
                }
            }
        })
        .await
    }

    fn checkpoint(&mut self) -> Result<(), AgentError> {
        self.cancel.check().map_err(|e| {
            tracing::info!("Task cancelled at step {}", self.step_count);
            self.state = TaskState::Cancelled;
            e
        })
    }
}

fn screen_info(current_app: &str) -> String {
    json!({ "current_app": current_app }).to_string()
}
