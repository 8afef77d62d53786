//! Blocking presentation of the step engine.
//!
//! Wraps the async engine in a current-thread runtime so callers without
//! their own executor can drive tasks from a dedicated thread. Semantics
//! are identical to the async presentation because both run the same
//! engine; cancellation is observed at the same checkpoints via a
//! [`CancellationSignal`] clone set from any thread.

use std::io;

use tokio::runtime::{Builder, Runtime};

use super::cancel::CancellationSignal;
use super::phone_agent::{AgentError, StepOutcome, TaskState};

/// Blocking facade over [`super::PhoneAgent`].
///
/// # Example
///
/// ```rust,no_run
/// # fn example(engine: phone_pilot::PhoneAgent) -> anyhow::Result<()> {
/// let mut agent = phone_pilot::blocking::PhoneAgent::new(engine)?;
/// let cancel = agent.cancel_signal();
/// std::thread::spawn(move || {
///     // some UI event later...
///     cancel.cancel();
/// });
/// let result = agent.run("打开微信")?;
/// # Ok(())
/// # }
/// ```
pub struct PhoneAgent {
    runtime: Runtime,
    engine: super::PhoneAgent,
}

impl PhoneAgent {
    /// Wrap an async engine in a blocking facade with its own
    /// current-thread runtime.
    pub fn new(engine: super::PhoneAgent) -> io::Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        Ok(Self { runtime, engine })
    }

    /// Run the agent to complete a task, blocking until it stops.
    pub fn run(&mut self, task: &str) -> Result<String, AgentError> {
        self.runtime.block_on(self.engine.run(task))
    }

    /// Execute a single step, blocking until it completes.
    pub fn step(&mut self, task: Option<&str>) -> Result<StepOutcome, AgentError> {
        self.runtime.block_on(self.engine.step(task))
    }

    /// Reset the agent state for a new task.
    pub fn reset(&mut self) {
        self.engine.reset();
    }

    /// A cancellation handle settable from any thread while `run` blocks
    /// this one.
    pub fn cancel_signal(&self) -> CancellationSignal {
        self.engine.cancel_signal()
    }

    pub fn state(&self) -> TaskState {
        self.engine.state()
    }

    pub fn step_count(&self) -> u32 {
        self.engine.step_count()
    }
}

#[cfg(test)]
mod tests {
    use super::super::phone_agent::AgentConfig;
    use super::*;
    use crate::device::{DeviceError, DeviceOps, Frame, ScreenSource};
    use crate::model::{ChatModel, History, ModelError, ModelResponse};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    struct FixedModel {
        action: String,
        cancel_on_call: Mutex<Option<CancellationSignal>>,
    }

    impl FixedModel {
        fn new(action: &str) -> Self {
            Self {
                action: action.to_string(),
                cancel_on_call: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl ChatModel for FixedModel {
        async fn complete(&self, _history: &History) -> Result<ModelResponse, ModelError> {
            if let Some(signal) = &*self.cancel_on_call.lock().unwrap() {
                signal.cancel();
            }
            Ok(ModelResponse {
                thinking: "thinking".to_string(),
                action: self.action.clone(),
                raw_content: self.action.clone(),
            })
        }
    }

    struct StaticScreen;

    #[async_trait]
    impl ScreenSource for StaticScreen {
        async fn frame(&self) -> Result<Option<Frame>, DeviceError> {
            Ok(Some(Frame::new("imgdata".to_string(), 1080, 2400)))
        }
        async fn foreground_app(&self) -> Result<String, DeviceError> {
            Ok("System Home".to_string())
        }
    }

    struct NoopDevice;

    #[async_trait]
    impl DeviceOps for NoopDevice {
        async fn tap(&self, _x: i64, _y: i64) -> Result<(), DeviceError> {
            Ok(())
        }
        async fn double_tap(&self, _x: i64, _y: i64) -> Result<(), DeviceError> {
            Ok(())
        }
        async fn long_press(&self, _x: i64, _y: i64) -> Result<(), DeviceError> {
            Ok(())
        }
        async fn swipe(&self, _start: (i64, i64), _end: (i64, i64)) -> Result<(), DeviceError> {
            Ok(())
        }
        async fn type_text(&self, _text: &str) -> Result<(), DeviceError> {
            Ok(())
        }
        async fn launch_app(&self, _app_name: &str) -> Result<bool, DeviceError> {
            Ok(true)
        }
        async fn back(&self) -> Result<(), DeviceError> {
            Ok(())
        }
        async fn home(&self) -> Result<(), DeviceError> {
            Ok(())
        }
    }

    fn blocking_agent(model: Arc<FixedModel>) -> PhoneAgent {
        let engine = super::super::PhoneAgent::new(
            model,
            Arc::new(StaticScreen),
            Arc::new(NoopDevice),
            AgentConfig::default().with_max_steps(5),
            Some(Box::new(|_| true)),
            None,
        );
        PhoneAgent::new(engine).unwrap()
    }

    #[test]
    fn test_blocking_run_finishes_task() {
        let model = Arc::new(FixedModel::new(r#"finish(message="Done")"#));
        let mut agent = blocking_agent(model);

        let result = agent.run("task").unwrap();
        assert_eq!(result, "Done");
        assert_eq!(agent.state(), TaskState::Finished);
        assert_eq!(agent.step_count(), 1);
    }

    #[test]
    fn test_blocking_step_and_reset() {
        let model = Arc::new(FixedModel::new(r#"do(action="Back")"#));
        let mut agent = blocking_agent(model);

        let outcome = agent.step(Some("task")).unwrap();
        assert!(outcome.success);
        assert!(!outcome.finished);

        agent.reset();
        assert_eq!(agent.state(), TaskState::Idle);
        assert_eq!(agent.step_count(), 0);
    }

    #[test]
    fn test_blocking_cancellation_mid_run() {
        let model = Arc::new(FixedModel::new(r#"do(action="Back")"#));
        let mut agent = blocking_agent(model.clone());
        // Flip the signal from inside the model call: the loop observes it
        // at the pre-dispatch checkpoint of the same step.
        *model.cancel_on_call.lock().unwrap() = Some(agent.cancel_signal());

        let err = agent.run("task").unwrap_err();
        assert!(matches!(err, AgentError::Cancelled));
        assert_eq!(agent.state(), TaskState::Cancelled);
    }

    #[test]
    fn test_blocking_max_steps() {
        let model = Arc::new(FixedModel::new(r#"do(action="Back")"#));
        let mut agent = blocking_agent(model);

        let result = agent.run("task").unwrap();
        assert_eq!(result, "Max steps reached");
        assert_eq!(agent.step_count(), 5);
    }
}
