//! Action handler: executes decoded commands against the device.

use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::device::DeviceOps;

use super::command::Command;

/// Result of an action execution.
#[derive(Debug, Clone)]
pub struct ActionResult {
    pub success: bool,
    pub should_finish: bool,
    pub message: Option<String>,
}

impl ActionResult {
    /// Create a successful result.
    pub fn success() -> Self {
        Self {
            success: true,
            should_finish: false,
            message: None,
        }
    }

    /// Create a failure result. The task keeps running; the model may try
    /// something else next step.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            should_finish: false,
            message: Some(message.into()),
        }
    }

    /// Create a finish result.
    pub fn finish(message: Option<String>) -> Self {
        Self {
            success: true,
            should_finish: true,
            message,
        }
    }
}

/// Callback type for confirmation requests.
///
/// Invoked synchronously before a sensitive action executes; returning
/// `false` cancels the action and ends the task. Note that a slow callback
/// stalls the step loop in both execution models.
pub type ConfirmationCallback = Box<dyn Fn(&str) -> bool + Send + Sync>;

/// Callback type for takeover requests (login, captcha).
pub type TakeoverCallback = Box<dyn Fn(&str) + Send + Sync>;

/// Upper bound of the normalized coordinate space on both axes.
pub const RELATIVE_COORDINATE_MAX: i64 = 1000;

/// Convert normalized 0-1000 coordinates to absolute pixels.
pub fn relative_to_absolute(x: i64, y: i64, screen_width: u32, screen_height: u32) -> (i64, i64) {
    let abs_x = (x as f64 / RELATIVE_COORDINATE_MAX as f64 * screen_width as f64).round() as i64;
    let abs_y = (y as f64 / RELATIVE_COORDINATE_MAX as f64 * screen_height as f64).round() as i64;
    (abs_x, abs_y)
}

/// Handles execution of decoded commands.
///
/// Dispatch never fails at the type level: device errors, missing
/// parameters, and unknown actions all become a failed [`ActionResult`] so
/// a single hiccup cannot crash the step loop.
pub struct ActionHandler {
    device: Arc<dyn DeviceOps>,
    confirmation_callback: ConfirmationCallback,
    takeover_callback: TakeoverCallback,
}

impl ActionHandler {
    /// Create a new ActionHandler.
    ///
    /// # Arguments
    /// * `device` - Device operation collaborator.
    /// * `confirmation_callback` - Optional callback for sensitive action confirmation.
    /// * `takeover_callback` - Optional callback for takeover requests (login, captcha).
    pub fn new(
        device: Arc<dyn DeviceOps>,
        confirmation_callback: Option<ConfirmationCallback>,
        takeover_callback: Option<TakeoverCallback>,
    ) -> Self {
        Self {
            device,
            confirmation_callback: confirmation_callback
                .unwrap_or_else(|| Box::new(default_confirmation)),
            takeover_callback: takeover_callback.unwrap_or_else(|| Box::new(default_takeover)),
        }
    }

    /// Execute one command.
    ///
    /// # Arguments
    /// * `command` - The decoded command.
    /// * `screen_width` - Original screen width in pixels.
    /// * `screen_height` - Original screen height in pixels.
    pub async fn execute(
        &self,
        command: &Command,
        screen_width: u32,
        screen_height: u32,
    ) -> ActionResult {
        match command {
            Command::Finish { message } => ActionResult::finish(message.clone()),
            Command::Do { action, .. } => {
                let Some(action_name) = action.as_deref() else {
                    return ActionResult::failure("No action name specified");
                };
                tracing::debug!(action = action_name, "dispatching action");
                self.handle_action(action_name, command, screen_width, screen_height)
                    .await
            }
        }
    }

    async fn handle_action(
        &self,
        action_name: &str,
        command: &Command,
        screen_width: u32,
        screen_height: u32,
    ) -> ActionResult {
        match action_name {
            "Launch" => self.handle_launch(command).await,
            "Tap" => self.handle_tap(command, screen_width, screen_height).await,
            "Type" | "Type_Name" => self.handle_type(command).await,
            "Swipe" => self.handle_swipe(command, screen_width, screen_height).await,
            "Back" => self.run_device(self.device.back()).await,
            "Home" => self.run_device(self.device.home()).await,
            "Double Tap" => {
                match self.tap_point(command, screen_width, screen_height) {
                    Ok((x, y)) => self.run_device(self.device.double_tap(x, y)).await,
                    Err(result) => result,
                }
            }
            "Long Press" => {
                match self.tap_point(command, screen_width, screen_height) {
                    Ok((x, y)) => self.run_device(self.device.long_press(x, y)).await,
                    Err(result) => result,
                }
            }
            "Wait" => self.handle_wait(command).await,
            "Take_over" => self.handle_takeover(command),
            "Note" => ActionResult::success(),
            "Call_API" => ActionResult::success(),
            "Interact" => ActionResult {
                success: true,
                should_finish: false,
                message: Some("User interaction required".to_string()),
            },
            _ => ActionResult::failure(format!("Unknown action: {action_name}")),
        }
    }

    /// Run one device call, converting any transport error into a failed
    /// result so the loop keeps going.
    async fn run_device(
        &self,
        op: impl std::future::Future<Output = Result<(), crate::device::DeviceError>>,
    ) -> ActionResult {
        match op.await {
            Ok(()) => ActionResult::success(),
            Err(e) => ActionResult::failure(format!("Action failed: {e}")),
        }
    }

    /// Extract and scale the `element` coordinate pair of a command.
    fn tap_point(
        &self,
        command: &Command,
        screen_width: u32,
        screen_height: u32,
    ) -> Result<(i64, i64), ActionResult> {
        let coords = extract_point(command.param("element"))
            .ok_or_else(|| ActionResult::failure("No element coordinates"))?;
        Ok(relative_to_absolute(
            coords.0,
            coords.1,
            screen_width,
            screen_height,
        ))
    }

    async fn handle_launch(&self, command: &Command) -> ActionResult {
        let Some(app_name) = command.param("app").and_then(Value::as_str) else {
            return ActionResult::failure("No app name specified");
        };

        match self.device.launch_app(app_name).await {
            Ok(true) => ActionResult::success(),
            Ok(false) => ActionResult::failure(format!("App not found: {app_name}")),
            Err(e) => ActionResult::failure(format!("Action failed: {e}")),
        }
    }

    async fn handle_tap(
        &self,
        command: &Command,
        screen_width: u32,
        screen_height: u32,
    ) -> ActionResult {
        let (x, y) = match self.tap_point(command, screen_width, screen_height) {
            Ok(point) => point,
            Err(result) => return result,
        };

        // A message on a Tap marks a sensitive operation (payment, privacy).
        if let Some(message) = command.param("message").and_then(Value::as_str) {
            if !(self.confirmation_callback)(message) {
                return ActionResult {
                    success: false,
                    should_finish: true,
                    message: Some("User cancelled sensitive operation".to_string()),
                };
            }
        }

        self.run_device(self.device.tap(x, y)).await
    }

    async fn handle_type(&self, command: &Command) -> ActionResult {
        let text = command.param("text").and_then(Value::as_str).unwrap_or("");
        self.run_device(self.device.type_text(text)).await
    }

    async fn handle_swipe(
        &self,
        command: &Command,
        screen_width: u32,
        screen_height: u32,
    ) -> ActionResult {
        let Some(start) = extract_point(command.param("start")) else {
            return ActionResult::failure("Missing start coordinates");
        };
        let Some(end) = extract_point(command.param("end")) else {
            return ActionResult::failure("Missing end coordinates");
        };

        let start = relative_to_absolute(start.0, start.1, screen_width, screen_height);
        let end = relative_to_absolute(end.0, end.1, screen_width, screen_height);
        self.run_device(self.device.swipe(start, end)).await
    }

    async fn handle_wait(&self, command: &Command) -> ActionResult {
        let duration_secs = match command.param("duration") {
            // "2 seconds" style, the format the model is prompted to use
            Some(Value::String(s)) => s.replace("seconds", "").trim().parse().unwrap_or(1.0),
            Some(v) => v.as_f64().unwrap_or(1.0),
            None => 1.0,
        };

        tokio::time::sleep(Duration::from_secs_f64(duration_secs.max(0.0))).await;
        ActionResult::success()
    }

    fn handle_takeover(&self, command: &Command) -> ActionResult {
        let message = command
            .param("message")
            .and_then(Value::as_str)
            .unwrap_or("User intervention required");

        (self.takeover_callback)(message);
        ActionResult::success()
    }
}

/// Read a `[x, y]` coordinate pair out of a parameter value.
fn extract_point(value: Option<&Value>) -> Option<(i64, i64)> {
    let arr = value?.as_array()?;
    if arr.len() < 2 {
        return None;
    }
    Some((arr[0].as_i64()?, arr[1].as_i64()?))
}

/// Default confirmation callback using console input.
fn default_confirmation(message: &str) -> bool {
    print!("Sensitive operation: {message}\nConfirm? (Y/N): ");
    let _ = io::stdout().flush();

    let stdin = io::stdin();
    let mut line = String::new();
    let _ = stdin.lock().read_line(&mut line);

    line.trim().eq_ignore_ascii_case("y")
}

/// Default takeover callback: log and continue. Interactive frontends
/// install their own callback to pause for the user.
fn default_takeover(message: &str) {
    tracing::warn!(message, "takeover requested");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceError;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// Records device calls; optionally fails every operation.
    #[derive(Default)]
    struct MockDevice {
        calls: Mutex<Vec<String>>,
        fail: bool,
    }

    impl MockDevice {
        fn failing() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail: true,
            }
        }

        fn record(&self, call: String) -> Result<(), DeviceError> {
            self.calls.lock().unwrap().push(call);
            if self.fail {
                Err(DeviceError::Command("injected failure".to_string()))
            } else {
                Ok(())
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DeviceOps for MockDevice {
        async fn tap(&self, x: i64, y: i64) -> Result<(), DeviceError> {
            self.record(format!("tap {x},{y}"))
        }
        async fn double_tap(&self, x: i64, y: i64) -> Result<(), DeviceError> {
            self.record(format!("double_tap {x},{y}"))
        }
        async fn long_press(&self, x: i64, y: i64) -> Result<(), DeviceError> {
            self.record(format!("long_press {x},{y}"))
        }
        async fn swipe(&self, start: (i64, i64), end: (i64, i64)) -> Result<(), DeviceError> {
            self.record(format!(
                "swipe {},{} -> {},{}",
                start.0, start.1, end.0, end.1
            ))
        }
        async fn type_text(&self, text: &str) -> Result<(), DeviceError> {
            self.record(format!("type {text}"))
        }
        async fn launch_app(&self, app_name: &str) -> Result<bool, DeviceError> {
            self.record(format!("launch {app_name}"))?;
            Ok(app_name != "UnknownApp123")
        }
        async fn back(&self) -> Result<(), DeviceError> {
            self.record("back".to_string())
        }
        async fn home(&self) -> Result<(), DeviceError> {
            self.record("home".to_string())
        }
    }

    fn handler_with(device: Arc<MockDevice>) -> ActionHandler {
        ActionHandler::new(device, Some(Box::new(|_| true)), None)
    }

    #[test]
    fn test_relative_to_absolute_fixed_points() {
        assert_eq!(relative_to_absolute(0, 0, 1080, 2400), (0, 0));
        assert_eq!(relative_to_absolute(1000, 1000, 1080, 2400), (1080, 2400));
        assert_eq!(relative_to_absolute(500, 500, 1080, 2400), (540, 1200));
    }

    #[tokio::test]
    async fn test_finish_short_circuits() {
        let device = Arc::new(MockDevice::default());
        let handler = handler_with(device.clone());

        let result = handler
            .execute(&Command::finish(Some("All done")), 1080, 2400)
            .await;
        assert!(result.success);
        assert!(result.should_finish);
        assert_eq!(result.message.as_deref(), Some("All done"));
        assert!(device.calls().is_empty());
    }

    #[tokio::test]
    async fn test_tap_scales_coordinates() {
        let device = Arc::new(MockDevice::default());
        let handler = handler_with(device.clone());

        let cmd = Command::action("Tap", &[("element", json!([500, 500]))]);
        let result = handler.execute(&cmd, 1080, 2400).await;
        assert!(result.success);
        assert_eq!(device.calls(), vec!["tap 540,1200"]);
    }

    #[tokio::test]
    async fn test_unknown_action_is_recoverable() {
        let handler = handler_with(Arc::new(MockDevice::default()));

        let cmd = Command::action("Teleport", &[]);
        let result = handler.execute(&cmd, 1080, 2400).await;
        assert!(!result.success);
        assert!(!result.should_finish);
    }

    #[tokio::test]
    async fn test_missing_action_name_is_recoverable() {
        let handler = handler_with(Arc::new(MockDevice::default()));

        let cmd = Command::Do {
            action: None,
            params: serde_json::Map::new(),
        };
        let result = handler.execute(&cmd, 1080, 2400).await;
        assert!(!result.success);
        assert!(!result.should_finish);
    }

    #[tokio::test]
    async fn test_confirmation_decline_finishes_task() {
        let device = Arc::new(MockDevice::default());
        let handler = ActionHandler::new(device.clone(), Some(Box::new(|_| false)), None);

        let cmd = Command::action(
            "Tap",
            &[("element", json!([500, 500])), ("message", json!("pay now"))],
        );
        let result = handler.execute(&cmd, 1080, 2400).await;
        assert!(!result.success);
        assert!(result.should_finish);
        assert_eq!(
            result.message.as_deref(),
            Some("User cancelled sensitive operation")
        );
        // Declined before reaching the device.
        assert!(device.calls().is_empty());
    }

    #[tokio::test]
    async fn test_takeover_notifies_and_continues() {
        let notified = Arc::new(AtomicBool::new(false));
        let flag = notified.clone();
        let handler = ActionHandler::new(
            Arc::new(MockDevice::default()),
            None,
            Some(Box::new(move |_| flag.store(true, Ordering::SeqCst))),
        );

        let cmd = Command::action("Take_over", &[("message", json!("please log in"))]);
        let result = handler.execute(&cmd, 1080, 2400).await;
        assert!(result.success);
        assert!(!result.should_finish);
        assert!(notified.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_device_error_becomes_failed_result() {
        let device = Arc::new(MockDevice::failing());
        let handler = handler_with(device.clone());

        let cmd = Command::action("Back", &[]);
        let result = handler.execute(&cmd, 1080, 2400).await;
        assert!(!result.success);
        assert!(!result.should_finish);
        assert!(result.message.unwrap().contains("injected failure"));
    }

    #[tokio::test]
    async fn test_launch_unknown_app() {
        let handler = handler_with(Arc::new(MockDevice::default()));

        let cmd = Command::action("Launch", &[("app", json!("UnknownApp123"))]);
        let result = handler.execute(&cmd, 1080, 2400).await;
        assert!(!result.success);
        assert!(!result.should_finish);
    }

    #[tokio::test]
    async fn test_swipe_scales_both_points() {
        let device = Arc::new(MockDevice::default());
        let handler = handler_with(device.clone());

        let cmd = Command::action(
            "Swipe",
            &[("start", json!([500, 800])), ("end", json!([500, 200]))],
        );
        let result = handler.execute(&cmd, 1000, 1000).await;
        assert!(result.success);
        assert_eq!(device.calls(), vec!["swipe 500,800 -> 500,200"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_parses_duration_string() {
        let handler = handler_with(Arc::new(MockDevice::default()));

        let cmd = Command::action("Wait", &[("duration", json!("2 seconds"))]);
        let result = handler.execute(&cmd, 1080, 2400).await;
        assert!(result.success);
    }

    #[tokio::test]
    async fn test_interact_reports_message() {
        let handler = handler_with(Arc::new(MockDevice::default()));

        let result = handler
            .execute(&Command::action("Interact", &[]), 1080, 2400)
            .await;
        assert!(result.success);
        assert_eq!(result.message.as_deref(), Some("User interaction required"));
    }
}
