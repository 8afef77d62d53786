//! Basic usage example for Phone Pilot.
//!
//! The agent core only talks to collaborator traits, so this demo wires in
//! a console-logging device and a placeholder screen source; the loop can
//! be observed without a phone attached. Point the model config at any
//! OpenAI-compatible endpoint serving a vision-language model.

use std::sync::Arc;

use async_trait::async_trait;
use phone_pilot::device::{DeviceError, DeviceOps, Frame, ScreenSource};
use phone_pilot::{AgentConfig, ModelClient, ModelConfig, PhoneAgent};

/// Screen source returning a static placeholder frame.
///
/// A real integration captures the device screen (ADB screencap, scrcpy
/// stream) and reports the ORIGINAL dimensions for coordinate mapping.
struct PlaceholderScreen;

#[async_trait]
impl ScreenSource for PlaceholderScreen {
    async fn frame(&self) -> Result<Option<Frame>, DeviceError> {
        Ok(Some(Frame::from_png_bytes(b"placeholder", 1080, 2400)))
    }

    async fn foreground_app(&self) -> Result<String, DeviceError> {
        Ok("System Home".to_string())
    }
}

/// Device that prints every operation instead of driving a transport.
struct ConsoleDevice;

#[async_trait]
impl DeviceOps for ConsoleDevice {
    async fn tap(&self, x: i64, y: i64) -> Result<(), DeviceError> {
        println!("  [device] tap ({x}, {y})");
        Ok(())
    }

    async fn double_tap(&self, x: i64, y: i64) -> Result<(), DeviceError> {
        println!("  [device] double tap ({x}, {y})");
        Ok(())
    }

    async fn long_press(&self, x: i64, y: i64) -> Result<(), DeviceError> {
        println!("  [device] long press ({x}, {y})");
        Ok(())
    }

    async fn swipe(&self, start: (i64, i64), end: (i64, i64)) -> Result<(), DeviceError> {
        println!(
            "  [device] swipe ({}, {}) -> ({}, {})",
            start.0, start.1, end.0, end.1
        );
        Ok(())
    }

    async fn type_text(&self, text: &str) -> Result<(), DeviceError> {
        println!("  [device] type {text:?}");
        Ok(())
    }

    async fn launch_app(&self, app_name: &str) -> Result<bool, DeviceError> {
        println!("  [device] launch {app_name}");
        Ok(true)
    }

    async fn back(&self) -> Result<(), DeviceError> {
        println!("  [device] back");
        Ok(())
    }

    async fn home(&self) -> Result<(), DeviceError> {
        println!("  [device] home");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing for debug output
    tracing_subscriber::fmt::init();

    // Configure the model client
    // You can customize these settings based on your setup
    let model_config = ModelConfig::default()
        .with_base_url("http://localhost:8000/v1")
        .with_model_name("autoglm-phone-9b");

    // Configure the agent
    let agent_config = AgentConfig::default()
        .with_lang("cn")        // Use Chinese prompts
        .with_max_steps(50);    // Maximum 50 steps

    // Create the agent
    let mut agent = PhoneAgent::new(
        Arc::new(ModelClient::new(model_config)),
        Arc::new(PlaceholderScreen),
        Arc::new(ConsoleDevice),
        agent_config,
        None,
        None,
    );

    // Run a simple task
    println!("🤖 Starting Phone Pilot...\n");

    let task = "打开微信";
    println!("📝 Task: {}\n", task);

    match agent.run(task).await {
        Ok(result) => {
            println!("\n✅ Task completed: {}", result);
        }
        Err(e) => {
            eprintln!("\n❌ Task failed: {}", e);
        }
    }

    Ok(())
}
