//! Demo showing the thinking process of the agent.
//!
//! This example demonstrates step-by-step execution to observe
//! the agent's reasoning process.

use std::sync::Arc;

use async_trait::async_trait;
use phone_pilot::device::{DeviceError, DeviceOps, Frame, ScreenSource};
use phone_pilot::{AgentConfig, ModelClient, ModelConfig, PhoneAgent};

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

struct SilentDevice;

#[async_trait]
impl DeviceOps for SilentDevice {
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

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let model_config = ModelConfig::default().with_base_url("http://localhost:8000/v1");

    let agent_config = AgentConfig::default().with_lang("cn").with_max_steps(10); // Limit steps for demo

    let mut agent = PhoneAgent::new(
        Arc::new(ModelClient::new(model_config)),
        Arc::new(PlaceholderScreen),
        Arc::new(SilentDevice),
        agent_config,
        None,
        None,
    );

    println!("🤖 Phone Pilot - Thinking Process Demo");
    println!("======================================\n");

    let task = "打开设置应用，查看Wi-Fi状态";
    println!("📝 Task: {}\n", task);

    // Execute step by step
    println!("Executing step by step to observe thinking process...\n");

    // First step with task
    let result = agent.step(Some(task)).await?;
    println!("Step 1 completed:");
    println!("  - Success: {}", result.success);
    println!("  - Finished: {}", result.finished);
    println!(
        "  - Thinking: {}",
        result.thinking.chars().take(100).collect::<String>()
    );
    if result.finished {
        println!("  - Message: {:?}", result.message);
        return Ok(());
    }

    // Continue with more steps
    for step in 2..=5 {
        if agent.step_count() >= 10 {
            println!("\nMax steps reached for demo.");
            break;
        }

        let result = agent.step(None).await?;
        println!("\nStep {} completed:", step);
        println!("  - Success: {}", result.success);
        println!("  - Finished: {}", result.finished);
        println!(
            "  - Thinking preview: {}...",
            result.thinking.chars().take(80).collect::<String>()
        );

        if result.finished {
            println!("  - Final message: {:?}", result.message);
            break;
        }

        // Small delay between steps
        tokio::time::sleep(tokio::time::Duration::from_secs(1)).await;
    }

    println!("\n======================================");
    println!("Demo completed. Total steps: {}", agent.step_count());

    Ok(())
}
