//! Configuration module for the agent.

mod prompts;

pub use prompts::{
    get_system_prompt, get_system_prompt_with_resolution, SYSTEM_PROMPT_EN, SYSTEM_PROMPT_ZH,
};
