//! Gateway layer: HTTP chat backends, prompt construction, and the fixed
//! style vocabulary.

pub mod config;
pub mod prompt;
pub mod siliconflow_api_agent;
pub mod styles;
pub mod wenxin_api_agent;

pub use prompt::{PromptBuilder, SYSTEM_PROMPT};
pub use siliconflow_api_agent::SiliconFlowApiAgent;
pub use styles::{ROLE_STYLES, StyleProfile, profile_for, sample_styles};
pub use wenxin_api_agent::WenxinApiAgent;
