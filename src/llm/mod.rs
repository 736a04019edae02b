pub mod lmstudio;
pub mod provider;
pub mod sse;
pub mod types;

pub use lmstudio::LmStudioProvider;
pub use provider::LlmProvider;
pub use types::{ChatMessage, ChatRequest, Role};
