pub mod llm_client;
pub mod quiz_client;

pub use llm_client::{ChatProvider, LlmClient};
pub use quiz_client::QuizClient;
