pub mod client;
pub mod llm;
pub mod prompts;

pub use client::LlmClient;
pub use llm::{provider_for, AnthropicProvider, GeminiProvider, LlmProvider, MockProvider};
