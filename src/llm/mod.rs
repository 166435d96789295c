//! LLM 层：模型调用桥抽象与实现（Ollama / OpenAI 兼容 / DeepSeek / Mock）

pub mod deepseek;
pub mod mock;
pub mod ollama;
pub mod openai;
pub mod traits;

pub use deepseek::create_deepseek_client;
pub use mock::{MockLlmClient, MockReply};
pub use ollama::{InstalledModel, OllamaClient, OllamaServer};
pub use openai::{OpenAiClient, TokenUsage};
pub use traits::{ChatRequest, LlmClient, LlmError};
