//! LLM 层：客户端抽象与实现（OpenAI 兼容 / OpenRouter / DeepSeek / Mock）与嵌入

pub mod embedding;
pub mod message;
pub mod mock;
pub mod openai;
pub mod provider;
pub mod traits;

pub use embedding::{
    cosine_similarity, create_embedder_from_config, EmbeddingProvider, OpenAiEmbedder,
};
pub use message::{Message, Role};
pub use mock::MockLlmClient;
pub use openai::{OpenAiClient, TokenUsage};
pub use provider::create_llm_from_config;
pub use traits::{LlmClient, LlmError, RetryConfig, RetryingLlmClient};
