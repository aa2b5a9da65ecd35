//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / OpenRouter / DeepSeek / Mock）实现 LlmClient：无状态的文本进、文本出。
//! RetryingLlmClient 在任意客户端外层叠加固定次数、固定间隔的重试。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::llm::Message;

/// LLM 调用错误
#[derive(Error, Debug, Clone)]
pub enum LlmError {
    #[error("LLM request failed: {0}")]
    Request(String),

    #[error("LLM request timed out after {0:?}")]
    Timeout(Duration),

    #[error("LLM rate limited: {0}")]
    RateLimited(String),

    #[error("LLM returned an empty response")]
    EmptyResponse,
}

impl LlmError {
    /// 是否值得重试（网络、超时、限流、空响应都视为瞬时故障）
    pub fn is_transient(&self) -> bool {
        match self {
            LlmError::Request(msg) => !msg.contains("invalid_api_key") && !msg.contains("401"),
            LlmError::Timeout(_) | LlmError::RateLimited(_) | LlmError::EmptyResponse => true,
        }
    }
}

/// LLM 客户端 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}

/// 重试策略：固定次数 + 固定间隔
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff: Duration::from_millis(1000),
        }
    }
}

/// 带重试的客户端包装
pub struct RetryingLlmClient {
    inner: Arc<dyn LlmClient>,
    config: RetryConfig,
}

impl RetryingLlmClient {
    pub fn new(inner: Arc<dyn LlmClient>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl LlmClient for RetryingLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        let mut attempt = 0u32;
        loop {
            match self.inner.complete(messages).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_transient() && attempt < self.config.max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        attempt = attempt,
                        max_retries = self.config.max_retries,
                        error = %e,
                        "llm call failed, retrying"
                    );
                    tokio::time::sleep(self.config.backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn token_usage(&self) -> (u64, u64, u64) {
        self.inner.token_usage()
    }
}
