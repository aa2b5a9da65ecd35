//! 按 provider 构造 LLM 客户端
//!
//! - openrouter：https://openrouter.ai/api/v1，Key 来自 OPENROUTER_API_KEY
//! - deepseek：https://api.deepseek.com，Key 来自 DEEPSEEK_API_KEY
//! - openai：默认端点或配置的 base_url，Key 来自 OPENAI_API_KEY
//! - mock：离线回显

use std::sync::Arc;
use std::time::Duration;

use crate::config::LlmSection;
use crate::llm::openai::{OPENROUTER_BASE_URL, OPENROUTER_DEFAULT_MODEL};
use crate::llm::{LlmClient, MockLlmClient, OpenAiClient, RetryConfig, RetryingLlmClient};

pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
pub const DEEPSEEK_CHAT: &str = "deepseek-chat";

/// provider 对应的默认 Key 环境变量
pub fn default_key_env(provider: &str) -> &'static str {
    match provider {
        "openrouter" => "OPENROUTER_API_KEY",
        "deepseek" => "DEEPSEEK_API_KEY",
        _ => "OPENAI_API_KEY",
    }
}

/// 读取 provider 的 API Key（api_key_env 优先）
pub fn resolve_api_key(cfg: &LlmSection) -> Option<String> {
    let var = cfg
        .api_key_env
        .clone()
        .unwrap_or_else(|| default_key_env(&cfg.provider).to_string());
    std::env::var(var).ok().filter(|k| !k.is_empty())
}

/// provider 对应的 base_url（配置优先）
pub fn resolve_base_url(cfg: &LlmSection) -> Option<String> {
    if cfg.base_url.is_some() {
        return cfg.base_url.clone();
    }
    match cfg.provider.as_str() {
        "openrouter" => Some(OPENROUTER_BASE_URL.to_string()),
        "deepseek" => Some(DEEPSEEK_BASE_URL.to_string()),
        _ => None,
    }
}

/// 根据配置创建客户端，外层套上重试
pub fn create_llm_from_config(cfg: &LlmSection) -> Arc<dyn LlmClient> {
    let retry = RetryConfig {
        max_retries: cfg.retry.max_retries,
        backoff: Duration::from_millis(cfg.retry.backoff_ms),
    };

    if cfg.provider == "mock" {
        tracing::info!("using mock llm");
        return Arc::new(MockLlmClient::new());
    }

    let model = match cfg.provider.as_str() {
        "deepseek" if cfg.model == OPENROUTER_DEFAULT_MODEL => DEEPSEEK_CHAT.to_string(),
        _ => cfg.model.clone(),
    };
    let api_key = resolve_api_key(cfg);
    if api_key.is_none() {
        tracing::warn!(
            provider = %cfg.provider,
            "no api key found, requests will fail"
        );
    }
    let base_url = resolve_base_url(cfg);

    tracing::info!(provider = %cfg.provider, model = %model, "llm client configured");
    let client = OpenAiClient::new(base_url.as_deref(), &model, api_key.as_deref())
        .with_timeout(Duration::from_secs(cfg.timeouts.request))
        .with_temperature(cfg.temperature);
    Arc::new(RetryingLlmClient::new(Arc::new(client), retry))
}
