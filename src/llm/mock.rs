//! Mock LLM 客户端（用于测试，无需 API）
//!
//! 两种驱动方式：
//! - 队列：按顺序弹出预置的响应或错误
//! - 闭包：根据最后一条 User 消息生成响应（队列为空时使用）
//!
//! 两者都未设置时回显最后一条 User 消息。所有收到的 prompt 都会被记录，便于断言。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::message::last_user_content;
use crate::llm::{LlmClient, LlmError, Message};

type Responder = Box<dyn Fn(&str) -> String + Send + Sync>;

/// 脚本化的 Mock 客户端
#[derive(Default)]
pub struct MockLlmClient {
    queue: Mutex<VecDeque<Result<String, LlmError>>>,
    responder: Option<Responder>,
    prompts: Mutex<Vec<String>>,
}

impl std::fmt::Debug for MockLlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockLlmClient")
            .field("queued", &self.queue.lock().map(|q| q.len()).unwrap_or(0))
            .field("has_responder", &self.responder.is_some())
            .finish()
    }
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按顺序返回给定响应
    pub fn from_queue<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            queue: Mutex::new(responses.into_iter().map(|s| Ok(s.into())).collect()),
            ..Self::default()
        }
    }

    /// 由闭包根据 prompt 生成响应
    pub fn with_responder<F>(f: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        Self {
            responder: Some(Box::new(f)),
            ..Self::default()
        }
    }

    pub fn push_response(&self, text: impl Into<String>) {
        if let Ok(mut q) = self.queue.lock() {
            q.push_back(Ok(text.into()));
        }
    }

    pub fn push_error(&self, err: LlmError) {
        if let Ok(mut q) = self.queue.lock() {
            q.push_back(Err(err));
        }
    }

    /// 已收到的全部 prompt（最后一条 User 消息）
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().map(|p| p.len()).unwrap_or(0)
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        let prompt = last_user_content(messages).to_string();
        if let Ok(mut p) = self.prompts.lock() {
            p.push(prompt.clone());
        }

        let queued = self.queue.lock().ok().and_then(|mut q| q.pop_front());
        if let Some(next) = queued {
            return next;
        }
        if let Some(ref f) = self.responder {
            return Ok(f(&prompt));
        }
        Ok(format!("Echo from Mock: {}", prompt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_queue_then_responder_fallback() {
        let mock = MockLlmClient::with_responder(|p| format!("len={}", p.len()));
        mock.push_response("first");
        let a = mock.complete(&[Message::user("abc")]).await.unwrap();
        let b = mock.complete(&[Message::user("abcd")]).await.unwrap();
        assert_eq!(a, "first");
        assert_eq!(b, "len=4");
        assert_eq!(mock.prompts(), vec!["abc".to_string(), "abcd".to_string()]);
    }

    #[tokio::test]
    async fn test_default_echoes_last_user_message() {
        let mock = MockLlmClient::new();
        let out = mock
            .complete(&[Message::system("sys"), Message::user("hello")])
            .await
            .unwrap();
        assert_eq!(out, "Echo from Mock: hello");
    }
}
