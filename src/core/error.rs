//! 错误类型
//!
//! 子任务内的故障（语法错误、单测失败、运行时错误、解析失败）都在流水线内部通过重试与反馈恢复，
//! 只有下面这些会终止单个任务：内核启动失败、规划失败、LLM 传输失败、步数预算耗尽、取消。

use std::time::Duration;

use thiserror::Error;

use crate::llm::LlmError;

/// 内核所属上下文
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KernelRole {
    /// 有状态的 main 上下文
    Main,
    /// 每次验证前重置的 test 上下文
    Test,
}

impl std::fmt::Display for KernelRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KernelRole::Main => f.write_str("main"),
            KernelRole::Test => f.write_str("test"),
        }
    }
}

/// 沙箱错误
#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("{role} kernel failed to start after {attempts} attempts: {reason}")]
    Startup {
        attempts: u32,
        role: KernelRole,
        reason: String,
    },

    #[error("Kernel launch failed: {0}")]
    Launch(String),

    #[error("Kernel handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    #[error("Sandbox already shut down")]
    Closed,

    #[error("Sandbox IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// 工具记忆错误
#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("Tool store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("Tool store IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Tool store lock poisoned")]
    Poisoned,
}

/// 结构化输出解析失败；raw_text 为 LLM 原文，用于日志与重试提示
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Parse fault: {reason}")]
pub struct ParseFault {
    pub reason: String,
    pub raw_text: String,
}

impl ParseFault {
    pub fn new(reason: impl Into<String>, raw_text: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            raw_text: raw_text.into(),
        }
    }
}

/// 终止单个任务的错误
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Planning failed after {attempts} attempts: {last}")]
    Planning { attempts: u32, last: ParseFault },

    #[error("Sandbox error: {0}")]
    Sandbox(#[from] SandboxError),

    #[error("Tool memory error: {0}")]
    Memory(#[from] MemoryError),

    #[error("Step budget of {0} transitions exhausted")]
    StepBudgetExhausted(usize),

    #[error("Invalid pipeline state: {0}")]
    InvalidState(String),

    #[error("Task cancelled")]
    Cancelled,
}
