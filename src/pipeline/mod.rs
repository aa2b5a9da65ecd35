//! 流水线节点：Planner → ToolManager → (ToolCreator → ToolTester)* → Solver → FinalAnswerer
//!
//! 每个节点读写 TaskState 并写入 decision，由 Orchestrator 按转移表路由。
//! 节点共享 PipelineContext（LLM、工具记忆、参数、事件发送端），均以显式依赖注入。

pub mod answerer;
pub mod creator;
pub mod manager;
pub mod parse;
pub mod planner;
pub mod prompts;
pub mod solver;
pub mod tester;

use std::sync::Arc;

use crate::config::PipelineSection;
use crate::core::events::{send_event, EventSender, PipelineEvent};
use crate::llm::message::preview;
use crate::llm::{LlmClient, LlmError, Message};
use crate::memory::ToolMemory;

/// 最终回答风格
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnswerStyle {
    /// 简洁的数据分析回答
    #[default]
    Analyst,
    /// 逐步推理并把答案放进 \boxed{}
    Math,
}

impl AnswerStyle {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "math" => AnswerStyle::Math,
            _ => AnswerStyle::Analyst,
        }
    }
}

/// 流水线参数
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub max_transitions: usize,
    pub planner_max_attempts: u32,
    pub creator_max_attempts: u32,
    pub solver_max_attempts: u32,
    pub feedback_capacity: usize,
    pub memory_top_k: usize,
    pub answer_style: AnswerStyle,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from(&PipelineSection::default())
    }
}

impl From<&PipelineSection> for PipelineSettings {
    fn from(s: &PipelineSection) -> Self {
        Self {
            max_transitions: s.max_transitions.max(1),
            planner_max_attempts: s.planner_max_attempts.max(1),
            creator_max_attempts: s.creator_max_attempts.max(1),
            solver_max_attempts: s.solver_max_attempts.max(1),
            feedback_capacity: s.feedback_capacity.max(1),
            memory_top_k: s.memory_top_k.max(1),
            answer_style: AnswerStyle::parse(&s.answer_style),
        }
    }
}

/// 节点共享的依赖
pub struct PipelineContext {
    pub llm: Arc<dyn LlmClient>,
    pub memory: Arc<dyn ToolMemory>,
    pub settings: PipelineSettings,
    pub events: EventSender,
}

impl PipelineContext {
    /// 单条 User 消息的无状态调用
    pub async fn ask(&self, stage: &'static str, prompt: String) -> Result<String, LlmError> {
        tracing::debug!(stage = stage, prompt = %preview(&prompt, 200), "llm call");
        let reply = self.llm.complete(&[Message::user(prompt)]).await?;
        tracing::debug!(stage = stage, reply = %preview(&reply, 200), "llm reply");
        Ok(reply)
    }

    pub fn emit(&self, ev: PipelineEvent) {
        send_event(&self.events, ev);
    }
}
