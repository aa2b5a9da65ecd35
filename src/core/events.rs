//! 流水线过程事件：用于观察任务在状态机中的路径（日志、测试断言、外部展示）

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

use crate::core::state::{Decision, Stage, Subtask};

/// 工具来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolSource {
    /// 从工具记忆复用
    Memory,
    /// 新生成或修复
    Generated,
    /// 判定为不需要工具
    NoTool,
}

/// 单步过程事件（可序列化为 JSON）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// 进入某个阶段
    StageEntered {
        stage: Stage,
        step: usize,
        plan_len: usize,
    },
    /// 节点给出的路由信号
    DecisionMade { stage: Stage, decision: Decision },
    /// 计划已生成
    PlanReady { subtasks: Vec<Subtask> },
    /// 当前子任务选定的工具
    ToolSelected { name: String, source: ToolSource },
    /// 工具验证结果
    ToolTested { name: String, passed: bool },
    /// Solver 的一次执行尝试
    SolverAttempt { attempt: u32, ok: bool },
    /// 子任务完成（step 为完成后的游标）
    StepCompleted { step: usize },
    /// 最终回答已生成
    Finished { answer_len: usize },
    /// 错误
    Error { text: String },
}

/// 可选的事件发送端
pub type EventSender = Option<UnboundedSender<PipelineEvent>>;

pub(crate) fn send_event(tx: &EventSender, ev: PipelineEvent) {
    if let Some(t) = tx {
        let _ = t.send(ev);
    }
}
