//! 任务状态：贯穿整条流水线的唯一可变记录
//!
//! TaskState 由 Orchestrator 持有并按顺序交给各节点修改；Decision 与 Stage 构成状态机的输入与状态。

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::path::PathBuf;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// 计划中的一个抽象子任务
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Subtask {
    /// 简短名称（snake_case）
    pub name: String,
    /// 子任务要做什么（不含具体数值）
    pub description: String,
}

/// 工具：自包含（自带 import）、可独立调用的函数定义
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    pub code: String,
    /// 用于工具记忆相似度检索的描述
    pub docstring: String,
}

/// 工具记忆检索结果
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolCandidate {
    pub tool: Tool,
    pub score: f32,
}

/// 路由信号：由各节点写入，由转移函数消费
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Create,
    Solve,
    RetryCreate,
    Continue,
    End,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Decision::Create => "create",
            Decision::Solve => "solve",
            Decision::RetryCreate => "retry_create",
            Decision::Continue => "continue",
            Decision::End => "end",
        };
        f.write_str(s)
    }
}

/// 状态机的状态
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Planning,
    ToolLookup,
    Creating,
    Testing,
    Solving,
    Answering,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Planning => "planning",
            Stage::ToolLookup => "tool_lookup",
            Stage::Creating => "creating",
            Stage::Testing => "testing",
            Stage::Solving => "solving",
            Stage::Answering => "answering",
            Stage::Done => "done",
        };
        f.write_str(s)
    }
}

/// 失败记录来源
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackSource {
    Tester,
    Solver,
}

impl fmt::Display for FeedbackSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedbackSource::Tester => f.write_str("tester"),
            FeedbackSource::Solver => f.write_str("solver"),
        }
    }
}

/// 一条失败记录：哪段工具代码、用什么代码调用/测试、报了什么错
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackEntry {
    pub source: FeedbackSource,
    pub tool_code: String,
    /// Tester 为单测代码，Solver 为调用代码
    pub attempted_code: String,
    pub error_text: String,
}

/// 有界失败历史：超出容量时丢弃最旧的记录
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FeedbackHistory {
    entries: VecDeque<FeedbackEntry>,
    capacity: usize,
}

impl Default for FeedbackHistory {
    fn default() -> Self {
        Self::new(3)
    }
}

impl FeedbackHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, entry: FeedbackEntry) {
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 从旧到新
    pub fn iter(&self) -> impl Iterator<Item = &FeedbackEntry> {
        self.entries.iter()
    }

    pub fn last(&self) -> Option<&FeedbackEntry> {
        self.entries.back()
    }
}

/// 任务状态
#[derive(Clone, Debug, Serialize)]
pub struct TaskState {
    pub problem: String,
    pub work_dir: PathBuf,
    pub plan: Vec<Subtask>,
    pub current_step_index: usize,
    pub decision: Option<Decision>,
    /// 已完成步骤的简要记录（供 Solver 与最终回答参考）
    pub context_log: Vec<String>,
    pub error: Option<String>,
    /// 变量名 -> 类型名（main 上下文的全局变量快照）
    pub variable_inventory: BTreeMap<String, String>,
    pub tool_generated: Vec<Tool>,
    pub tool_retrieved: Vec<Tool>,
    pub feedback_history: FeedbackHistory,
    pub final_answer: Option<String>,
}

impl TaskState {
    pub fn new(problem: impl Into<String>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            problem: problem.into(),
            work_dir: work_dir.into(),
            plan: Vec::new(),
            current_step_index: 0,
            decision: None,
            context_log: Vec::new(),
            error: None,
            variable_inventory: BTreeMap::new(),
            tool_generated: Vec::new(),
            tool_retrieved: Vec::new(),
            feedback_history: FeedbackHistory::default(),
            final_answer: None,
        }
    }

    pub fn with_feedback_capacity(mut self, capacity: usize) -> Self {
        self.feedback_history = FeedbackHistory::new(capacity);
        self
    }

    pub fn current_subtask(&self) -> Option<&Subtask> {
        self.plan.get(self.current_step_index)
    }

    pub fn plan_complete(&self) -> bool {
        self.current_step_index >= self.plan.len()
    }

    /// 当前子任务正在使用的工具（生成的优先）
    pub fn active_tools(&self) -> &[Tool] {
        if !self.tool_generated.is_empty() {
            &self.tool_generated
        } else {
            &self.tool_retrieved
        }
    }

    /// 所有活动工具的定义拼接成一段可加载的代码
    pub fn tool_definitions(&self) -> String {
        self.active_tools()
            .iter()
            .map(|t| t.code.trim_end())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn clear_tools(&mut self) {
        self.tool_generated.clear();
        self.tool_retrieved.clear();
    }
}
