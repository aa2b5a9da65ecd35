//! 核心层：任务状态、错误、过程事件、状态机编排、停止信号

pub mod error;
pub mod events;
pub mod orchestrator;
pub mod shutdown;
pub mod state;

pub use error::{KernelRole, MemoryError, ParseFault, PipelineError, SandboxError};
pub use events::{EventSender, PipelineEvent, ToolSource};
pub use orchestrator::{next_stage, Orchestrator};
pub use shutdown::{ShutdownManager, StopReason};
pub use state::{
    Decision, FeedbackEntry, FeedbackHistory, FeedbackSource, Stage, Subtask, TaskState, Tool,
    ToolCandidate,
};
