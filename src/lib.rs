//! Toolsmith - 自建工具的多阶段问题求解流水线
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 任务状态、错误、过程事件、状态机编排、停止信号
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）、嵌入
//! - **memory**: 工具记忆（进程内 / SQLite）
//! - **sandbox**: Python 执行内核与 main/test 两上下文沙箱
//! - **pipeline**: Planner、ToolManager、ToolCreator、ToolTester、Solver、FinalAnswerer
//! - **batch**: 任务加载、结果日志、顺序批处理

pub mod batch;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod pipeline;
pub mod sandbox;

pub use crate::core::{Orchestrator, PipelineError, TaskState};
pub use crate::pipeline::PipelineSettings;
