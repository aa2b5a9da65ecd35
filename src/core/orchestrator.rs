//! 编排器：状态机主控循环
//!
//! 路由是纯函数 [`next_stage`]；[`Orchestrator::run`] 按路由依次调用流水线节点，
//! 每次转移计入 `max_transitions` 预算。[`Orchestrator::run_task`] 负责沙箱的完整生命周期：
//! 无论成功、失败还是取消，返回前都会关闭两个内核。

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::core::error::PipelineError;
use crate::core::events::{EventSender, PipelineEvent};
use crate::core::state::{Decision, Stage, TaskState};
use crate::llm::LlmClient;
use crate::memory::ToolMemory;
use crate::pipeline::{answerer, creator, manager, planner, solver, tester};
use crate::pipeline::{PipelineContext, PipelineSettings};
use crate::sandbox::{KernelLauncher, Sandbox, SandboxSettings};

/// 转移表
///
/// `step` 为已完成的子任务数，`plan_len` 为计划长度。
/// Solving 边界上缺失或无法识别的 decision 一律回到 Creating。
pub fn next_stage(from: Stage, decision: Option<Decision>, step: usize, plan_len: usize) -> Stage {
    match from {
        Stage::Planning => Stage::ToolLookup,
        Stage::ToolLookup => match decision {
            Some(Decision::Solve) => Stage::Solving,
            _ => Stage::Creating,
        },
        Stage::Creating => Stage::Testing,
        Stage::Testing => match decision {
            Some(Decision::Solve) => Stage::Solving,
            _ => Stage::Creating,
        },
        Stage::Solving => match decision {
            Some(Decision::Continue) if step < plan_len => Stage::ToolLookup,
            Some(Decision::Continue) => Stage::Answering,
            _ => Stage::Creating,
        },
        Stage::Answering | Stage::Done => Stage::Done,
    }
}

/// 流水线编排器；LLM 与工具记忆以显式依赖注入
pub struct Orchestrator {
    ctx: PipelineContext,
    cancel: Option<CancellationToken>,
}

impl Orchestrator {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        memory: Arc<dyn ToolMemory>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            ctx: PipelineContext {
                llm,
                memory,
                settings,
                events: None,
            },
            cancel: None,
        }
    }

    /// 订阅流水线事件
    pub fn with_events(mut self, events: EventSender) -> Self {
        self.ctx.events = events;
        self
    }

    /// 取消信号；在每次转移之间检查
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.ctx.settings
    }

    /// 从 Planning 开始驱动状态机直到 Done，返回最终状态
    pub async fn run(
        &self,
        sandbox: &mut Sandbox,
        mut state: TaskState,
    ) -> Result<TaskState, PipelineError> {
        let budget = self.ctx.settings.max_transitions;
        let mut stage = Stage::Planning;
        let mut transitions = 0usize;

        while stage != Stage::Done {
            if self.cancel.as_ref().is_some_and(|t| t.is_cancelled()) {
                tracing::warn!(stage = %stage, "task cancelled");
                return Err(PipelineError::Cancelled);
            }
            if transitions >= budget {
                tracing::error!(budget = budget, stage = %stage, "transition budget exhausted");
                self.ctx.emit(PipelineEvent::Error {
                    text: format!("transition budget of {} exhausted", budget),
                });
                return Err(PipelineError::StepBudgetExhausted(budget));
            }

            self.ctx.emit(PipelineEvent::StageEntered {
                stage,
                step: state.current_step_index,
                plan_len: state.plan.len(),
            });
            tracing::debug!(stage = %stage, step = state.current_step_index, "entering stage");

            if let Err(e) = self.run_stage(stage, sandbox, &mut state).await {
                self.ctx.emit(PipelineEvent::Error {
                    text: e.to_string(),
                });
                return Err(e);
            }

            if let Some(decision) = state.decision {
                self.ctx.emit(PipelineEvent::DecisionMade { stage, decision });
            }
            stage = next_stage(
                stage,
                state.decision,
                state.current_step_index,
                state.plan.len(),
            );
            transitions += 1;
        }

        tracing::info!(transitions = transitions, "pipeline finished");
        Ok(state)
    }

    async fn run_stage(
        &self,
        stage: Stage,
        sandbox: &mut Sandbox,
        state: &mut TaskState,
    ) -> Result<(), PipelineError> {
        let ctx = &self.ctx;
        match stage {
            Stage::Planning => planner::plan(ctx, state).await,
            Stage::ToolLookup => manager::select_tool(ctx, state).await,
            Stage::Creating => creator::create_tool(ctx, state).await,
            Stage::Testing => tester::test_tools(ctx, state, sandbox).await,
            Stage::Solving => solver::solve(ctx, state, sandbox).await,
            Stage::Answering => answerer::answer(ctx, state, sandbox).await,
            Stage::Done => Ok(()),
        }
    }

    /// 为一个任务启动沙箱、运行流水线并在任何退出路径上关闭沙箱
    pub async fn run_task(
        &self,
        launcher: Arc<dyn KernelLauncher>,
        problem: &str,
        work_dir: impl Into<PathBuf>,
        sandbox_settings: SandboxSettings,
    ) -> Result<TaskState, PipelineError> {
        let work_dir = work_dir.into();
        let mut sandbox = Sandbox::start(launcher, work_dir.clone(), sandbox_settings).await?;
        let state = TaskState::new(problem, work_dir)
            .with_feedback_capacity(self.ctx.settings.feedback_capacity);

        let result = self.run(&mut sandbox, state).await;
        sandbox.shutdown().await;
        result
    }
}
