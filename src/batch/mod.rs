//! 批处理：逐个任务顺序运行，每个任务独占一个沙箱
//!
//! 已有答案的任务跳过（续跑）；单个任务失败只记日志，继续下一个；收到停止信号后不再开始新任务。

pub mod result_log;
pub mod task;

pub use result_log::ResultLog;
pub use task::{load_tasks, parse_tasks, TaskSpec};

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::core::error::PipelineError;
use crate::core::orchestrator::Orchestrator;
use crate::sandbox::{KernelLauncher, SandboxSettings};

/// 一次批处理的统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub solved: usize,
    pub failed: usize,
    pub skipped: usize,
    /// 因停止信号提前结束
    pub stopped: bool,
}

pub struct BatchRunner {
    orchestrator: Orchestrator,
    launcher: Arc<dyn KernelLauncher>,
    sandbox_settings: SandboxSettings,
    cancel: CancellationToken,
}

impl BatchRunner {
    /// orchestrator 应已挂上同一个 cancel token，以便在任务中途停止
    pub fn new(
        orchestrator: Orchestrator,
        launcher: Arc<dyn KernelLauncher>,
        sandbox_settings: SandboxSettings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            orchestrator,
            launcher,
            sandbox_settings,
            cancel,
        }
    }

    pub async fn run(
        &self,
        tasks: &[TaskSpec],
        log: &mut ResultLog,
    ) -> anyhow::Result<BatchSummary> {
        let mut summary = BatchSummary::default();
        let total = tasks.len();

        for (i, task) in tasks.iter().enumerate() {
            if self.cancel.is_cancelled() {
                summary.stopped = true;
                break;
            }
            if log.contains(&task.id) {
                tracing::debug!(task_id = %task.id, "already answered, skipping");
                summary.skipped += 1;
                continue;
            }

            tracing::info!(
                task_id = %task.id,
                index = i + 1,
                total = total,
                work_dir = %task.work_dir.display(),
                "processing task"
            );
            let result = self
                .orchestrator
                .run_task(
                    self.launcher.clone(),
                    &task.problem,
                    task.work_dir.clone(),
                    self.sandbox_settings.clone(),
                )
                .await;

            match result {
                Ok(state) => match state.final_answer {
                    Some(answer) => {
                        log.record(&task.id, &answer)?;
                        summary.solved += 1;
                        tracing::info!(task_id = %task.id, "task completed");
                    }
                    None => {
                        summary.failed += 1;
                        tracing::error!(task_id = %task.id, "task finished without an answer");
                    }
                },
                Err(PipelineError::Cancelled) => {
                    tracing::warn!(task_id = %task.id, "task interrupted");
                    summary.stopped = true;
                    break;
                }
                Err(e) => {
                    summary.failed += 1;
                    tracing::error!(task_id = %task.id, error = %e, "task failed");
                }
            }
        }

        tracing::info!(
            solved = summary.solved,
            failed = summary.failed,
            skipped = summary.skipped,
            stopped = summary.stopped,
            "batch finished"
        );
        Ok(summary)
    }
}
