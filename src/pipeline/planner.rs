//! Planner：把问题拆成有序的抽象子任务
//!
//! 解析失败时重试，次数有上限；耗尽后任务以 PipelineError::Planning 终止。

use schemars::schema_for;

use crate::core::error::{ParseFault, PipelineError};
use crate::core::events::PipelineEvent;
use crate::core::state::{Subtask, TaskState};
use crate::pipeline::parse::parse_plan;
use crate::pipeline::prompts::{fill, PLANNER_PROMPT};
use crate::pipeline::PipelineContext;

/// 子任务的 JSON Schema（写入提示词）
pub fn subtask_schema() -> String {
    serde_json::to_string_pretty(&schema_for!(Subtask)).unwrap_or_default()
}

pub fn build_prompt(problem: &str) -> String {
    fill(
        PLANNER_PROMPT,
        &[("schema", subtask_schema().as_str()), ("problem", problem)],
    )
}

pub async fn plan(ctx: &PipelineContext, state: &mut TaskState) -> Result<(), PipelineError> {
    let prompt = build_prompt(&state.problem);
    let attempts = ctx.settings.planner_max_attempts;
    let mut last: Option<ParseFault> = None;

    for attempt in 1..=attempts {
        let reply = ctx.ask("planner", prompt.clone()).await?;
        match parse_plan(&reply) {
            Ok(subtasks) => {
                tracing::info!(subtasks = subtasks.len(), attempt = attempt, "plan ready");
                ctx.emit(PipelineEvent::PlanReady {
                    subtasks: subtasks.clone(),
                });
                state.plan = subtasks;
                state.current_step_index = 0;
                state.context_log.clear();
                state.decision = None;
                return Ok(());
            }
            Err(fault) => {
                tracing::warn!(attempt = attempt, reason = %fault.reason, "plan parse failed");
                last = Some(fault);
            }
        }
    }

    Err(PipelineError::Planning {
        attempts,
        last: last.unwrap_or_else(|| ParseFault::new("no attempts made", "")),
    })
}
