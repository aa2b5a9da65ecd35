//! Tool Creator：生成或修复当前子任务的工具
//!
//! 失败历史为空时是生成模式；否则为修复模式，提示词带上全部失败记录并要求先做根因分析。
//! 解析最多重试 creator_max_attempts 次，耗尽后 error = "Parsing Failed"、tool_generated 清空。

use crate::core::error::PipelineError;
use crate::core::events::{PipelineEvent, ToolSource};
use crate::core::state::{Subtask, TaskState, Tool};
use crate::pipeline::parse::parse_tool_block;
use crate::pipeline::prompts::{fill, render_feedback, CREATOR_PROMPT, REPAIR_PROMPT};
use crate::pipeline::PipelineContext;

pub const PARSING_FAILED: &str = "Parsing Failed";

fn build_prompt(subtask: &Subtask, state: &TaskState) -> String {
    let task =
        serde_json::to_string_pretty(subtask).unwrap_or_else(|_| subtask.description.clone());
    if state.feedback_history.is_empty() {
        fill(CREATOR_PROMPT, &[("task", task.as_str())])
    } else {
        fill(
            REPAIR_PROMPT,
            &[
                ("task", task.as_str()),
                ("history", render_feedback(&state.feedback_history).as_str()),
            ],
        )
    }
}

pub async fn create_tool(
    ctx: &PipelineContext,
    state: &mut TaskState,
) -> Result<(), PipelineError> {
    let subtask = state.current_subtask().cloned().ok_or_else(|| {
        PipelineError::InvalidState("tool creation past end of plan".to_string())
    })?;

    let repairing = !state.feedback_history.is_empty();
    if repairing {
        tracing::info!(
            failures = state.feedback_history.len(),
            subtask = %subtask.name,
            "repairing tool"
        );
    } else {
        tracing::info!(subtask = %subtask.name, "creating tool");
    }

    let prompt = build_prompt(&subtask, state);
    let attempts = ctx.settings.creator_max_attempts;
    for attempt in 1..=attempts {
        let reply = ctx.ask("creator", prompt.clone()).await?;
        match parse_tool_block(&reply) {
            Ok(parsed) => {
                tracing::info!(tool = %parsed.name, attempt = attempt, "tool generated");
                ctx.emit(PipelineEvent::ToolSelected {
                    name: parsed.name.clone(),
                    source: ToolSource::Generated,
                });
                state.tool_generated = vec![Tool {
                    name: parsed.name,
                    code: parsed.code,
                    docstring: parsed.description,
                }];
                state.tool_retrieved.clear();
                state.error = None;
                state.decision = None;
                return Ok(());
            }
            Err(fault) => {
                tracing::warn!(
                    attempt = attempt,
                    reason = %fault.reason,
                    "tool block parse failed"
                );
            }
        }
    }

    tracing::error!(attempts = attempts, "tool generation failed");
    state.tool_generated.clear();
    state.tool_retrieved.clear();
    state.error = Some(PARSING_FAILED.to_string());
    state.decision = None;
    Ok(())
}
