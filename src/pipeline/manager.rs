//! Tool Manager：为当前子任务决定复用、新建或不用工具

use crate::core::error::PipelineError;
use crate::core::events::{PipelineEvent, ToolSource};
use crate::core::state::{Decision, TaskState, ToolCandidate};
use crate::pipeline::parse::{parse_verdict, Verdict};
use crate::pipeline::prompts::{fill, MANAGER_PROMPT};
use crate::pipeline::PipelineContext;

fn render_candidates(candidates: &[ToolCandidate]) -> String {
    candidates
        .iter()
        .enumerate()
        .map(|(i, c)| {
            format!(
                "[{}] Name: {}\n    Description: {}\n    Code: {}",
                i, c.tool.name, c.tool.docstring, c.tool.code
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub async fn select_tool(ctx: &PipelineContext, state: &mut TaskState) -> Result<(), PipelineError> {
    let subtask = state
        .current_subtask()
        .cloned()
        .ok_or_else(|| PipelineError::InvalidState("tool lookup past end of plan".to_string()))?;
    tracing::info!(
        step = state.current_step_index + 1,
        total = state.plan.len(),
        subtask = %subtask.name,
        "checking tools"
    );

    let candidates = match ctx
        .memory
        .search(&subtask.description, ctx.settings.memory_top_k)
        .await
    {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(error = %e, "tool memory search failed, creating a new tool");
            Vec::new()
        }
    };

    if candidates.is_empty() {
        tracing::info!("no candidate tools in memory");
        state.tool_retrieved.clear();
        state.decision = Some(Decision::Create);
        return Ok(());
    }

    let prompt = fill(
        MANAGER_PROMPT,
        &[
            ("task", subtask.description.as_str()),
            ("candidates", render_candidates(&candidates).as_str()),
        ],
    );
    let reply = ctx.ask("manager", prompt).await?;

    match parse_verdict(&reply, candidates.len()) {
        Ok(Verdict::Reuse(i)) => {
            let tool = candidates[i].tool.clone();
            tracing::info!(tool = %tool.name, score = candidates[i].score, "reusing tool");
            ctx.emit(PipelineEvent::ToolSelected {
                name: tool.name.clone(),
                source: ToolSource::Memory,
            });
            state.tool_retrieved = vec![tool];
            state.tool_generated.clear();
            state.decision = Some(Decision::Solve);
        }
        Ok(Verdict::NoTool) => {
            tracing::info!("no tool needed for this subtask");
            ctx.emit(PipelineEvent::ToolSelected {
                name: String::new(),
                source: ToolSource::NoTool,
            });
            state.clear_tools();
            state.decision = Some(Decision::Solve);
        }
        Ok(Verdict::Create) => {
            tracing::info!("candidates rejected, creating a new tool");
            state.tool_retrieved.clear();
            state.decision = Some(Decision::Create);
        }
        Err(fault) => {
            tracing::warn!(reason = %fault.reason, "unparseable manager verdict, creating a new tool");
            state.clear_tools();
            state.decision = Some(Decision::Create);
        }
    }
    Ok(())
}
