//! Solver：在有状态的 main 上下文中用已验证的工具推进当前子任务
//!
//! 每个子任务最多 solver_max_attempts 次执行；失败的尝试作为「之前失败的尝试」写进下一次提示词。
//! 全部失败时写入一条 solver 失败记录并退回 Creator，步数游标不前进。
//! 成功后刷新变量清单、把生成的工具存入工具记忆、清空工具与失败历史、游标加一。

use crate::core::error::PipelineError;
use crate::core::events::PipelineEvent;
use crate::core::state::{Decision, FeedbackEntry, FeedbackSource, Subtask, TaskState};
use crate::pipeline::parse::extract_code_block;
use crate::pipeline::prompts::{fill, render_tool_list, SOLVER_PROMPT, SOLVER_RETRY_SUFFIX};
use crate::pipeline::PipelineContext;
use crate::sandbox::{ExecMode, Sandbox};

/// 本子任务内一次失败的执行
struct FailedAttempt {
    code: String,
    error: String,
}

fn build_prompt(
    subtask: &Subtask,
    state: &TaskState,
    context: &str,
    failures: &[FailedAttempt],
) -> String {
    let task = format!("{}: {}", subtask.name, subtask.description);
    let inventory = serde_json::to_string(&state.variable_inventory).unwrap_or_default();
    let log = if state.context_log.is_empty() {
        "(none)".to_string()
    } else {
        state.context_log.join("\n")
    };
    let mut prompt = fill(
        SOLVER_PROMPT,
        &[
            ("task", task.as_str()),
            ("tools", render_tool_list(state.active_tools()).as_str()),
            ("inventory", inventory.as_str()),
            ("context", context),
            ("log", log.as_str()),
        ],
    );
    if !failures.is_empty() {
        prompt.push_str("\n\nPREVIOUS FAILED ATTEMPTS (LEARN FROM MISTAKES):\n");
        for f in failures {
            prompt.push_str(&format!("- Code:\n{}\n- Error:\n{}\n\n", f.code, f.error));
        }
        prompt.push_str(SOLVER_RETRY_SUFFIX);
    }
    prompt
}

pub async fn solve(
    ctx: &PipelineContext,
    state: &mut TaskState,
    sandbox: &mut Sandbox,
) -> Result<(), PipelineError> {
    let subtask = state
        .current_subtask()
        .cloned()
        .ok_or_else(|| PipelineError::InvalidState("solving past end of plan".to_string()))?;
    let step = state.current_step_index;
    tracing::info!(step = step + 1, subtask = %subtask.name, "solving");

    let definitions = state.tool_definitions();
    let context = sandbox.final_context().await.render();
    let max_attempts = ctx.settings.solver_max_attempts;
    let mut failures: Vec<FailedAttempt> = Vec::new();

    for attempt in 1..=max_attempts {
        let reply = ctx
            .ask("solver", build_prompt(&subtask, state, &context, &failures))
            .await?;
        let exec_code = extract_code_block(&reply);
        let program = if definitions.is_empty() {
            exec_code.clone()
        } else {
            format!("{}\n\n# Execution\n{}", definitions, exec_code)
        };

        let out = sandbox.run(&program, ExecMode::Permanent).await?;
        ctx.emit(PipelineEvent::SolverAttempt {
            attempt,
            ok: out.is_ok(),
        });

        if out.is_ok() {
            return finish_step(ctx, state, sandbox, &subtask, &exec_code, &out.stdout).await;
        }

        tracing::warn!(attempt = attempt, stderr = %out.stderr, "solver execution failed");
        failures.push(FailedAttempt {
            code: exec_code,
            error: out.stderr,
        });
    }

    tracing::error!(attempts = max_attempts, "solver retries exhausted");
    let last = failures.pop().unwrap_or(FailedAttempt {
        code: String::new(),
        error: String::new(),
    });
    state.feedback_history.push(FeedbackEntry {
        source: FeedbackSource::Solver,
        tool_code: definitions,
        attempted_code: last.code,
        error_text: last.error.clone(),
    });
    state.error = Some(format!("Runtime Error: {}", last.error));
    state.decision = Some(Decision::RetryCreate);
    Ok(())
}

async fn finish_step(
    ctx: &PipelineContext,
    state: &mut TaskState,
    sandbox: &mut Sandbox,
    subtask: &Subtask,
    exec_code: &str,
    stdout: &str,
) -> Result<(), PipelineError> {
    let inventory = sandbox.inspect_globals().await;
    if inventory.is_empty() && !state.variable_inventory.is_empty() {
        tracing::warn!("inventory refresh returned nothing, keeping previous inventory");
    } else {
        state.variable_inventory = inventory;
    }

    for tool in &state.tool_generated {
        if let Err(e) = ctx.memory.add(tool).await {
            tracing::error!(tool = %tool.name, error = %e, "failed to persist tool");
        }
    }

    let mut entry = format!("Step {} ({}):\n{}", state.current_step_index + 1, subtask.name, exec_code);
    if !stdout.trim().is_empty() {
        entry.push_str(&format!("\nOutput:\n{}", stdout.trim()));
    }
    state.context_log.push(entry);

    state.clear_tools();
    state.feedback_history.clear();
    state.error = None;
    state.current_step_index += 1;
    state.decision = Some(Decision::Continue);
    tracing::info!(step = state.current_step_index, total = state.plan.len(), "subtask solved");
    ctx.emit(PipelineEvent::StepCompleted {
        step: state.current_step_index,
    });
    Ok(())
}
