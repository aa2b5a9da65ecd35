//! Tool Tester：在一次性上下文里验证生成的工具
//!
//! 1. 所有工具定义一起加载；有错误即为定义级失败，直接退回 Creator（不写失败历史）
//! 2. 每个工具单独生成单测并执行（定义前置）；第一个失败即停止，写入一条 tester 失败记录
//! 3. 全部通过则进入 Solver

use crate::core::error::PipelineError;
use crate::core::events::PipelineEvent;
use crate::core::state::{Decision, FeedbackEntry, FeedbackSource, TaskState, Tool};
use crate::pipeline::creator::PARSING_FAILED;
use crate::pipeline::parse::{extract_code_block, unit_test_passed};
use crate::pipeline::prompts::{fill, render_feedback, TEST_PROMPT};
use crate::pipeline::PipelineContext;
use crate::sandbox::{ExecMode, Sandbox};

fn build_prompt(tool: &Tool, state: &TaskState) -> String {
    let history = if state.feedback_history.is_empty() {
        String::new()
    } else {
        format!(
            "\nPrevious Attempts & Failures:\n{}",
            render_feedback(&state.feedback_history)
        )
    };
    fill(
        TEST_PROMPT,
        &[
            ("name", tool.name.as_str()),
            ("code", tool.code.as_str()),
            ("history", history.as_str()),
        ],
    )
}

pub async fn test_tools(
    ctx: &PipelineContext,
    state: &mut TaskState,
    sandbox: &mut Sandbox,
) -> Result<(), PipelineError> {
    let tools = state.tool_generated.clone();
    if tools.is_empty() {
        tracing::warn!("no generated tool to test, returning to creator");
        if state.error.is_none() {
            state.error = Some(PARSING_FAILED.to_string());
        }
        state.decision = Some(Decision::RetryCreate);
        return Ok(());
    }

    tracing::info!(tools = tools.len(), "testing tools");
    let definitions = state.tool_definitions();
    let load = sandbox.run(&definitions, ExecMode::Temporary).await?;
    if !load.is_ok() {
        tracing::error!(stderr = %load.stderr, "tool definitions failed to load");
        for t in &tools {
            ctx.emit(PipelineEvent::ToolTested {
                name: t.name.clone(),
                passed: false,
            });
        }
        state.error = Some(format!(
            "Syntax Error during function definition:\n{}",
            load.stderr
        ));
        state.decision = Some(Decision::RetryCreate);
        return Ok(());
    }

    for tool in &tools {
        tracing::info!(tool = %tool.name, "testing tool");
        let reply = ctx.ask("tester", build_prompt(tool, state)).await?;
        let test_code = extract_code_block(&reply);
        let program = format!("{}\n\n{}", definitions, test_code);
        let result = sandbox.run(&program, ExecMode::Temporary).await?;

        let passed = unit_test_passed(&result.stderr);
        ctx.emit(PipelineEvent::ToolTested {
            name: tool.name.clone(),
            passed,
        });
        if passed {
            tracing::info!(tool = %tool.name, "tool passed");
            continue;
        }

        tracing::warn!(tool = %tool.name, stderr = %result.stderr, "tool failed its unit test");
        state.feedback_history.push(FeedbackEntry {
            source: FeedbackSource::Tester,
            tool_code: tool.code.clone(),
            attempted_code: test_code,
            error_text: result.stderr.clone(),
        });
        state.error = Some(result.stderr);
        state.decision = Some(Decision::RetryCreate);
        return Ok(());
    }

    state.error = None;
    state.decision = Some(Decision::Solve);
    Ok(())
}
