//! Final Answerer：根据 main 上下文的最终快照合成答案

use crate::core::error::PipelineError;
use crate::core::events::PipelineEvent;
use crate::core::state::{Decision, TaskState};
use crate::pipeline::prompts::{fill, ANALYST_ANSWER_PROMPT, MATH_ANSWER_PROMPT};
use crate::pipeline::{AnswerStyle, PipelineContext};
use crate::sandbox::Sandbox;

pub async fn answer(
    ctx: &PipelineContext,
    state: &mut TaskState,
    sandbox: &mut Sandbox,
) -> Result<(), PipelineError> {
    if state.final_answer.is_some() {
        return Err(PipelineError::InvalidState(
            "final answer already set".to_string(),
        ));
    }
    tracing::info!("generating final answer");

    let context = sandbox.final_context().await;
    let template = match ctx.settings.answer_style {
        AnswerStyle::Analyst => ANALYST_ANSWER_PROMPT,
        AnswerStyle::Math => MATH_ANSWER_PROMPT,
    };
    let prompt = fill(
        template,
        &[
            ("problem", state.problem.as_str()),
            ("context", context.render().as_str()),
        ],
    );
    let reply = ctx.ask("answerer", prompt).await?;
    let reply = reply.trim().to_string();

    ctx.emit(PipelineEvent::Finished {
        answer_len: reply.chars().count(),
    });
    state.final_answer = Some(reply);
    state.decision = Some(Decision::End);
    Ok(())
}
