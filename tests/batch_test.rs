//! 批处理：跳过已完成任务、失败不中断、结果写盘

mod common;

use std::sync::Arc;

use common::*;
use tokio_util::sync::CancellationToken;
use toolsmith::batch::{parse_tasks, BatchRunner, BatchSummary, ResultLog};
use toolsmith::core::{KernelRole, Orchestrator};
use toolsmith::llm::MockLlmClient;
use toolsmith::memory::InMemoryToolMemory;
use toolsmith::pipeline::PipelineSettings;

fn batch_llm() -> Arc<MockLlmClient> {
    Arc::new(MockLlmClient::with_responder(|p| match prompt_kind(p) {
        PromptKind::Planner if p.contains("BROKEN") => "no plan".to_string(),
        PromptKind::Planner => plan_json(&[("compute_mean", "Compute the arithmetic mean")]),
        PromptKind::Manager => "CREATE".to_string(),
        PromptKind::Creator | PromptKind::Repair => GOOD_TOOL.to_string(),
        PromptKind::Tester => UNIT_TEST.to_string(),
        PromptKind::Solver => "```python\navg = mean([2, 4, 6])\n```".to_string(),
        PromptKind::Answer => "4.0".to_string(),
        _ => String::new(),
    }))
}

#[tokio::test]
async fn batch_resumes_and_survives_failures() {
    let dir = tempfile::tempdir().unwrap();
    let results = dir.path().join("result").join("result.json");
    let mut log = ResultLog::load(&results).unwrap();
    log.record("done", "already answered").unwrap();

    let tasks = parse_tasks(
        r#"[
            {"id": "done", "problem": "mean of [1, 2]"},
            {"id": "broken", "problem": "BROKEN task"},
            {"id": "fresh", "problem": "mean of [2, 4, 6]"}
        ]"#,
        dir.path(),
    )
    .unwrap();

    let (launcher, _globals) = scripted_launcher();
    let cancel = CancellationToken::new();
    let orchestrator = Orchestrator::new(
        batch_llm(),
        Arc::new(InMemoryToolMemory::new()),
        PipelineSettings::default(),
    )
    .with_cancel(cancel.clone());
    let runner = BatchRunner::new(orchestrator, launcher.clone(), fast_sandbox_settings(), cancel);

    let summary = runner.run(&tasks, &mut log).await.unwrap();
    assert_eq!(
        summary,
        BatchSummary {
            solved: 1,
            failed: 1,
            skipped: 1,
            stopped: false,
        }
    );

    // 每个任务独占一个沙箱，且都被关闭
    assert_eq!(launcher.launches(KernelRole::Main), 2);
    assert_eq!(launcher.shutdowns(KernelRole::Main), 2);

    let reloaded = ResultLog::load(&results).unwrap();
    assert_eq!(reloaded.get("done"), Some("already answered"));
    assert_eq!(reloaded.get("fresh"), Some("4.0"));
    assert!(!reloaded.contains("broken"));
}

#[tokio::test]
async fn stopped_batch_starts_no_new_task() {
    let dir = tempfile::tempdir().unwrap();
    let mut log = ResultLog::load(dir.path().join("result.json")).unwrap();
    let tasks = parse_tasks("{\"id\": \"a\", \"problem\": \"mean\"}\n", dir.path()).unwrap();

    let (launcher, _globals) = scripted_launcher();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let orchestrator = Orchestrator::new(
        batch_llm(),
        Arc::new(InMemoryToolMemory::new()),
        PipelineSettings::default(),
    );
    let runner = BatchRunner::new(orchestrator, launcher.clone(), fast_sandbox_settings(), cancel);

    let summary = runner.run(&tasks, &mut log).await.unwrap();
    assert!(summary.stopped);
    assert_eq!(launcher.launch_attempts(), 0);
    assert!(log.is_empty());
}
