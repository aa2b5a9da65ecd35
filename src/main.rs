//! Toolsmith 命令行入口
//!
//! - `toolsmith run [tasks.json]`：批量求解，结果写入结果日志，可中断续跑
//! - `toolsmith solve <problem> [work_dir]`：求解单个问题并打印答案
//! - `toolsmith tools`：列出工具库中的工具
//!
//! 全局参数 `--config <path>` 追加一个配置文件。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use toolsmith::batch::{load_tasks, BatchRunner, ResultLog};
use toolsmith::config::{load_config, AppConfig};
use toolsmith::core::{Orchestrator, ShutdownManager};
use toolsmith::llm::message::preview;
use toolsmith::llm::provider::{resolve_api_key, resolve_base_url};
use toolsmith::llm::{create_embedder_from_config, create_llm_from_config};
use toolsmith::memory::{InMemoryToolMemory, SqliteToolMemory, ToolMemory};
use toolsmith::pipeline::PipelineSettings;
use toolsmith::sandbox::{KernelLauncher, PythonLauncher, SandboxSettings};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const USAGE: &str = "usage: toolsmith [--config <path>] <run [tasks.json] | solve <problem> [work_dir] | tools>";

enum Command {
    Run(Option<PathBuf>),
    Solve { problem: String, work_dir: PathBuf },
    Tools,
}

fn parse_args(mut args: Vec<String>) -> anyhow::Result<(Option<PathBuf>, Command)> {
    let mut config_path = None;
    if let Some(pos) = args.iter().position(|a| a == "--config") {
        if pos + 1 >= args.len() {
            bail!("--config needs a path\n{}", USAGE);
        }
        config_path = Some(PathBuf::from(args.remove(pos + 1)));
        args.remove(pos);
    }

    let mut it = args.into_iter();
    let cmd = match it.next().as_deref() {
        Some("run") | None => Command::Run(it.next().map(PathBuf::from)),
        Some("solve") => {
            let problem = it.next().context(USAGE)?;
            let work_dir = it.next().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));
            Command::Solve { problem, work_dir }
        }
        Some("tools") => Command::Tools,
        Some(other) => bail!("unknown command '{}'\n{}", other, USAGE),
    };
    Ok((config_path, cmd))
}

fn open_sqlite(cfg: &AppConfig) -> anyhow::Result<SqliteToolMemory> {
    let embedder = create_embedder_from_config(
        cfg.memory.embeddings,
        resolve_base_url(&cfg.llm).as_deref(),
        &cfg.memory.embedding_model,
        resolve_api_key(&cfg.llm).as_deref(),
    );
    let path = cfg.tool_db_path();
    SqliteToolMemory::open(&path, embedder)
        .with_context(|| format!("failed to open tool store {}", path.display()))
}

fn create_memory(cfg: &AppConfig) -> anyhow::Result<Arc<dyn ToolMemory>> {
    match cfg.memory.backend.as_str() {
        "memory" => Ok(Arc::new(InMemoryToolMemory::new())),
        _ => Ok(Arc::new(open_sqlite(cfg)?)),
    }
}

fn list_tools(cfg: &AppConfig) -> anyhow::Result<()> {
    let store = open_sqlite(cfg)?;
    let tools = store.list()?;
    println!("Total tools stored: {}", tools.len());
    for t in tools {
        println!(
            "- {} [{}] {}\n  docstring: {}\n  code: {}",
            t.tool.name,
            t.created_at,
            if t.has_embedding { "(embedded)" } else { "" },
            preview(&t.tool.docstring, 80),
            preview(&t.tool.code.replace('\n', " "), 120),
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 日志：默认 info，可通过 RUST_LOG 覆盖
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive("info".parse()?))
        .with(fmt::layer())
        .init();

    let (config_path, command) = parse_args(std::env::args().skip(1).collect())?;
    let cfg = load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });

    if let Command::Tools = command {
        return list_tools(&cfg);
    }

    let shutdown = Arc::new(ShutdownManager::new());
    shutdown.install_signal_handlers();

    let llm = create_llm_from_config(&cfg.llm);
    let memory = create_memory(&cfg)?;
    let orchestrator = Orchestrator::new(llm.clone(), memory, PipelineSettings::from(&cfg.pipeline))
        .with_cancel(shutdown.token());
    let launcher: Arc<dyn KernelLauncher> = Arc::new(PythonLauncher::new(
        cfg.sandbox.python_command.clone(),
        cfg.sandbox.startup_timeout(),
    ));
    let sandbox_settings = SandboxSettings::from(&cfg.sandbox);

    match command {
        Command::Solve { problem, work_dir } => {
            let state = orchestrator
                .run_task(launcher, &problem, work_dir, sandbox_settings)
                .await
                .context("task failed")?;
            println!("{}", state.final_answer.unwrap_or_default());
        }
        Command::Run(tasks_file) => {
            let tasks_file = tasks_file
                .or_else(|| cfg.batch.tasks_file.clone())
                .context(USAGE)?;
            let tasks = load_tasks(&tasks_file)?;
            let mut log = ResultLog::load(cfg.results_path())
                .with_context(|| format!("failed to load {}", cfg.results_path().display()))?;
            tracing::info!(
                tasks = tasks.len(),
                answered = log.len(),
                results = %log.path().display(),
                "starting batch"
            );

            let runner = BatchRunner::new(orchestrator, launcher, sandbox_settings, shutdown.token());
            runner.run(&tasks, &mut log).await.context("batch run failed")?;
        }
        Command::Tools => {}
    }

    if let Some(reason) = shutdown.reason() {
        tracing::info!(reason = ?reason, "stopped early");
    }
    let (prompt, completion, total) = llm.token_usage();
    tracing::info!(prompt = prompt, completion = completion, total = total, "token usage");
    Ok(())
}
