//! 沙箱：一个任务独占的两个执行上下文
//!
//! - main：有状态，任务期间从不重置，只有 Solver 写入
//! - test：一次性，每次验证都在全新内核上执行，执行后立即销毁；
//!   内核的工作目录是私有临时目录，随内核一起删除，任务目录不会被写入
//!
//! shutdown 幂等；即使调用方忘记 shutdown，内核在 Drop 时也会被杀掉、运行时目录被删除。

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use crate::config::SandboxSection;
use crate::core::error::{KernelRole, SandboxError};
use crate::sandbox::inspect::{
    parse_final_context, parse_inventory, FinalContext, FINAL_CONTEXT_PROBE, INVENTORY_PROBE,
};
use crate::sandbox::kernel::{ExecOutput, Kernel, KernelLauncher};

/// 执行模式
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecMode {
    /// 在 main 上下文执行，状态保留
    Permanent,
    /// 在全新的 test 上下文执行，执行后销毁
    Temporary,
}

/// 沙箱运行参数
#[derive(Clone, Debug)]
pub struct SandboxSettings {
    pub exec_timeout: Duration,
    pub startup_attempts: u32,
    /// 首次重试等待，之后每次翻倍
    pub startup_backoff: Duration,
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            exec_timeout: Duration::from_secs(30),
            startup_attempts: 3,
            startup_backoff: Duration::from_secs(2),
        }
    }
}

impl From<&SandboxSection> for SandboxSettings {
    fn from(s: &SandboxSection) -> Self {
        Self {
            exec_timeout: s.exec_timeout(),
            startup_attempts: s.startup_attempts.max(1),
            startup_backoff: s.startup_backoff(),
        }
    }
}

/// 两上下文沙箱
pub struct Sandbox {
    launcher: Arc<dyn KernelLauncher>,
    work_dir: PathBuf,
    settings: SandboxSettings,
    main: Option<Box<dyn Kernel>>,
    /// 尚未使用过的 test 内核
    test: Option<IsolatedKernel>,
    closed: bool,
}

impl Sandbox {
    /// 启动 main 与 test 两个内核；test 启动失败时先关闭 main 再返回错误
    pub async fn start(
        launcher: Arc<dyn KernelLauncher>,
        work_dir: impl Into<PathBuf>,
        settings: SandboxSettings,
    ) -> Result<Self, SandboxError> {
        let work_dir = work_dir.into();
        let mut main =
            launch_with_retry(launcher.as_ref(), KernelRole::Main, &work_dir, &settings).await?;
        let test = match launch_isolated(launcher.as_ref(), &settings).await {
            Ok(k) => k,
            Err(e) => {
                main.shutdown().await;
                return Err(e);
            }
        };
        tracing::info!(work_dir = %work_dir.display(), "sandbox started");
        Ok(Self {
            launcher,
            work_dir,
            settings,
            main: Some(main),
            test: Some(test),
            closed: false,
        })
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// 执行代码
    ///
    /// 代码错误、超时都体现在返回的 stderr 中；Err 只表示沙箱已关闭或 test 内核无法重新启动。
    pub async fn run(&mut self, code: &str, mode: ExecMode) -> Result<ExecOutput, SandboxError> {
        if self.closed {
            return Err(SandboxError::Closed);
        }
        let timeout = self.settings.exec_timeout;
        match mode {
            ExecMode::Permanent => {
                let main = self.main.as_mut().ok_or(SandboxError::Closed)?;
                Ok(main.execute(code, timeout).await)
            }
            ExecMode::Temporary => {
                let mut isolated = match self.test.take() {
                    Some(k) => k,
                    None => launch_isolated(self.launcher.as_ref(), &self.settings).await?,
                };
                let out = isolated.kernel.execute(code, timeout).await;
                isolated.shutdown().await;
                Ok(out)
            }
        }
    }

    /// main 上下文的变量清单（名 -> 类型名）；失败时返回空表并记录错误
    pub async fn inspect_globals(&mut self) -> BTreeMap<String, String> {
        match self.run(INVENTORY_PROBE, ExecMode::Permanent).await {
            Ok(out) if out.is_ok() => match parse_inventory(&out.stdout) {
                Ok(inv) => inv,
                Err(e) => {
                    tracing::error!(error = %e, "failed to parse variable inventory");
                    BTreeMap::new()
                }
            },
            Ok(out) => {
                tracing::error!(stderr = %out.stderr, "variable inventory probe failed");
                BTreeMap::new()
            }
            Err(e) => {
                tracing::error!(error = %e, "variable inventory unavailable");
                BTreeMap::new()
            }
        }
    }

    /// main 上下文的最终快照；失败时返回空上下文并记录错误
    pub async fn final_context(&mut self) -> FinalContext {
        match self.run(FINAL_CONTEXT_PROBE, ExecMode::Permanent).await {
            Ok(out) if out.is_ok() => match parse_final_context(&out.stdout) {
                Ok(ctx) => ctx,
                Err(e) => {
                    tracing::error!(error = %e, "failed to parse final context");
                    FinalContext::default()
                }
            },
            Ok(out) => {
                tracing::error!(stderr = %out.stderr, "final context probe failed");
                FinalContext::default()
            }
            Err(e) => {
                tracing::error!(error = %e, "final context unavailable");
                FinalContext::default()
            }
        }
    }

    /// 关闭两个内核；重复调用无副作用
    pub async fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some(mut k) = self.main.take() {
            k.shutdown().await;
        }
        if let Some(k) = self.test.take() {
            k.shutdown().await;
        }
        tracing::info!(work_dir = %self.work_dir.display(), "sandbox shut down");
    }
}

/// test 内核及其私有工作目录
struct IsolatedKernel {
    kernel: Box<dyn Kernel>,
    dir: TempDir,
}

impl IsolatedKernel {
    async fn shutdown(mut self) {
        self.kernel.shutdown().await;
        let path = self.dir.path().to_path_buf();
        if let Err(e) = self.dir.close() {
            tracing::warn!(dir = %path.display(), error = %e, "failed to remove test kernel dir");
        }
    }
}

/// 在新建的临时目录中启动 test 内核
async fn launch_isolated(
    launcher: &dyn KernelLauncher,
    settings: &SandboxSettings,
) -> Result<IsolatedKernel, SandboxError> {
    let dir = tempfile::Builder::new().prefix("toolsmith-test-").tempdir()?;
    let kernel = launch_with_retry(launcher, KernelRole::Test, dir.path(), settings).await?;
    Ok(IsolatedKernel { kernel, dir })
}

/// 带指数退避的内核启动
async fn launch_with_retry(
    launcher: &dyn KernelLauncher,
    role: KernelRole,
    work_dir: &Path,
    settings: &SandboxSettings,
) -> Result<Box<dyn Kernel>, SandboxError> {
    let attempts = settings.startup_attempts.max(1);
    let mut delay = settings.startup_backoff;
    let mut last_err = String::new();
    for attempt in 1..=attempts {
        match launcher.launch(role, work_dir).await {
            Ok(k) => return Ok(k),
            Err(e) => {
                last_err = e.to_string();
                tracing::warn!(
                    role = %role,
                    attempt = attempt,
                    attempts = attempts,
                    error = %e,
                    "kernel start failed"
                );
                if attempt < attempts {
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }
        }
    }
    Err(SandboxError::Startup {
        attempts,
        role,
        reason: last_err,
    })
}
