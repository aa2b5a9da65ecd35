//! 进程内的脚本化内核：不启动解释器，由闭包决定每段代码的输出
//!
//! 用于测试流水线路由与沙箱生命周期；记录各角色的启动与关闭次数。

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::core::error::{KernelRole, SandboxError};
use crate::sandbox::kernel::{ExecOutput, Kernel, KernelLauncher};

type Handler = dyn Fn(KernelRole, &str) -> ExecOutput + Send + Sync;

#[derive(Default)]
struct Counters {
    attempts: AtomicUsize,
    main_launches: AtomicUsize,
    test_launches: AtomicUsize,
    main_shutdowns: AtomicUsize,
    test_shutdowns: AtomicUsize,
    /// 成功启动的内核及其工作目录
    dirs: Mutex<Vec<(KernelRole, PathBuf)>>,
}

impl Counters {
    fn launched(&self, role: KernelRole) -> &AtomicUsize {
        match role {
            KernelRole::Main => &self.main_launches,
            KernelRole::Test => &self.test_launches,
        }
    }

    fn shut(&self, role: KernelRole) -> &AtomicUsize {
        match role {
            KernelRole::Main => &self.main_shutdowns,
            KernelRole::Test => &self.test_shutdowns,
        }
    }
}

/// 脚本化启动器
pub struct ScriptedLauncher {
    handler: Arc<Handler>,
    counters: Arc<Counters>,
    fail_remaining: AtomicU32,
    fail_role: Option<KernelRole>,
}

impl ScriptedLauncher {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(KernelRole, &str) -> ExecOutput + Send + Sync + 'static,
    {
        Self {
            handler: Arc::new(handler),
            counters: Arc::new(Counters::default()),
            fail_remaining: AtomicU32::new(0),
            fail_role: None,
        }
    }

    /// 前 n 次启动失败（不区分角色）
    pub fn fail_first(self, n: u32) -> Self {
        self.fail_remaining.store(n, Ordering::SeqCst);
        self
    }

    /// 该角色的启动总是失败
    pub fn fail_role(mut self, role: KernelRole) -> Self {
        self.fail_role = Some(role);
        self
    }

    /// 启动尝试总数（含失败）
    pub fn launch_attempts(&self) -> usize {
        self.counters.attempts.load(Ordering::SeqCst)
    }

    /// 成功启动次数
    pub fn launches(&self, role: KernelRole) -> usize {
        self.counters.launched(role).load(Ordering::SeqCst)
    }

    pub fn shutdowns(&self, role: KernelRole) -> usize {
        self.counters.shut(role).load(Ordering::SeqCst)
    }

    /// 该角色各次成功启动时的工作目录
    pub fn launch_dirs(&self, role: KernelRole) -> Vec<PathBuf> {
        self.counters
            .dirs
            .lock()
            .map(|d| {
                d.iter()
                    .filter(|(r, _)| *r == role)
                    .map(|(_, p)| p.clone())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl KernelLauncher for ScriptedLauncher {
    async fn launch(
        &self,
        role: KernelRole,
        work_dir: &Path,
    ) -> Result<Box<dyn Kernel>, SandboxError> {
        self.counters.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_role == Some(role) {
            return Err(SandboxError::Launch(format!("scripted {} failure", role)));
        }
        let failed = self
            .fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(SandboxError::Launch("scripted startup failure".to_string()));
        }
        self.counters.launched(role).fetch_add(1, Ordering::SeqCst);
        if let Ok(mut dirs) = self.counters.dirs.lock() {
            dirs.push((role, work_dir.to_path_buf()));
        }
        Ok(Box::new(ScriptedKernel {
            role,
            handler: Arc::clone(&self.handler),
            counters: Arc::clone(&self.counters),
            closed: false,
        }))
    }
}

struct ScriptedKernel {
    role: KernelRole,
    handler: Arc<Handler>,
    counters: Arc<Counters>,
    closed: bool,
}

#[async_trait]
impl Kernel for ScriptedKernel {
    async fn execute(&mut self, code: &str, _timeout: Duration) -> ExecOutput {
        if self.closed {
            return ExecOutput::err("Kernel transport error: kernel closed");
        }
        (self.handler)(self.role, code)
    }

    async fn shutdown(&mut self) {
        if !self.closed {
            self.closed = true;
            self.counters.shut(self.role).fetch_add(1, Ordering::SeqCst);
        }
    }
}
