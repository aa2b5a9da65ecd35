//! 执行内核：一个绑定工作目录的 Python 解释器进程
//!
//! 协议：stdin/stdout 上逐行 JSON。
//! - 启动后 runner 发送 `{"type":"ready"}`
//! - 请求 `{"type":"exec","id":..,"code":..}`，响应 `{"type":"exec_result","id":..,"stdout":..,"stderr":..}`
//! - 请求 `{"type":"shutdown"}` 后 runner 退出
//!
//! 代码在 `__main__` 命名空间执行，变量跨请求保留。未捕获异常以 `类型: 消息` 写入 stderr。
//! 超时或传输错误都折叠进 stderr 返回，不会以 Err 形式逃逸到调用方。
//! 超时后向解释器发送 SIGINT，使有状态上下文可以继续使用。
//! 被执行的代码读不到协议流：fd 0 被替换为 /dev/null，`input()` 得到 EOFError。

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc;

use crate::core::error::{KernelRole, SandboxError};
use crate::llm::message::preview;

/// 超时时返回的合成错误文本
pub const TIMEOUT_MESSAGE: &str = "Timeout";

/// 一次执行的输出；stderr 为空即成功
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn err(stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.stderr.trim().is_empty()
    }
}

/// 执行内核
#[async_trait]
pub trait Kernel: Send {
    /// 执行代码；超时返回 stderr = "Timeout"
    async fn execute(&mut self, code: &str, timeout: Duration) -> ExecOutput;

    /// 关闭内核并释放运行时目录；重复调用无副作用
    async fn shutdown(&mut self);
}

/// 内核启动器：真实实现为 PythonLauncher，测试使用 ScriptedLauncher
#[async_trait]
pub trait KernelLauncher: Send + Sync {
    async fn launch(
        &self,
        role: KernelRole,
        work_dir: &Path,
    ) -> Result<Box<dyn Kernel>, SandboxError>;
}

const RUNNER: &str = r#"
import os as _os, json as _json, io as _io, contextlib as _contextlib
import __main__ as _main

_proto = _os.fdopen(_os.dup(1), "w", buffering=1, encoding="utf-8")
_os.dup2(2, 1)
_proto_in = _os.fdopen(_os.dup(0), "r", encoding="utf-8")
_null = _os.open(_os.devnull, _os.O_RDONLY)
_os.dup2(_null, 0)
_os.close(_null)

def _send(_msg):
    _proto.write(_json.dumps(_msg) + "\n")
    _proto.flush()

def _handle(_line):
    try:
        _req = _json.loads(_line)
    except Exception as _e:
        _send({"type": "protocol_error", "message": str(_e)})
        return True
    if _req.get("type") == "shutdown":
        return False
    if _req.get("type") != "exec":
        return True
    _out, _err = _io.StringIO(), _io.StringIO()
    with _contextlib.redirect_stdout(_out), _contextlib.redirect_stderr(_err):
        try:
            exec(compile(_req.get("code", ""), "<cell>", "exec"), _main.__dict__)
        except BaseException as _e:
            _err.write("%s: %s" % (type(_e).__name__, _e))
    _send({"type": "exec_result", "id": _req.get("id"), "stdout": _out.getvalue(), "stderr": _err.getvalue()})
    return True

_send({"type": "ready"})
while True:
    try:
        _line = _proto_in.readline()
        if not _line:
            break
        if _line.strip() and not _handle(_line.strip()):
            break
    except KeyboardInterrupt:
        continue
"#;

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum KernelRequest<'a> {
    Exec { id: &'a str, code: &'a str },
    Shutdown,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum KernelReply {
    Ready,
    ExecResult {
        id: Option<String>,
        stdout: String,
        stderr: String,
    },
    ProtocolError {
        message: String,
    },
}

/// Python 内核进程
pub struct PythonKernel {
    role: KernelRole,
    child: Child,
    stdin: Option<ChildStdin>,
    replies: mpsc::UnboundedReceiver<KernelReply>,
    runtime_dir: Option<TempDir>,
}

impl PythonKernel {
    /// 启动解释器并等待 ready 握手
    pub async fn start(
        python_command: &str,
        role: KernelRole,
        work_dir: &Path,
        startup_timeout: Duration,
    ) -> Result<Self, SandboxError> {
        let mut parts = python_command.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| SandboxError::Launch("empty python command".to_string()))?;

        let runtime_dir = tempfile::Builder::new()
            .prefix("toolsmith-kernel-")
            .tempdir()?;

        let mut child = Command::new(program)
            .args(parts)
            .arg("-u")
            .arg("-c")
            .arg(RUNNER)
            .current_dir(work_dir)
            .env("TMPDIR", runtime_dir.path())
            .env("MPLBACKEND", "Agg")
            .env("PYTHONIOENCODING", "utf-8")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                SandboxError::Launch(format!(
                    "failed to spawn python interpreter `{}`: {}",
                    python_command, e
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SandboxError::Launch("failed to capture kernel stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SandboxError::Launch("failed to capture kernel stdout".to_string()))?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(role = %role, line = %line, "kernel stderr");
                }
            });
        }

        let (tx, replies) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<KernelReply>(line) {
                    Ok(reply) => {
                        if tx.send(reply).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(role = %role, error = %e, raw = %preview(line, 200), "invalid kernel message");
                    }
                }
            }
        });

        let mut kernel = Self {
            role,
            child,
            stdin: Some(stdin),
            replies,
            runtime_dir: Some(runtime_dir),
        };

        match tokio::time::timeout(startup_timeout, kernel.replies.recv()).await {
            Ok(Some(KernelReply::Ready)) => {
                tracing::debug!(role = %role, work_dir = %work_dir.display(), "kernel ready");
                Ok(kernel)
            }
            Ok(Some(other)) => {
                kernel.shutdown().await;
                Err(SandboxError::Launch(format!(
                    "unexpected first message from kernel: {:?}",
                    other
                )))
            }
            Ok(None) => {
                kernel.shutdown().await;
                Err(SandboxError::Launch(
                    "kernel exited before handshake".to_string(),
                ))
            }
            Err(_) => {
                kernel.shutdown().await;
                Err(SandboxError::HandshakeTimeout(startup_timeout))
            }
        }
    }

    async fn send(&mut self, request: &KernelRequest<'_>) -> std::io::Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::BrokenPipe, "kernel closed"))?;
        let mut line = serde_json::to_vec(request)?;
        line.push(b'\n');
        stdin.write_all(&line).await?;
        stdin.flush().await
    }

    /// 向解释器发送 SIGINT，中断仍在运行的单元；其结果随后作为过期结果丢弃
    #[cfg(unix)]
    fn interrupt(&self) {
        if let Some(pid) = self.child.id() {
            // SAFETY: pid 来自本进程启动且尚未回收的子进程
            unsafe {
                libc::kill(pid as libc::pid_t, libc::SIGINT);
            }
        }
    }

    #[cfg(not(unix))]
    fn interrupt(&self) {}
}

#[async_trait]
impl Kernel for PythonKernel {
    async fn execute(&mut self, code: &str, timeout: Duration) -> ExecOutput {
        let id = uuid::Uuid::new_v4().to_string();
        tracing::debug!(role = %self.role, id = %id, code = %preview(code, 200), "kernel execute");

        if let Err(e) = self
            .send(&KernelRequest::Exec {
                id: &id,
                code,
            })
            .await
        {
            return ExecOutput::err(format!("Kernel transport error: {}", e));
        }

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match tokio::time::timeout_at(deadline, self.replies.recv()).await {
                Err(_) => {
                    tracing::warn!(role = %self.role, id = %id, "kernel execution timed out");
                    self.interrupt();
                    return ExecOutput::err(TIMEOUT_MESSAGE);
                }
                Ok(None) => {
                    return ExecOutput::err("Kernel transport error: kernel exited unexpectedly");
                }
                Ok(Some(KernelReply::ExecResult {
                    id: reply_id,
                    stdout,
                    stderr,
                })) => {
                    if reply_id.as_deref() == Some(id.as_str()) {
                        return ExecOutput { stdout, stderr };
                    }
                    tracing::debug!(role = %self.role, stale = ?reply_id, "discarding stale kernel result");
                }
                Ok(Some(KernelReply::ProtocolError { message })) => {
                    return ExecOutput::err(format!("Kernel protocol error: {}", message));
                }
                Ok(Some(KernelReply::Ready)) => {}
            }
        }
    }

    async fn shutdown(&mut self) {
        if self.stdin.is_some() {
            let _ = self.send(&KernelRequest::Shutdown).await;
        }
        if let Some(mut stdin) = self.stdin.take() {
            let _ = stdin.shutdown().await;
        }
        if tokio::time::timeout(Duration::from_millis(500), self.child.wait())
            .await
            .is_err()
        {
            let _ = self.child.kill().await;
            let _ = self.child.wait().await;
        }
        if let Some(dir) = self.runtime_dir.take() {
            if let Err(e) = dir.close() {
                tracing::warn!(role = %self.role, error = %e, "failed to remove kernel runtime dir");
            }
        }
    }
}

impl Drop for PythonKernel {
    fn drop(&mut self) {
        self.child.start_kill().ok();
    }
}

/// 启动 PythonKernel 的启动器
#[derive(Debug, Clone)]
pub struct PythonLauncher {
    python_command: String,
    startup_timeout: Duration,
}

impl PythonLauncher {
    pub fn new(python_command: impl Into<String>, startup_timeout: Duration) -> Self {
        Self {
            python_command: python_command.into(),
            startup_timeout,
        }
    }
}

#[async_trait]
impl KernelLauncher for PythonLauncher {
    async fn launch(
        &self,
        role: KernelRole,
        work_dir: &Path,
    ) -> Result<Box<dyn Kernel>, SandboxError> {
        let kernel =
            PythonKernel::start(&self.python_command, role, work_dir, self.startup_timeout).await?;
        Ok(Box::new(kernel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn python_available() -> bool {
        std::process::Command::new("python3")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    #[test]
    fn test_exec_output_ok_ignores_whitespace() {
        assert!(ExecOutput::ok("x").is_ok());
        assert!(ExecOutput::err("  \n").is_ok());
        assert!(!ExecOutput::err("NameError: x").is_ok());
    }

    #[test]
    fn test_request_wire_format() {
        let v = serde_json::to_value(KernelRequest::Exec { id: "1", code: "x=1" }).unwrap();
        assert_eq!(v["type"], "exec");
        assert_eq!(v["code"], "x=1");
        let r: KernelReply = serde_json::from_str(
            r#"{"type":"exec_result","id":"1","stdout":"a","stderr":""}"#,
        )
        .unwrap();
        assert!(matches!(r, KernelReply::ExecResult { .. }));
    }

    #[tokio::test]
    async fn test_spawn_failure_is_launch_error() {
        let dir = tempfile::tempdir().unwrap();
        let res = PythonKernel::start(
            "definitely-not-a-python-binary",
            KernelRole::Main,
            dir.path(),
            Duration::from_secs(2),
        )
        .await;
        assert!(matches!(res, Err(SandboxError::Launch(_))));
    }

    #[tokio::test]
    async fn test_state_persists_and_errors_reported() {
        if !python_available() {
            eprintln!("python3 not available, skipping");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let mut k = PythonKernel::start("python3", KernelRole::Main, dir.path(), Duration::from_secs(10))
            .await
            .unwrap();
        let t = Duration::from_secs(10);

        let out = k.execute("x = 21\nprint('hi')", t).await;
        assert!(out.is_ok(), "{:?}", out);
        assert_eq!(out.stdout.trim(), "hi");

        let out = k.execute("print(x * 2)", t).await;
        assert_eq!(out.stdout.trim(), "42");

        let out = k.execute("y = undefined_name", t).await;
        assert!(out.stderr.starts_with("NameError:"), "{:?}", out);

        let out = k.execute("def broken(:\n  pass", t).await;
        assert!(out.stderr.starts_with("SyntaxError:"), "{:?}", out);

        let out = k.execute("import os\nprint(os.getcwd())", t).await;
        let cwd = std::fs::canonicalize(dir.path()).unwrap();
        assert_eq!(
            std::fs::canonicalize(out.stdout.trim()).unwrap(),
            cwd
        );
        k.shutdown().await;
        k.shutdown().await;
    }

    #[tokio::test]
    async fn test_timeout_then_stale_result_discarded() {
        if !python_available() {
            eprintln!("python3 not available, skipping");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let mut k = PythonKernel::start("python3", KernelRole::Test, dir.path(), Duration::from_secs(10))
            .await
            .unwrap();
        let out = k
            .execute("import time\ntime.sleep(1.0)\nprint('late')", Duration::from_millis(100))
            .await;
        assert_eq!(out.stderr, TIMEOUT_MESSAGE);

        let out = k.execute("print('fresh')", Duration::from_secs(10)).await;
        assert_eq!(out.stdout.trim(), "fresh");
        k.shutdown().await;
    }

    #[tokio::test]
    async fn test_stdin_reads_do_not_consume_requests() {
        if !python_available() {
            eprintln!("python3 not available, skipping");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let mut k = PythonKernel::start("python3", KernelRole::Main, dir.path(), Duration::from_secs(10))
            .await
            .unwrap();
        let t = Duration::from_secs(10);

        let out = k.execute("x = input()", t).await;
        assert!(out.stderr.starts_with("EOFError"), "{:?}", out);

        let out = k.execute("import sys\ndata = sys.stdin.read()\ny = 1\nprint('hello')", t).await;
        assert!(out.is_ok(), "{:?}", out);
        assert_eq!(out.stdout.trim(), "hello");

        let out = k.execute("print(repr(data), y)", t).await;
        assert_eq!(out.stdout.trim(), "'' 1");
        k.shutdown().await;
    }

    #[tokio::test]
    async fn test_runaway_cell_interrupted_after_timeout() {
        if !python_available() {
            eprintln!("python3 not available, skipping");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let mut k = PythonKernel::start("python3", KernelRole::Main, dir.path(), Duration::from_secs(10))
            .await
            .unwrap();
        let t = Duration::from_secs(10);

        k.execute("kept = 7", t).await;
        let out = k.execute("while True:\n    pass", Duration::from_millis(200)).await;
        assert_eq!(out.stderr, TIMEOUT_MESSAGE);

        let out = k.execute("print(kept)", t).await;
        assert!(out.is_ok(), "{:?}", out);
        assert_eq!(out.stdout.trim(), "7");
        k.shutdown().await;
    }

    #[tokio::test]
    async fn test_unittest_output_lands_in_stderr() {
        if !python_available() {
            eprintln!("python3 not available, skipping");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let mut k = PythonKernel::start("python3", KernelRole::Test, dir.path(), Duration::from_secs(10))
            .await
            .unwrap();
        let code = "import unittest\nclass T(unittest.TestCase):\n    def test_a(self):\n        self.assertEqual(1 + 1, 2)\nunittest.main(argv=[''], exit=False)\n";
        let out = k.execute(code, Duration::from_secs(10)).await;
        assert!(out.stderr.contains("OK"), "{:?}", out);
        assert!(!out.stderr.contains("FAILED"));
        k.shutdown().await;
    }
}
