//! 沙箱层：执行内核（Python 进程 / 脚本化替身）与两上下文沙箱

pub mod context;
pub mod inspect;
pub mod kernel;
pub mod scripted;

pub use context::{ExecMode, Sandbox, SandboxSettings};
pub use inspect::{EvidenceItem, FinalContext};
pub use kernel::{ExecOutput, Kernel, KernelLauncher, PythonKernel, PythonLauncher, TIMEOUT_MESSAGE};
pub use scripted::ScriptedLauncher;
