//! 集成测试共用的替身：脚本化 LLM 回复与一个极简的「解释器」

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use toolsmith::core::KernelRole;
use toolsmith::sandbox::inspect::{FINAL_CONTEXT_PROBE, INVENTORY_PROBE};
use toolsmith::sandbox::{ExecOutput, SandboxSettings, ScriptedLauncher};

pub const GOOD_TOOL: &str = r#"<analysis>mean is the sum divided by the count</analysis>
<main_func>mean</main_func>
<description>Compute the arithmetic mean of a list of numbers.</description>
```python
def mean(numbers):
    """Return the arithmetic mean of numbers."""
    return sum(numbers) / len(numbers)
```"#;

pub const WRONG_TOOL: &str = r#"<analysis>count the numbers</analysis>
<main_func>mean</main_func>
<description>Compute the arithmetic mean of a list of numbers.</description>
```python
def mean(numbers):
    return len(numbers)
```"#;

pub const SYNTAX_ERROR_TOOL: &str = r#"<analysis>typo</analysis>
<main_func>mean</main_func>
<description>Compute the arithmetic mean of a list of numbers.</description>
```python
def mean(numbers)
    return sum(numbers) / len(numbers)
```"#;

pub const UNIT_TEST: &str = "```python\nimport unittest\n\nclass TestMean(unittest.TestCase):\n    def test_mean(self):\n        self.assertEqual(mean([2, 4, 6, 8]), 5)\n\nunittest.main(argv=[''], exit=False)\n```";

pub const UNITTEST_OK: &str =
    ".\n----------------------------------------------------------------------\nRan 1 test in 0.000s\n\nOK";

pub const UNITTEST_FAILED: &str = "F\n======================================================================\nFAIL: test_mean (__main__.TestMean)\nAssertionError: 4 != 5\n----------------------------------------------------------------------\nRan 1 test in 0.001s\n\nFAILED (failures=1)";

pub fn plan_json(subtasks: &[(&str, &str)]) -> String {
    let items: Vec<String> = subtasks
        .iter()
        .map(|(n, d)| format!("{{\"name\": \"{}\", \"description\": \"{}\"}}", n, d))
        .collect();
    format!("```json\n[{}]\n```", items.join(", "))
}

/// 按提示词开头识别阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    Planner,
    Manager,
    Creator,
    Repair,
    Tester,
    Solver,
    Answer,
    Unknown,
}

pub fn prompt_kind(prompt: &str) -> PromptKind {
    if prompt.starts_with("Analyze the User Request") {
        PromptKind::Planner
    } else if prompt.starts_with("You are a Tool Manager") {
        PromptKind::Manager
    } else if prompt.starts_with("You are a generic Python function generator") {
        PromptKind::Creator
    } else if prompt.starts_with("You are a Senior Python") {
        PromptKind::Repair
    } else if prompt.starts_with("Write a Python Unit Test") {
        PromptKind::Tester
    } else if prompt.starts_with("Task:") {
        PromptKind::Solver
    } else if prompt.starts_with("You are a helpful Data Analyst") || prompt.starts_with("You are a math expert") {
        PromptKind::Answer
    } else {
        PromptKind::Unknown
    }
}

/// main 上下文的全局变量（名 -> 值的文本）
#[derive(Clone, Default)]
pub struct FakeGlobals(Arc<Mutex<BTreeMap<String, String>>>);

impl FakeGlobals {
    pub fn names(&self) -> Vec<String> {
        self.0.lock().unwrap().keys().cloned().collect()
    }
}

/// 顶层 `name = expr` 视为赋值；其余代码只按标记决定成败
fn assigned_names(code: &str) -> Vec<String> {
    code.lines()
        .filter(|l| !l.starts_with(' ') && !l.starts_with('\t'))
        .filter_map(|l| l.split_once(" = "))
        .map(|(lhs, _)| lhs.trim().to_string())
        .filter(|n| !n.is_empty() && n.chars().all(|c| c.is_alphanumeric() || c == '_'))
        .collect()
}

/// 极简解释器：main 记住赋值，test 按代码内容给出语法错误、单测失败或通过
pub fn fake_interpreter(globals: FakeGlobals) -> impl Fn(KernelRole, &str) -> ExecOutput + Send + Sync {
    move |role, code| {
        if code.contains("def mean(numbers)\n") {
            return ExecOutput::err(
                "  File \"<string>\", line 1\n    def mean(numbers)\n                     ^\nSyntaxError: expected ':'",
            );
        }
        match role {
            KernelRole::Main => {
                let mut g = globals.0.lock().unwrap();
                if code == INVENTORY_PROBE {
                    let inv: BTreeMap<&String, &str> = g.keys().map(|k| (k, "float")).collect();
                    return ExecOutput::ok(serde_json::to_string(&inv).unwrap());
                }
                if code == FINAL_CONTEXT_PROBE {
                    let ctx = serde_json::json!({ "answers": &*g, "evidence": {} });
                    return ExecOutput::ok(ctx.to_string());
                }
                if code.contains("undefined_var") {
                    return ExecOutput::err("NameError: name 'undefined_var' is not defined");
                }
                for name in assigned_names(code) {
                    g.insert(name, "4.0".to_string());
                }
                ExecOutput::ok("4.0\n")
            }
            KernelRole::Test => {
                if code.contains("    return len(numbers)") && code.contains("assert") {
                    ExecOutput::err(UNITTEST_FAILED)
                } else if code.contains("unittest") {
                    ExecOutput::err(UNITTEST_OK)
                } else {
                    ExecOutput::ok("")
                }
            }
        }
    }
}

pub fn scripted_launcher() -> (Arc<ScriptedLauncher>, FakeGlobals) {
    let globals = FakeGlobals::default();
    let launcher = Arc::new(ScriptedLauncher::new(fake_interpreter(globals.clone())));
    (launcher, globals)
}

pub fn fast_sandbox_settings() -> SandboxSettings {
    SandboxSettings {
        exec_timeout: Duration::from_secs(5),
        startup_attempts: 3,
        startup_backoff: Duration::from_millis(1),
    }
}
