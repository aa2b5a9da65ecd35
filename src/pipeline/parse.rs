//! LLM 结构化输出解析
//!
//! 每个解析函数返回 `Result<T, ParseFault>`，由调用方决定重试或降级。

use std::sync::OnceLock;

use regex::Regex;

use crate::core::error::ParseFault;
use crate::core::state::Subtask;

/// Creator 输出
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTool {
    pub analysis: Option<String>,
    pub name: String,
    pub description: String,
    pub code: String,
}

/// Tool Manager 的判定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Reuse(usize),
    Create,
    NoTool,
}

static ANALYSIS_RE: OnceLock<Regex> = OnceLock::new();
static MAIN_FUNC_RE: OnceLock<Regex> = OnceLock::new();
static DESCRIPTION_RE: OnceLock<Regex> = OnceLock::new();
static PYTHON_BLOCK_RE: OnceLock<Regex> = OnceLock::new();

/// Creator 输出中的 `<tag>...</tag>` 段
#[derive(Debug, Clone, Copy)]
enum Tag {
    Analysis,
    MainFunc,
    Description,
}

impl Tag {
    fn name(self) -> &'static str {
        match self {
            Tag::Analysis => "analysis",
            Tag::MainFunc => "main_func",
            Tag::Description => "description",
        }
    }

    fn regex(self) -> &'static Regex {
        let cell = match self {
            Tag::Analysis => &ANALYSIS_RE,
            Tag::MainFunc => &MAIN_FUNC_RE,
            Tag::Description => &DESCRIPTION_RE,
        };
        cell.get_or_init(|| {
            Regex::new(&format!(r"(?s)<{t}>(.*?)</{t}>", t = self.name()))
                .expect("static tag regex")
        })
    }

    fn extract(self, text: &str) -> Option<String> {
        self.regex()
            .captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
    }
}

fn python_block_regex() -> &'static Regex {
    PYTHON_BLOCK_RE
        .get_or_init(|| Regex::new(r"(?s)```python(.*?)```").expect("static code block regex"))
}

/// 提取代码：优先 ```python 块，其次任意 ``` 块，否则整段文本
pub fn extract_code_block(text: &str) -> String {
    if let Some(c) = python_block_regex().captures(text).and_then(|c| c.get(1)) {
        return c.as_str().trim().to_string();
    }
    if let Some(start) = text.find("```") {
        let rest = &text[start + 3..];
        let rest = match rest.find('\n') {
            Some(nl) if !rest[..nl].contains(' ') => &rest[nl + 1..],
            _ => rest,
        };
        let body = rest.find("```").map(|end| &rest[..end]).unwrap_or(rest);
        return body.trim().to_string();
    }
    text.trim().to_string()
}

/// 解析计划：```json 块或首个 `[`…最后一个 `]`，必须是非空的 Subtask 数组
pub fn parse_plan(text: &str) -> Result<Vec<Subtask>, ParseFault> {
    let trimmed = text.trim();
    let json_str = if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim())
    } else if let (Some(start), Some(end)) = (trimmed.find('['), trimmed.rfind(']')) {
        if start < end {
            &trimmed[start..=end]
        } else {
            trimmed
        }
    } else {
        trimmed
    };

    let plan: Vec<Subtask> = serde_json::from_str(json_str)
        .map_err(|e| ParseFault::new(format!("plan is not a subtask array: {}", e), text))?;
    if plan.is_empty() {
        return Err(ParseFault::new("plan has no subtasks", text));
    }
    if let Some(bad) = plan
        .iter()
        .position(|s| s.name.trim().is_empty() || s.description.trim().is_empty())
    {
        return Err(ParseFault::new(
            format!("subtask {} has an empty name or description", bad),
            text,
        ));
    }
    Ok(plan)
}

/// 解析 Creator 输出：必须有 main_func、description 与 ```python 块
pub fn parse_tool_block(text: &str) -> Result<ParsedTool, ParseFault> {
    let name = Tag::MainFunc.extract(text)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ParseFault::new("missing <main_func>", text))?;
    let description = Tag::Description.extract(text)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ParseFault::new("missing <description>", text))?;
    let code = python_block_regex()
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ParseFault::new("missing ```python block", text))?;
    Ok(ParsedTool {
        analysis: Tag::Analysis.extract(text),
        name,
        description,
        code,
    })
}

/// 解析 Manager 判定；索引越界视为解析失败
pub fn parse_verdict(text: &str, candidates: usize) -> Result<Verdict, ParseFault> {
    let cleaned = text
        .trim()
        .trim_matches(|c: char| c == '`' || c == '\'' || c == '"' || c == '.' || c == '*')
        .trim();
    let upper = cleaned.to_uppercase();
    if upper == "CREATE" {
        return Ok(Verdict::Create);
    }
    if upper == "NO TOOL" || upper == "NO_TOOL" {
        return Ok(Verdict::NoTool);
    }
    let idx: usize = cleaned
        .parse()
        .map_err(|_| ParseFault::new("verdict is not an index, CREATE or NO TOOL", text))?;
    if idx >= candidates {
        return Err(ParseFault::new(
            format!("index {} out of range ({} candidates)", idx, candidates),
            text,
        ));
    }
    Ok(Verdict::Reuse(idx))
}

/// unittest 输出判定：stderr 为空，或以 `OK` 结尾且没有 FAILED
pub fn unit_test_passed(stderr: &str) -> bool {
    if stderr.trim().is_empty() {
        return true;
    }
    if stderr.contains("FAILED") {
        return false;
    }
    stderr
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .map(|l| {
            let l = l.trim();
            l == "OK" || l.starts_with("OK (")
        })
        .unwrap_or(false)
}
