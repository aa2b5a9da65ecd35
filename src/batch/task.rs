//! 任务输入：`[{id, problem, work_dir}]` JSON 数组或每行一个对象的 JSON-lines

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

/// 一个待解决的问题
#[derive(Debug, Clone, PartialEq)]
pub struct TaskSpec {
    pub id: String,
    pub problem: String,
    /// 两个执行上下文的工作目录（数据文件所在处）
    pub work_dir: PathBuf,
}

#[derive(Deserialize)]
struct RawTask {
    id: Option<serde_json::Value>,
    problem: String,
    #[serde(default)]
    work_dir: Option<PathBuf>,
}

impl RawTask {
    /// id 可为字符串或数字；缺省时用序号
    fn into_spec(self, index: usize, base: &Path) -> TaskSpec {
        let id = match self.id {
            Some(serde_json::Value::String(s)) => s,
            Some(v) if !v.is_null() => v.to_string(),
            _ => index.to_string(),
        };
        let work_dir = match self.work_dir {
            Some(p) if p.is_absolute() => p,
            Some(p) => base.join(p),
            None => base.to_path_buf(),
        };
        TaskSpec {
            id,
            problem: self.problem,
            work_dir,
        }
    }
}

/// 解析任务文本；相对 work_dir 以 base 为根
pub fn parse_tasks(text: &str, base: &Path) -> anyhow::Result<Vec<TaskSpec>> {
    let trimmed = text.trim_start();
    let raw: Vec<RawTask> = if trimmed.starts_with('[') {
        serde_json::from_str(trimmed).context("invalid task array")?
    } else {
        trimmed
            .lines()
            .enumerate()
            .filter(|(_, l)| !l.trim().is_empty())
            .map(|(n, l)| {
                serde_json::from_str(l).with_context(|| format!("invalid task on line {}", n + 1))
            })
            .collect::<anyhow::Result<_>>()?
    };
    Ok(raw
        .into_iter()
        .enumerate()
        .map(|(i, r)| r.into_spec(i, base))
        .collect())
}

/// 从文件加载任务，相对 work_dir 以任务文件所在目录为根
pub fn load_tasks(path: &Path) -> anyhow::Result<Vec<TaskSpec>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read tasks file {}", path.display()))?;
    let base = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    parse_tasks(&text, &base)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_array() {
        let text = r#"[
            {"id": "q1", "problem": "mean of x", "work_dir": "/data/a"},
            {"id": 7, "problem": "sum of y", "work_dir": "b"}
        ]"#;
        let tasks = parse_tasks(text, Path::new("/base")).unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].id, "q1");
        assert_eq!(tasks[0].work_dir, PathBuf::from("/data/a"));
        assert_eq!(tasks[1].id, "7");
        assert_eq!(tasks[1].work_dir, PathBuf::from("/base/b"));
    }

    #[test]
    fn test_parse_json_lines() {
        let text = "{\"problem\": \"a\"}\n\n{\"id\": \"x\", \"problem\": \"b\"}\n";
        let tasks = parse_tasks(text, Path::new("/w")).unwrap();
        assert_eq!(tasks[0].id, "0");
        assert_eq!(tasks[0].work_dir, PathBuf::from("/w"));
        assert_eq!(tasks[1].id, "x");
    }

    #[test]
    fn test_bad_line_reports_position() {
        let err = parse_tasks("{\"problem\": \"a\"}\nnot json\n", Path::new("/w")).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }
}
