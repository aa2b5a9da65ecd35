//! 结果日志：`{task_id -> final_answer}` 的 JSON 文件，每个任务后写盘以便续跑

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct ResultLog {
    path: PathBuf,
    answers: BTreeMap<String, String>,
}

impl ResultLog {
    /// 加载已有日志；文件不存在时为空
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let answers = if path.exists() {
            let data = std::fs::read_to_string(&path)?;
            if data.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&data)?
            }
        } else {
            BTreeMap::new()
        };
        Ok(Self { path, answers })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.answers.contains_key(task_id)
    }

    pub fn get(&self, task_id: &str) -> Option<&str> {
        self.answers.get(task_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.answers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }

    /// 记录答案并立即写盘
    pub fn record(&mut self, task_id: &str, answer: &str) -> anyhow::Result<()> {
        self.answers.insert(task_id.to_string(), answer.to_string());
        self.save()
    }

    /// 写入 JSON 文件；父目录不存在时自动创建
    pub fn save(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(&self.answers)?)?;
        Ok(())
    }
}
