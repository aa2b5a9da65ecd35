//! SQLite 工具记忆：跨任务、跨进程持久化
//!
//! 表 `tools(id, name, docstring, code, embedding, created_at)`；embedding 为 JSON 数组或 NULL。
//! 配置了嵌入提供方时按余弦相似度排序，否则（或某行没有向量时）按关键词相似度。

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection};
use serde::Serialize;

use crate::core::error::MemoryError;
use crate::core::state::{Tool, ToolCandidate};
use crate::llm::{cosine_similarity, EmbeddingProvider};
use crate::memory::tokenizer::keyword_similarity;
use crate::memory::tool_memory::{rank, search_text, ToolMemory};

/// 列表展示用的一行
#[derive(Debug, Clone, Serialize)]
pub struct StoredTool {
    pub id: String,
    pub tool: Tool,
    pub created_at: String,
    pub has_embedding: bool,
}

pub struct SqliteToolMemory {
    path: PathBuf,
    conn: Arc<Mutex<Connection>>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
}

impl SqliteToolMemory {
    /// 打开（必要时创建）数据库文件与表
    pub fn open(
        path: &Path,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
    ) -> Result<Self, MemoryError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS tools (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                docstring TEXT NOT NULL,
                code TEXT NOT NULL,
                embedding TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_tools_created_at ON tools(created_at);
            ",
        )?;
        tracing::info!(path = %path.display(), embeddings = embedder.is_some(), "tool store opened");
        Ok(Self {
            path: path.to_path_buf(),
            conn: Arc::new(Mutex::new(conn)),
            embedder,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 全部工具，按写入时间排序
    pub fn list(&self) -> Result<Vec<StoredTool>, MemoryError> {
        let conn = self.conn.lock().map_err(|_| MemoryError::Poisoned)?;
        let mut stmt = conn.prepare(
            "SELECT id, name, docstring, code, embedding IS NOT NULL, created_at
             FROM tools ORDER BY created_at, rowid",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(StoredTool {
                id: row.get(0)?,
                tool: Tool {
                    name: row.get(1)?,
                    docstring: row.get(2)?,
                    code: row.get(3)?,
                },
                has_embedding: row.get(4)?,
                created_at: row.get(5)?,
            })
        })?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    fn load_rows(&self) -> Result<Vec<(Tool, Option<Vec<f32>>)>, MemoryError> {
        let conn = self.conn.lock().map_err(|_| MemoryError::Poisoned)?;
        let mut stmt = conn.prepare("SELECT name, docstring, code, embedding FROM tools")?;
        let rows = stmt.query_map([], |row| {
            let embedding: Option<String> = row.get(3)?;
            Ok((
                Tool {
                    name: row.get(0)?,
                    docstring: row.get(1)?,
                    code: row.get(2)?,
                },
                embedding.and_then(|s| serde_json::from_str::<Vec<f32>>(&s).ok()),
            ))
        })?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    async fn embed(&self, text: &str) -> Option<Vec<f32>> {
        let embedder = self.embedder.as_ref()?;
        match embedder.embed(text).await {
            Ok(v) if !v.is_empty() => Some(v),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(error = %e, "embedding failed, falling back to keyword similarity");
                None
            }
        }
    }
}

#[async_trait]
impl ToolMemory for SqliteToolMemory {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<ToolCandidate>, MemoryError> {
        let query_vec = self.embed(query).await;
        let rows = self.load_rows()?;
        // 余弦分数全部保留；关键词分数为 0 的不算候选
        let candidates = rows
            .into_iter()
            .filter_map(|(tool, emb)| match (&query_vec, &emb) {
                (Some(q), Some(e)) => Some(ToolCandidate {
                    score: cosine_similarity(q, e),
                    tool,
                }),
                _ => {
                    let score = keyword_similarity(query, &search_text(&tool));
                    (score > 0.0).then_some(ToolCandidate { tool, score })
                }
            })
            .collect();
        Ok(rank(candidates, k))
    }

    async fn add(&self, tool: &Tool) -> Result<(), MemoryError> {
        let embedding = self
            .embed(&tool.docstring)
            .await
            .and_then(|v| serde_json::to_string(&v).ok());
        let id = uuid::Uuid::new_v4().to_string();
        let created_at = chrono::Utc::now().to_rfc3339();
        let conn = self.conn.lock().map_err(|_| MemoryError::Poisoned)?;
        conn.execute(
            "INSERT INTO tools (id, name, docstring, code, embedding, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![id, tool.name, tool.docstring, tool.code, embedding, created_at],
        )?;
        tracing::info!(tool = %tool.name, id = %id, "tool persisted");
        Ok(())
    }

    async fn len(&self) -> Result<usize, MemoryError> {
        let conn = self.conn.lock().map_err(|_| MemoryError::Poisoned)?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM tools", [], |r| r.get(0))?;
        Ok(n.max(0) as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmError;

    fn tool(name: &str, doc: &str) -> Tool {
        Tool {
            name: name.into(),
            code: format!("def {}(x):\n    return x\n", name),
            docstring: doc.into(),
        }
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tool_db").join("tools.sqlite3");
        {
            let mem = SqliteToolMemory::open(&path, None).unwrap();
            mem.add(&tool("compute_mean", "Compute the arithmetic mean of numbers"))
                .await
                .unwrap();
            mem.add(&tool("load_csv", "Load a CSV file into a table"))
                .await
                .unwrap();
        }
        let mem = SqliteToolMemory::open(&path, None).unwrap();
        assert_eq!(mem.len().await.unwrap(), 2);
        let hits = mem.search("mean of numbers", 5).await.unwrap();
        assert_eq!(hits[0].tool.name, "compute_mean");
        let listed = mem.list().unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].tool.name, "compute_mean");
        assert!(!listed[0].has_embedding);
    }

    struct AxisEmbedder;

    #[async_trait]
    impl EmbeddingProvider for AxisEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
            let t = text.to_lowercase();
            Ok(vec![
                if t.contains("mean") { 1.0 } else { 0.0 },
                if t.contains("csv") { 1.0 } else { 0.0 },
                0.1,
            ])
        }
    }

    #[tokio::test]
    async fn test_embedding_search_uses_cosine() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tools.sqlite3");
        let mem = SqliteToolMemory::open(&path, Some(Arc::new(AxisEmbedder))).unwrap();
        mem.add(&tool("reader", "Read a CSV")).await.unwrap();
        mem.add(&tool("averager", "Average (mean) value")).await.unwrap();
        let hits = mem.search("what is the mean", 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].tool.name, "averager");
        assert!(mem.list().unwrap().iter().all(|t| t.has_embedding));
    }

    struct OpposedEmbedder;

    #[async_trait]
    impl EmbeddingProvider for OpposedEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
            if text.to_lowercase().contains("csv") {
                Ok(vec![-1.0, 0.2])
            } else {
                Ok(vec![1.0, 0.0])
            }
        }
    }

    #[tokio::test]
    async fn test_negative_cosine_still_returned() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tools.sqlite3");
        let mem = SqliteToolMemory::open(&path, Some(Arc::new(OpposedEmbedder))).unwrap();
        mem.add(&tool("reader", "Read a CSV")).await.unwrap();
        mem.add(&tool("averager", "Average value")).await.unwrap();
        let hits = mem.search("what is the mean", 5).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].tool.name, "averager");
        assert!(hits[1].score < 0.0);
    }
}
