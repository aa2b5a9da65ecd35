//! 进程内工具记忆：关键词（Jaccard）相似度，进程退出即丢失

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::core::error::MemoryError;
use crate::core::state::{Tool, ToolCandidate};
use crate::memory::tokenizer::{jaccard_similarity, tokenize_to_set};
use crate::memory::tool_memory::{rank, search_text, ToolMemory};

#[derive(Clone, Default)]
pub struct InMemoryToolMemory {
    store: Arc<RwLock<Vec<(Tool, HashSet<String>)>>>,
}

impl InMemoryToolMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tools(tools: impl IntoIterator<Item = Tool>) -> Self {
        let store = tools
            .into_iter()
            .map(|t| {
                let tokens = tokenize_to_set(&search_text(&t));
                (t, tokens)
            })
            .collect();
        Self {
            store: Arc::new(RwLock::new(store)),
        }
    }

    /// 全部工具（写入顺序）
    pub fn tools(&self) -> Vec<Tool> {
        self.store
            .read()
            .map(|s| s.iter().map(|(t, _)| t.clone()).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ToolMemory for InMemoryToolMemory {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<ToolCandidate>, MemoryError> {
        let q = tokenize_to_set(query);
        let store = self.store.read().map_err(|_| MemoryError::Poisoned)?;
        // 关键词无交集的工具不算候选
        let candidates = store
            .iter()
            .map(|(tool, tokens)| ToolCandidate {
                tool: tool.clone(),
                score: jaccard_similarity(&q, tokens),
            })
            .filter(|c| c.score > 0.0)
            .collect();
        Ok(rank(candidates, k))
    }

    async fn add(&self, tool: &Tool) -> Result<(), MemoryError> {
        let tokens = tokenize_to_set(&search_text(tool));
        self.store
            .write()
            .map_err(|_| MemoryError::Poisoned)?
            .push((tool.clone(), tokens));
        tracing::debug!(tool = %tool.name, "tool stored in memory");
        Ok(())
    }

    async fn len(&self) -> Result<usize, MemoryError> {
        self.store
            .read()
            .map(|s| s.len())
            .map_err(|_| MemoryError::Poisoned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool(name: &str, doc: &str) -> Tool {
        Tool {
            name: name.into(),
            code: format!("def {}():\n    pass\n", name),
            docstring: doc.into(),
        }
    }

    #[tokio::test]
    async fn test_search_best_first_and_limited() {
        let mem = InMemoryToolMemory::with_tools(vec![
            tool("load_csv", "Load a CSV file into a DataFrame"),
            tool("compute_mean", "Compute the arithmetic mean of a list of numbers"),
            tool("compute_median", "Compute the median of a list of numbers"),
        ]);
        let hits = mem.search("compute arithmetic mean of numbers", 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].tool.name, "compute_mean");
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn test_duplicates_are_kept() {
        let mem = InMemoryToolMemory::new();
        let t = tool("f", "does a thing");
        mem.add(&t).await.unwrap();
        mem.add(&t).await.unwrap();
        assert_eq!(mem.len().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_poisoned_store_is_an_error() {
        let mem = InMemoryToolMemory::new();
        let store = Arc::clone(&mem.store);
        let _ = std::thread::spawn(move || {
            let _guard = store.write().unwrap();
            panic!("poison the lock");
        })
        .join();

        let t = tool("f", "does a thing");
        assert!(matches!(mem.add(&t).await, Err(MemoryError::Poisoned)));
        assert!(matches!(mem.search("thing", 1).await, Err(MemoryError::Poisoned)));
        assert!(matches!(mem.len().await, Err(MemoryError::Poisoned)));
    }

    #[tokio::test]
    async fn test_unrelated_query_returns_nothing() {
        let mem = InMemoryToolMemory::with_tools(vec![tool("load_csv", "Load a CSV file")]);
        assert!(mem.search("integrate differential equation", 5).await.unwrap().is_empty());
    }
}
