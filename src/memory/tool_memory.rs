//! 工具记忆 trait
//!
//! 按描述语义相似度存取已验证的工具。不做去重：相同或相近的工具可以重复写入。

use async_trait::async_trait;

use crate::core::error::MemoryError;
use crate::core::state::{Tool, ToolCandidate};

#[async_trait]
pub trait ToolMemory: Send + Sync {
    /// 按与 query 的相似度返回最多 k 个工具，最相似的在前
    async fn search(&self, query: &str, k: usize) -> Result<Vec<ToolCandidate>, MemoryError>;

    /// 写入一个工具
    async fn add(&self, tool: &Tool) -> Result<(), MemoryError>;

    /// 已存工具数
    async fn len(&self) -> Result<usize, MemoryError>;
}

/// 按分数降序排序并截断到 k；不按分数过滤，余弦相似度可以为负
pub(crate) fn rank(mut candidates: Vec<ToolCandidate>, k: usize) -> Vec<ToolCandidate> {
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    candidates.truncate(k);
    candidates
}

/// 用于检索的文本：名称 + 描述
pub(crate) fn search_text(tool: &Tool) -> String {
    format!("{} {}", tool.name, tool.docstring)
}
