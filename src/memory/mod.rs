//! 工具记忆：按描述相似度存取已验证的工具（进程内 / SQLite）

pub mod in_memory;
pub mod sqlite_store;
pub mod tokenizer;
pub mod tool_memory;

pub use in_memory::InMemoryToolMemory;
pub use sqlite_store::{SqliteToolMemory, StoredTool};
pub use tool_memory::ToolMemory;
