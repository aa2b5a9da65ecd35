//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `TOOLSMITH__*` 覆盖（双下划线表示嵌套，如 `TOOLSMITH__LLM__PROVIDER=openai`）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub sandbox: SandboxSection,
    #[serde(default)]
    pub pipeline: PipelineSection,
    #[serde(default)]
    pub memory: MemorySection,
    #[serde(default)]
    pub batch: BatchSection,
}

/// [app] 段：应用名、数据目录（工具库、结果日志的默认根）
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    pub name: Option<String>,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

/// [llm] 段：后端选择、超时与重试
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：openrouter / openai / deepseek / mock
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    /// 读取 API Key 的环境变量名；未设置时按 provider 推断
    pub api_key_env: Option<String>,
    pub temperature: Option<f32>,
    #[serde(default)]
    pub timeouts: LlmTimeoutsSection,
    #[serde(default)]
    pub retry: LlmRetrySection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            api_key_env: None,
            temperature: None,
            timeouts: LlmTimeoutsSection::default(),
            retry: LlmRetrySection::default(),
        }
    }
}

fn default_provider() -> String {
    "openrouter".to_string()
}

fn default_model() -> String {
    "google/gemini-2.5-flash".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmTimeoutsSection {
    #[serde(default = "default_request_timeout")]
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: default_request_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    120
}

/// [llm.retry] 段：瞬时失败的固定次数重试
#[derive(Debug, Clone, Deserialize)]
pub struct LlmRetrySection {
    #[serde(default = "default_llm_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_llm_backoff_ms")]
    pub backoff_ms: u64,
}

impl Default for LlmRetrySection {
    fn default() -> Self {
        Self {
            max_retries: default_llm_max_retries(),
            backoff_ms: default_llm_backoff_ms(),
        }
    }
}

fn default_llm_max_retries() -> u32 {
    2
}

fn default_llm_backoff_ms() -> u64 {
    1000
}

/// [sandbox] 段：解释器命令、执行超时、内核启动重试
#[derive(Debug, Clone, Deserialize)]
pub struct SandboxSection {
    #[serde(default = "default_python_command")]
    pub python_command: String,
    /// 单次代码执行超时（秒），超时返回合成的 "Timeout" 错误
    #[serde(default = "default_exec_timeout_secs")]
    pub exec_timeout_secs: u64,
    /// 等待内核 ready 握手的超时（秒）
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,
    #[serde(default = "default_startup_attempts")]
    pub startup_attempts: u32,
    /// 首次重试前的等待（秒），之后每次翻倍
    #[serde(default = "default_startup_backoff_secs")]
    pub startup_backoff_secs: u64,
}

impl Default for SandboxSection {
    fn default() -> Self {
        Self {
            python_command: default_python_command(),
            exec_timeout_secs: default_exec_timeout_secs(),
            startup_timeout_secs: default_startup_timeout_secs(),
            startup_attempts: default_startup_attempts(),
            startup_backoff_secs: default_startup_backoff_secs(),
        }
    }
}

fn default_python_command() -> String {
    "python3".to_string()
}

fn default_exec_timeout_secs() -> u64 {
    30
}

fn default_startup_timeout_secs() -> u64 {
    10
}

fn default_startup_attempts() -> u32 {
    3
}

fn default_startup_backoff_secs() -> u64 {
    2
}

/// [pipeline] 段：步数预算与各阶段重试上限
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineSection {
    /// 状态机总转移次数上限（防止 Creator/Tester 无限往返）
    #[serde(default = "default_max_transitions")]
    pub max_transitions: usize,
    #[serde(default = "default_three")]
    pub planner_max_attempts: u32,
    #[serde(default = "default_three")]
    pub creator_max_attempts: u32,
    #[serde(default = "default_three")]
    pub solver_max_attempts: u32,
    #[serde(default = "default_feedback_capacity")]
    pub feedback_capacity: usize,
    #[serde(default = "default_memory_top_k")]
    pub memory_top_k: usize,
    /// 最终回答风格：analyst（简洁数据回答）/ math（逐步推理 + \boxed{}）
    #[serde(default = "default_answer_style")]
    pub answer_style: String,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            max_transitions: default_max_transitions(),
            planner_max_attempts: default_three(),
            creator_max_attempts: default_three(),
            solver_max_attempts: default_three(),
            feedback_capacity: default_feedback_capacity(),
            memory_top_k: default_memory_top_k(),
            answer_style: default_answer_style(),
        }
    }
}

fn default_max_transitions() -> usize {
    100
}

fn default_three() -> u32 {
    3
}

fn default_feedback_capacity() -> usize {
    3
}

fn default_memory_top_k() -> usize {
    5
}

fn default_answer_style() -> String {
    "analyst".to_string()
}

/// [memory] 段：工具记忆后端
#[derive(Debug, Clone, Deserialize)]
pub struct MemorySection {
    /// sqlite（持久化）/ memory（进程内）
    #[serde(default = "default_memory_backend")]
    pub backend: String,
    /// 未设置时为 <data_dir>/tool_db/tools.sqlite3
    pub db_path: Option<PathBuf>,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    /// 是否用嵌入向量检索；关闭或无 Key 时退回关键词检索
    #[serde(default = "default_embeddings")]
    pub embeddings: bool,
}

impl Default for MemorySection {
    fn default() -> Self {
        Self {
            backend: default_memory_backend(),
            db_path: None,
            embedding_model: default_embedding_model(),
            embeddings: default_embeddings(),
        }
    }
}

fn default_memory_backend() -> String {
    "sqlite".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_embeddings() -> bool {
    true
}

/// [batch] 段：任务文件与结果日志
#[derive(Debug, Clone, Deserialize, Default)]
pub struct BatchSection {
    pub tasks_file: Option<PathBuf>,
    /// 未设置时为 <data_dir>/result/result.json
    pub results_file: Option<PathBuf>,
}

impl AppConfig {
    pub fn tool_db_path(&self) -> PathBuf {
        self.memory
            .db_path
            .clone()
            .unwrap_or_else(|| self.app.data_dir.join("tool_db").join("tools.sqlite3"))
    }

    pub fn results_path(&self) -> PathBuf {
        self.batch
            .results_file
            .clone()
            .unwrap_or_else(|| self.app.data_dir.join("result").join("result.json"))
    }
}

impl SandboxSection {
    pub fn exec_timeout(&self) -> Duration {
        Duration::from_secs(self.exec_timeout_secs)
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    pub fn startup_backoff(&self) -> Duration {
        Duration::from_secs(self.startup_backoff_secs)
    }
}

/// 从 config 目录加载配置，环境变量 TOOLSMITH__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 TOOLSMITH__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("TOOLSMITH")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_pipeline_limits() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.pipeline.feedback_capacity, 3);
        assert_eq!(cfg.pipeline.memory_top_k, 5);
        assert_eq!(cfg.pipeline.solver_max_attempts, 3);
        assert_eq!(cfg.sandbox.startup_attempts, 3);
        assert_eq!(cfg.sandbox.exec_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_derived_paths_follow_data_dir() {
        let mut cfg = AppConfig::default();
        cfg.app.data_dir = PathBuf::from("/tmp/ts");
        assert_eq!(cfg.tool_db_path(), PathBuf::from("/tmp/ts/tool_db/tools.sqlite3"));
        assert_eq!(cfg.results_path(), PathBuf::from("/tmp/ts/result/result.json"));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let cfg: AppConfig = config::Config::builder()
            .add_source(config::File::from_str(
                "[pipeline]\nmax_transitions = 7\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(cfg.pipeline.max_transitions, 7);
        assert_eq!(cfg.pipeline.creator_max_attempts, 3);
        assert_eq!(cfg.sandbox.python_command, "python3");
    }
}
