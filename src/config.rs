use crate::error::{AppResult, ConfigError};
use crate::workflow::ContextLimits;
use serde::Deserialize;
use std::path::Path;

/// 默认配置文件名
pub const DEFAULT_CONFIG_FILE: &str = "chapter_tutor.toml";

/// 程序配置文件
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    pub llm_temperature: f32,
    pub llm_max_tokens: u32,
    // --- 上下文配置 ---
    /// 问答时携带的最近历史条数
    pub qa_history_limit: usize,
    /// 生成章节时每个前序章节携带的字符数
    pub chapter_context_chars: usize,
    /// 问答时每个已生成章节携带的字符数
    pub answer_context_chars: usize,
    // --- 存储配置 ---
    /// 会话文件存放目录
    pub store_dir: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm_api_key: String::new(),
            llm_api_base_url: "https://api.openai.com/v1".to_string(),
            llm_model_name: "gpt-4o-mini".to_string(),
            llm_temperature: 0.7,
            llm_max_tokens: 8192,
            qa_history_limit: 5,
            chapter_context_chars: 1000,
            answer_context_chars: 500,
            store_dir: "conversations".to_string(),
            verbose_logging: false,
        }
    }
}

impl Config {
    /// 从 TOML 文件加载配置，缺失的字段使用默认值
    pub fn from_toml_file(path: &Path) -> AppResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
            path: path.display().to_string(),
            source,
        })?;
        let config = toml::from_str(&content).map_err(|source| ConfigError::TomlParseFailed {
            path: path.display().to_string(),
            source,
        })?;
        Ok(config)
    }

    /// 在默认配置之上应用环境变量
    pub fn from_env() -> AppResult<Self> {
        Self::default().with_env_overrides()
    }

    /// 加载完整配置
    ///
    /// 顺序：默认值 → `CHAPTER_TUTOR_CONFIG` 指定的文件（或当前目录下的
    /// `chapter_tutor.toml`）→ 环境变量
    pub fn load() -> AppResult<Self> {
        let base = match std::env::var("CHAPTER_TUTOR_CONFIG") {
            Ok(path) => Self::from_toml_file(Path::new(&path))?,
            Err(_) if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_toml_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            Err(_) => Self::default(),
        };
        base.with_env_overrides()
    }

    /// 用环境变量覆盖当前配置
    pub fn with_env_overrides(self) -> AppResult<Self> {
        Ok(Self {
            llm_api_key: std::env::var("LLM_API_KEY").unwrap_or(self.llm_api_key),
            llm_api_base_url: std::env::var("LLM_API_BASE_URL").unwrap_or(self.llm_api_base_url),
            llm_model_name: std::env::var("LLM_MODEL_NAME").unwrap_or(self.llm_model_name),
            llm_temperature: parse_env("LLM_TEMPERATURE", "f32")?.unwrap_or(self.llm_temperature),
            llm_max_tokens: parse_env("LLM_MAX_TOKENS", "u32")?.unwrap_or(self.llm_max_tokens),
            qa_history_limit: parse_env("QA_HISTORY_LIMIT", "usize")?
                .unwrap_or(self.qa_history_limit),
            chapter_context_chars: parse_env("CHAPTER_CONTEXT_CHARS", "usize")?
                .unwrap_or(self.chapter_context_chars),
            answer_context_chars: parse_env("ANSWER_CONTEXT_CHARS", "usize")?
                .unwrap_or(self.answer_context_chars),
            store_dir: std::env::var("STORE_DIR").unwrap_or(self.store_dir),
            verbose_logging: parse_env("VERBOSE_LOGGING", "bool")?.unwrap_or(self.verbose_logging),
        })
    }

    /// 状态机组装上下文时使用的限制
    pub fn context_limits(&self) -> ContextLimits {
        ContextLimits {
            qa_history_limit: self.qa_history_limit,
            chapter_context_chars: self.chapter_context_chars,
            answer_context_chars: self.answer_context_chars,
        }
    }
}

/// 读取并解析环境变量，不存在时返回 `None`
fn parse_env<T: std::str::FromStr>(var_name: &str, expected_type: &str) -> AppResult<Option<T>> {
    match std::env::var(var_name) {
        Ok(value) => value.trim().parse().map(Some).map_err(|_| {
            ConfigError::EnvVarParseFailed {
                var_name: var_name.to_string(),
                value,
                expected_type: expected_type.to_string(),
            }
            .into()
        }),
        Err(_) => Ok(None),
    }
}
