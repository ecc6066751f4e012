use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 内容生成服务错误
    #[error("生成错误: {0}")]
    Generation(#[from] GenerationError),
    /// LLM 调用错误
    #[error("LLM错误: {0}")]
    Llm(#[from] LlmError),
    /// 会话存储错误
    #[error("存储错误: {0}")]
    Store(#[from] StoreError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 其他错误（用于包装第三方库错误）
    #[error("错误: {0}")]
    Other(String),
}

/// 生成结果校验错误
///
/// 外部服务返回的内容在进入状态机之前必须通过校验，
/// 这里列出所有校验失败的情况。
#[derive(Debug, Error)]
pub enum GenerationError {
    /// 目录为空
    #[error("目录为空")]
    EmptyOutline,
    /// 目录章节编号不连续
    #[error("目录章节编号不连续: 期望 {expected}, 实际 {found}")]
    NonContiguousOutline { expected: u32, found: u32 },
    /// 目录章节标题为空
    #[error("第 {chapter} 章标题为空")]
    EmptyTitle { chapter: u32 },
    /// 目录 JSON 解析失败
    #[error("目录解析失败 (响应: {response}): {source}")]
    OutlineParseFailed {
        response: String,
        #[source]
        source: serde_json::Error,
    },
    /// 章节内容为空
    #[error("第 {chapter} 章生成内容为空")]
    EmptyChapter { chapter: u32 },
    /// 回答为空
    #[error("回答内容为空")]
    EmptyAnswer,
}

/// LLM 服务错误
#[derive(Debug, Error)]
pub enum LlmError {
    /// 请求构建失败
    #[error("LLM 请求构建失败 (模型: {model}): {source}")]
    RequestBuildFailed {
        model: String,
        #[source]
        source: async_openai::error::OpenAIError,
    },
    /// API 调用失败
    #[error("LLM API调用失败 (模型: {model}): {source}")]
    ApiCallFailed {
        model: String,
        #[source]
        source: async_openai::error::OpenAIError,
    },
    /// 返回内容为空
    #[error("LLM返回内容为空 (模型: {model})")]
    EmptyContent { model: String },
}

/// 会话存储错误
#[derive(Debug, Error)]
pub enum StoreError {
    /// 会话不存在
    #[error("会话不存在: {id}")]
    NotFound { id: u64 },
    /// 读取失败
    #[error("读取会话文件失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// 写入失败
    #[error("写入会话文件失败 ({path}): {source}")]
    WriteFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// 删除失败
    #[error("删除会话文件失败 ({path}): {source}")]
    DeleteFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// 会话数据损坏
    #[error("会话数据解析失败 ({path}): {source}")]
    Corrupted {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    /// 会话数据不满足约束
    #[error("会话 {id} 数据无效: {reason}")]
    Invalid { id: u64, reason: String },
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 配置文件读取失败
    #[error("读取配置文件失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// TOML 解析失败
    #[error("TOML解析失败 ({path}): {source}")]
    TomlParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建LLM API调用错误
    pub fn llm_api_failed(
        model: impl Into<String>,
        source: async_openai::error::OpenAIError,
    ) -> Self {
        AppError::Llm(LlmError::ApiCallFailed {
            model: model.into(),
            source,
        })
    }

    /// 创建会话数据无效错误
    pub fn invalid_conversation(id: u64, reason: impl Into<String>) -> Self {
        AppError::Store(StoreError::Invalid {
            id,
            reason: reason.into(),
        })
    }

    /// 创建文件读取错误
    pub fn store_read_failed(path: impl Into<String>, source: std::io::Error) -> Self {
        AppError::Store(StoreError::ReadFailed {
            path: path.into(),
            source,
        })
    }

    /// 创建文件写入错误
    pub fn store_write_failed(path: impl Into<String>, source: std::io::Error) -> Self {
        AppError::Store(StoreError::WriteFailed {
            path: path.into(),
            source,
        })
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
