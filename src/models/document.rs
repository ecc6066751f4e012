//! 源文档
//!
//! 一个会话只对应一份文档：全文 + 学习者背景，提交后不再修改。

use serde::{Deserialize, Serialize};

/// 源文档
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// 文档全文
    pub text: String,
    /// 学习者背景描述
    pub background: String,
}

impl Document {
    /// 创建新的文档
    pub fn new(text: impl Into<String>, background: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            background: background.into(),
        }
    }

    /// 全文和背景都非空时才能开始建立目录
    pub fn is_submittable(&self) -> bool {
        !self.text.trim().is_empty() && !self.background.trim().is_empty()
    }
}
