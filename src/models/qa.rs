//! 问答记录
//!
//! 提问时先追加一条空回答（乐观追加），成功后补全回答，失败则移除（回滚）。

use serde::{Deserialize, Serialize};

/// 一次问答
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaExchange {
    pub question: String,
    pub answer: String,
}

impl QaExchange {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
        }
    }

    /// 回答为空表示仍在等待
    pub fn is_pending(&self) -> bool {
        self.answer.is_empty()
    }
}

/// 问答日志
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QaLog {
    exchanges: Vec<QaExchange>,
}

impl QaLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一条等待回答的问题
    pub fn push_pending(&mut self, question: String) {
        self.exchanges.push(QaExchange {
            question,
            answer: String::new(),
        });
    }

    /// 补全最后一条问题的回答，返回补全后的问答
    pub fn complete_last(&mut self, answer: String) -> Option<&QaExchange> {
        let last = self.exchanges.last_mut().filter(|e| e.is_pending())?;
        last.answer = answer;
        Some(last)
    }

    /// 移除最后一条等待中的问题
    pub fn rollback_last(&mut self) -> Option<QaExchange> {
        if self.exchanges.last().is_some_and(QaExchange::is_pending) {
            return self.exchanges.pop();
        }
        None
    }

    pub fn has_pending(&self) -> bool {
        self.exchanges.iter().any(QaExchange::is_pending)
    }

    /// 最近 `limit` 条已完成的问答
    pub fn recent_completed(&self, limit: usize) -> Vec<QaExchange> {
        let completed: Vec<&QaExchange> =
            self.exchanges.iter().filter(|e| !e.is_pending()).collect();
        let start = completed.len().saturating_sub(limit);
        completed[start..].iter().map(|e| (*e).clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.exchanges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }

    pub fn exchanges(&self) -> &[QaExchange] {
        &self.exchanges
    }
}

impl From<Vec<QaExchange>> for QaLog {
    /// 从持久化记录恢复，丢弃没有回答的残留问题
    fn from(exchanges: Vec<QaExchange>) -> Self {
        Self {
            exchanges: exchanges.into_iter().filter(|e| !e.is_pending()).collect(),
        }
    }
}
