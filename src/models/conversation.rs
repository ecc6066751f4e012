//! 会话持久化相关的数据结构
//!
//! 存储层返回的数据在这里统一成状态机可以直接使用的形式。

use crate::error::AppResult;
use crate::models::{ChapterCache, Document, OutlineEntry, OutlineStore, QaExchange, QaLog};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;
use tracing::warn;

/// 会话 ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub u64);

impl Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// 会话列表中的一项
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationSummary {
    pub id: ConversationId,
    pub created_at: DateTime<Utc>,
    /// 文档开头的单行预览
    pub preview: String,
}

/// 持久化的会话原始记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub id: ConversationId,
    pub created_at: DateTime<Utc>,
    pub document: Document,
    pub outline: Vec<OutlineEntry>,
    #[serde(default)]
    pub chapters: BTreeMap<u32, String>,
    #[serde(default)]
    pub qa_history: Vec<QaExchange>,
}

/// 加载会话后交给状态机的数据
///
/// 存储层通过 [`ConversationPayload::from_record`] 构建，保证目录有效、
/// 缓存中只有目录范围内的非空章节。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationPayload {
    pub id: ConversationId,
    pub document: Document,
    pub outline: OutlineStore,
    pub chapters: ChapterCache,
    pub qa_history: QaLog,
}

impl ConversationPayload {
    /// 校验持久化记录
    pub fn from_record(record: ConversationRecord) -> AppResult<Self> {
        let id = record.id;
        let outline = OutlineStore::from_entries(record.outline).map_err(|e| {
            crate::error::AppError::invalid_conversation(id.0, e.to_string())
        })?;

        let chapters = record
            .chapters
            .into_iter()
            .filter(|(chapter, text)| {
                let keep = outline.contains(*chapter) && !text.trim().is_empty();
                if !keep {
                    warn!("⚠️ 会话 {} 丢弃无效的已存章节: 第 {} 章", id, chapter);
                }
                keep
            })
            .collect();

        Ok(Self {
            id,
            document: record.document,
            outline,
            chapters,
            qa_history: QaLog::from(record.qa_history),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(outline: Vec<OutlineEntry>, chapters: &[(u32, &str)]) -> ConversationRecord {
        ConversationRecord {
            id: ConversationId(7),
            created_at: Utc::now(),
            document: Document::new("正文", "本科生"),
            outline,
            chapters: chapters
                .iter()
                .map(|(n, t)| (*n, t.to_string()))
                .collect(),
            qa_history: vec![QaExchange::new("q", "a"), QaExchange::new("dangling", "")],
        }
    }

    #[test]
    fn test_from_record_drops_out_of_range_chapters() {
        let payload = ConversationPayload::from_record(record(
            vec![OutlineEntry::new(1, "一"), OutlineEntry::new(2, "二")],
            &[(1, "内容"), (2, " "), (9, "越界")],
        ))
        .unwrap();

        assert_eq!(payload.chapters.len(), 1);
        assert!(payload.chapters.contains(1));
        assert_eq!(payload.qa_history.len(), 1);
    }

    #[test]
    fn test_from_record_rejects_empty_outline() {
        assert!(ConversationPayload::from_record(record(Vec::new(), &[])).is_err());
    }
}
