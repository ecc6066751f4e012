//! 文档目录
//!
//! 目录在建立成功时一次性创建，之后不再修改。
//! 章节编号唯一，且从 1 开始连续编号。

use crate::error::{AppResult, GenerationError};
use serde::{Deserialize, Serialize};

/// 目录条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineEntry {
    /// 章节编号（从 1 开始）
    pub chapter: u32,
    /// 章节标题
    pub title: String,
}

impl OutlineEntry {
    pub fn new(chapter: u32, title: impl Into<String>) -> Self {
        Self {
            chapter,
            title: title.into(),
        }
    }
}

/// 目录
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineStore {
    entries: Vec<OutlineEntry>,
}

impl OutlineStore {
    /// 校验并构建目录
    ///
    /// 条目会先按编号排序，再检查非空、编号连续、标题非空。
    pub fn from_entries(mut entries: Vec<OutlineEntry>) -> AppResult<Self> {
        if entries.is_empty() {
            return Err(GenerationError::EmptyOutline.into());
        }

        entries.sort_by_key(|entry| entry.chapter);

        for (expected, entry) in (1u32..).zip(entries.iter_mut()) {
            if entry.chapter != expected {
                return Err(GenerationError::NonContiguousOutline {
                    expected,
                    found: entry.chapter,
                }
                .into());
            }
            let title = entry.title.trim();
            if title.is_empty() {
                return Err(GenerationError::EmptyTitle {
                    chapter: entry.chapter,
                }
                .into());
            }
            entry.title = title.to_string();
        }

        Ok(Self { entries })
    }

    /// 章节总数 N
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 章节编号是否在 [1, N] 范围内
    pub fn contains(&self, chapter: u32) -> bool {
        chapter >= 1 && (chapter as usize) <= self.entries.len()
    }

    /// 查询章节标题
    pub fn title(&self, chapter: u32) -> Option<&str> {
        if !self.contains(chapter) {
            return None;
        }
        self.entries
            .get(chapter as usize - 1)
            .map(|entry| entry.title.as_str())
    }

    pub fn entries(&self) -> &[OutlineEntry] {
        &self.entries
    }

    /// 最后一章的编号（目录为空时为 0）
    pub fn last_chapter(&self) -> u32 {
        self.entries.len() as u32
    }
}
