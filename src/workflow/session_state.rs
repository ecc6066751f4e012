//! 会话状态
//!
//! 整个系统唯一的可变共享资源，只由状态机修改，调度器只读。

use crate::models::{ChapterCache, ConversationId, Document, OutlineStore, QaLog};
use crate::services::{AnswerJob, ChapterJob};
use crate::utils::truncate_text;
use std::fmt::Display;
use std::sync::Arc;

/// 会话状态机的状态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionStatus {
    #[default]
    Idle,
    /// 正在生成目录
    Indexing,
    /// 正在前台生成某一章
    GeneratingChapter(u32),
    /// 正在回答问题
    Answering,
    LoadingConversation,
    Error,
}

impl SessionStatus {
    pub fn is_idle(self) -> bool {
        self == SessionStatus::Idle
    }
}

impl Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Idle => write!(f, "空闲"),
            SessionStatus::Indexing => write!(f, "生成目录中"),
            SessionStatus::GeneratingChapter(n) => write!(f, "生成第 {} 章中", n),
            SessionStatus::Answering => write!(f, "回答问题中"),
            SessionStatus::LoadingConversation => write!(f, "加载会话中"),
            SessionStatus::Error => write!(f, "出错"),
        }
    }
}

/// 组装上下文时的限制
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextLimits {
    pub qa_history_limit: usize,
    pub chapter_context_chars: usize,
    pub answer_context_chars: usize,
}

impl Default for ContextLimits {
    fn default() -> Self {
        Self {
            qa_history_limit: 5,
            chapter_context_chars: 1000,
            answer_context_chars: 500,
        }
    }
}

/// 会话状态
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub status: SessionStatus,
    /// 会话代数，每次重置会话时递增
    pub epoch: u64,
    pub conversation_id: Option<ConversationId>,
    pub document: Option<Arc<Document>>,
    pub outline: OutlineStore,
    /// 当前显示的章节（0 表示没有）
    pub current_chapter: u32,
    pub cache: ChapterCache,
    pub qa_log: QaLog,
    pub last_error: Option<String>,
    pub limits: ContextLimits,
}

impl SessionState {
    pub fn new(limits: ContextLimits) -> Self {
        Self {
            limits,
            ..Default::default()
        }
    }

    /// 正在前台生成的章节
    pub fn target_chapter(&self) -> Option<u32> {
        match self.status {
            SessionStatus::GeneratingChapter(n) => Some(n),
            _ => None,
        }
    }

    /// 当前显示章节的内容
    pub fn current_text(&self) -> Option<&str> {
        self.cache.get(self.current_chapter)
    }

    /// 是否有可以操作的文档和目录
    pub fn has_active_document(&self) -> bool {
        self.document.is_some() && !self.outline.is_empty()
    }

    /// 清空会话并进入新的一代，只保留上下文限制
    pub(crate) fn begin_new_epoch(&mut self) {
        *self = Self {
            epoch: self.epoch + 1,
            limits: self.limits,
            ..Default::default()
        };
    }

    /// 构建章节生成请求
    ///
    /// 只携带编号小于目标的已缓存章节。
    pub fn chapter_job(&self, chapter: u32) -> Option<ChapterJob> {
        let document = self.document.clone()?;
        let title = self.outline.title(chapter)?.to_string();
        let limit = self.limits.chapter_context_chars;

        Some(ChapterJob {
            conversation_id: self.conversation_id,
            chapter,
            title,
            document,
            outline: self.outline.entries().to_vec(),
            prior_chapters: self
                .cache
                .before(chapter)
                .map(|(n, text)| (n, truncate_text(text, limit)))
                .collect(),
        })
    }

    /// 构建问答请求（历史中不含正在等待的问题）
    pub fn answer_job(&self, question: &str) -> Option<AnswerJob> {
        let document = self.document.clone()?;
        let limit = self.limits.answer_context_chars;

        Some(AnswerJob {
            conversation_id: self.conversation_id,
            document,
            outline: self.outline.entries().to_vec(),
            chapters: self
                .cache
                .iter()
                .map(|(n, text)| (n, truncate_text(text, limit)))
                .collect(),
            history: self.qa_log.recent_completed(self.limits.qa_history_limit),
            question: question.to_string(),
        })
    }

    /// 检查状态不变量，返回第一条被违反的描述
    pub fn check_invariants(&self) -> Result<(), String> {
        if let Some(target) = self.target_chapter() {
            if self.cache.contains(target) {
                return Err(format!("第 {} 章已缓存却仍在前台生成", target));
            }
        }
        if self.current_chapter != 0 && !self.outline.contains(self.current_chapter) {
            return Err(format!("当前章节 {} 超出目录范围", self.current_chapter));
        }
        if self.status.is_idle()
            && self.current_chapter != 0
            && !self.cache.contains(self.current_chapter)
        {
            return Err(format!("空闲时当前章节 {} 未缓存", self.current_chapter));
        }
        if self.status != SessionStatus::Answering && self.qa_log.has_pending() {
            return Err("离开回答状态后仍有未完成的问题".to_string());
        }
        Ok(())
    }
}
