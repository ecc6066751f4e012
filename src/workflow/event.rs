//! 状态机的输入（事件）和输出（副作用）
//!
//! 用户操作和异步请求的结果都是事件，进入同一个串行队列。
//! 状态机不直接发请求，只返回副作用列表，由编排层执行。

use crate::models::{ConversationId, ConversationPayload, Document, OutlineStore, QaExchange};
use crate::services::{AnswerJob, ChapterJob};
use crate::workflow::SessionStatus;
use std::fmt::Display;
use std::sync::Arc;
use thiserror::Error;

/// 状态机事件
///
/// 带 `epoch` 的事件都来自异步请求，`epoch` 是发出请求时的会话代数。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    SubmitDocument(Document),
    OutlineReady {
        epoch: u64,
        conversation_id: ConversationId,
        outline: OutlineStore,
    },
    OutlineFailed {
        epoch: u64,
        error: String,
    },
    RequestChapter(u32),
    NextChapter,
    PreviousChapter,
    ChapterReady {
        epoch: u64,
        chapter: u32,
        text: String,
    },
    ChapterFailed {
        epoch: u64,
        chapter: u32,
        error: String,
    },
    SetDisplayed(u32),
    AskQuestion(String),
    AnswerReady {
        epoch: u64,
        answer: String,
    },
    AnswerFailed {
        epoch: u64,
        error: String,
    },
    LoadConversation(ConversationId),
    ConversationLoaded {
        epoch: u64,
        payload: ConversationPayload,
    },
    ConversationLoadFailed {
        epoch: u64,
        error: String,
    },
    /// 会话已从存储中删除
    ConversationDeleted(ConversationId),
    Reset,
}

/// 章节请求的角色
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestRole {
    /// 用户正在等待的请求
    Foreground,
    /// 后台预取
    Speculative,
}

/// 状态机产生的副作用
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    GenerateOutline {
        epoch: u64,
        document: Arc<Document>,
    },
    GenerateChapter {
        epoch: u64,
        role: RequestRole,
        job: ChapterJob,
    },
    AnswerQuestion {
        epoch: u64,
        job: AnswerJob,
    },
    LoadConversation {
        epoch: u64,
        id: ConversationId,
    },
    PersistChapter {
        conversation_id: ConversationId,
        chapter: u32,
        text: String,
    },
    PersistExchange {
        conversation_id: ConversationId,
        exchange: QaExchange,
    },
    Notify(Notice),
}

/// 给用户的提示
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// 当前状态不允许该操作，状态未改变
    Rejected(Rejection),
    /// 前台请求失败
    Failed { kind: FailureKind, message: String },
}

impl Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Notice::Rejected(rejection) => write!(f, "⏳ {}", rejection),
            Notice::Failed { kind, message } => write!(f, "❌ {}: {}", kind, message),
        }
    }
}

/// 操作被拒绝的原因
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("请等待当前操作完成 ({status})")]
    Busy { status: SessionStatus },
    #[error("当前没有打开的文档")]
    NoActiveDocument,
    #[error("第 {chapter} 章不存在 (共 {total} 章)")]
    ChapterOutOfRange { chapter: u32, total: usize },
    #[error("第 {chapter} 章尚未生成")]
    ChapterNotCached { chapter: u32 },
    #[error("文档内容和学习背景都不能为空")]
    InvalidSubmission,
    #[error("问题不能为空")]
    EmptyQuestion,
}

/// 失败分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    OutlineGeneration,
    ChapterGeneration,
    AnswerGeneration,
    ConversationLoad,
}

impl Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::OutlineGeneration => write!(f, "目录生成失败"),
            FailureKind::ChapterGeneration => write!(f, "章节生成失败"),
            FailureKind::AnswerGeneration => write!(f, "回答生成失败"),
            FailureKind::ConversationLoad => write!(f, "会话加载失败"),
        }
    }
}

impl Effect {
    /// 是否为拒绝提示
    pub fn is_rejection(&self) -> bool {
        matches!(self, Effect::Notify(Notice::Rejected(_)))
    }
}
