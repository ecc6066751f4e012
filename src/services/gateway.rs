//! 内容生成网关 - 业务能力层
//!
//! 只描述"生成目录 / 生成章节 / 回答问题"三种能力，不关心调度。
//!
//! 外部服务返回的内容必须先经过本模块的校验函数，
//! 变成明确的 `Ok` / `Err` 之后才能构造事件交给状态机。

use crate::error::{AppResult, GenerationError};
use crate::models::{ConversationId, Document, OutlineEntry, OutlineStore, QaExchange};
use std::future::Future;
use std::sync::Arc;

/// 章节生成请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterJob {
    pub conversation_id: Option<ConversationId>,
    pub chapter: u32,
    pub title: String,
    pub document: Arc<Document>,
    pub outline: Vec<OutlineEntry>,
    /// 编号小于目标章节的已缓存章节（已截断）
    pub prior_chapters: Vec<(u32, String)>,
}

/// 问答请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerJob {
    pub conversation_id: Option<ConversationId>,
    pub document: Arc<Document>,
    pub outline: Vec<OutlineEntry>,
    /// 所有已缓存章节（已截断）
    pub chapters: Vec<(u32, String)>,
    /// 最近 K 条已完成的问答
    pub history: Vec<QaExchange>,
    pub question: String,
}

/// 内容生成网关
///
/// 三个调用都可能很慢、很贵、会失败；实现方不需要做重试。
pub trait GenerationGateway: Send + Sync + 'static {
    /// 根据全文和学习者背景生成目录
    fn generate_outline(
        &self,
        document: &Document,
    ) -> impl Future<Output = AppResult<Vec<OutlineEntry>>> + Send;

    /// 生成单个章节的讲解内容
    fn generate_chapter(&self, job: &ChapterJob) -> impl Future<Output = AppResult<String>> + Send;

    /// 回答学习者的问题
    fn answer_question(&self, job: &AnswerJob) -> impl Future<Output = AppResult<String>> + Send;
}

/// 校验目录
pub fn validate_outline(entries: Vec<OutlineEntry>) -> AppResult<OutlineStore> {
    OutlineStore::from_entries(entries)
}

/// 校验章节内容（不允许空内容进入缓存）
pub fn validate_chapter_text(chapter: u32, raw: String) -> AppResult<String> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(GenerationError::EmptyChapter { chapter }.into());
    }
    Ok(text.to_string())
}

/// 校验回答
pub fn validate_answer(raw: String) -> AppResult<String> {
    let answer = raw.trim();
    if answer.is_empty() {
        return Err(GenerationError::EmptyAnswer.into());
    }
    Ok(answer.to_string())
}
