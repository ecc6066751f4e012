//! 会话状态机
//!
//! `reduce` 是 (状态, 事件) 的纯函数：就地更新状态并返回副作用列表，
//! 不发请求、不读时钟，所以可以脱离网络单独测试。
//!
//! 最关键的是 `ChapterReady` 的双重含义：
//! - 编号等于前台目标：结束等待，切换显示，回到空闲
//! - 否则（后台预取或已失效的请求）：只写缓存，不动状态和当前章节

use super::event::{Effect, Event, FailureKind, Notice, Rejection, RequestRole};
use super::session_state::{SessionState, SessionStatus};
use crate::models::{ConversationId, ConversationPayload, Document, OutlineStore};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

impl SessionState {
    /// 处理一个事件
    pub fn reduce(&mut self, event: Event) -> Vec<Effect> {
        let mut effects = Vec::new();

        match event {
            Event::SubmitDocument(document) => self.handle_submit_document(document, &mut effects),
            Event::OutlineReady {
                epoch,
                conversation_id,
                outline,
            } => self.handle_outline_ready(epoch, conversation_id, outline, &mut effects),
            Event::OutlineFailed { epoch, error } => {
                self.handle_outline_failed(epoch, error, &mut effects)
            }
            Event::RequestChapter(chapter) => self.handle_request_chapter(chapter, &mut effects),
            Event::NextChapter => self.handle_navigate(1, &mut effects),
            Event::PreviousChapter => self.handle_navigate(-1, &mut effects),
            Event::ChapterReady {
                epoch,
                chapter,
                text,
            } => self.handle_chapter_ready(epoch, chapter, text, &mut effects),
            Event::ChapterFailed {
                epoch,
                chapter,
                error,
            } => self.handle_chapter_failed(epoch, chapter, error, &mut effects),
            Event::SetDisplayed(chapter) => self.handle_set_displayed(chapter, &mut effects),
            Event::AskQuestion(question) => self.handle_ask_question(question, &mut effects),
            Event::AnswerReady { epoch, answer } => {
                self.handle_answer_ready(epoch, answer, &mut effects)
            }
            Event::AnswerFailed { epoch, error } => {
                self.handle_answer_failed(epoch, error, &mut effects)
            }
            Event::LoadConversation(id) => self.handle_load_conversation(id, &mut effects),
            Event::ConversationLoaded { epoch, payload } => {
                self.handle_conversation_loaded(epoch, payload, &mut effects)
            }
            Event::ConversationLoadFailed { epoch, error } => {
                self.handle_conversation_load_failed(epoch, error, &mut effects)
            }
            Event::ConversationDeleted(id) => self.handle_conversation_deleted(id),
            Event::Reset => self.handle_reset(),
        }

        if let Err(violation) = self.check_invariants() {
            error!("状态不变量被破坏: {}", violation);
        }

        effects
    }

    fn reject(&self, rejection: Rejection, effects: &mut Vec<Effect>) {
        info!("⏳ 操作被拒绝: {}", rejection);
        effects.push(Effect::Notify(Notice::Rejected(rejection)));
    }

    fn busy(&self, effects: &mut Vec<Effect>) {
        self.reject(
            Rejection::Busy {
                status: self.status,
            },
            effects,
        );
    }

    /// 异步结果是否属于当前这一代会话
    fn is_current(&self, epoch: u64, what: &str) -> bool {
        if epoch != self.epoch {
            debug!(
                "丢弃过期的{}结果 (请求代数 {}, 当前代数 {})",
                what, epoch, self.epoch
            );
            return false;
        }
        true
    }

    fn start_foreground(&mut self, chapter: u32, effects: &mut Vec<Effect>) {
        let Some(job) = self.chapter_job(chapter) else {
            warn!("⚠️ 无法构建第 {} 章的请求", chapter);
            return;
        };
        info!("📖 开始生成第 {} 章: {}", chapter, job.title);
        self.status = SessionStatus::GeneratingChapter(chapter);
        self.last_error = None;
        effects.push(Effect::GenerateChapter {
            epoch: self.epoch,
            role: RequestRole::Foreground,
            job,
        });
    }

    // ========== 文档与目录 ==========

    fn handle_submit_document(&mut self, document: Document, effects: &mut Vec<Effect>) {
        if !matches!(self.status, SessionStatus::Idle | SessionStatus::Error) {
            return self.busy(effects);
        }
        if !document.is_submittable() {
            return self.reject(Rejection::InvalidSubmission, effects);
        }

        self.begin_new_epoch();
        let document = Arc::new(document);
        self.document = Some(document.clone());
        self.status = SessionStatus::Indexing;
        info!(
            "📝 提交文档 ({} 字符)，开始生成目录",
            document.text.chars().count()
        );
        effects.push(Effect::GenerateOutline {
            epoch: self.epoch,
            document,
        });
    }

    fn handle_outline_ready(
        &mut self,
        epoch: u64,
        conversation_id: ConversationId,
        outline: OutlineStore,
        effects: &mut Vec<Effect>,
    ) {
        if !self.is_current(epoch, "目录") || self.status != SessionStatus::Indexing {
            return;
        }

        info!("✓ 目录生成完成: 共 {} 章，会话 {}", outline.len(), conversation_id);
        self.outline = outline;
        self.conversation_id = Some(conversation_id);
        self.start_foreground(1, effects);
    }

    fn handle_outline_failed(&mut self, epoch: u64, message: String, effects: &mut Vec<Effect>) {
        if !self.is_current(epoch, "目录") || self.status != SessionStatus::Indexing {
            return;
        }

        error!("❌ 目录生成失败: {}", message);
        self.status = SessionStatus::Error;
        self.document = None;
        self.conversation_id = None;
        self.last_error = Some(message.clone());
        effects.push(Effect::Notify(Notice::Failed {
            kind: FailureKind::OutlineGeneration,
            message,
        }));
    }

    // ========== 章节 ==========

    fn handle_request_chapter(&mut self, chapter: u32, effects: &mut Vec<Effect>) {
        if !self.has_active_document() {
            return self.reject(Rejection::NoActiveDocument, effects);
        }
        if !self.outline.contains(chapter) {
            return self.reject(
                Rejection::ChapterOutOfRange {
                    chapter,
                    total: self.outline.len(),
                },
                effects,
            );
        }
        if self.cache.contains(chapter) {
            return self.handle_set_displayed(chapter, effects);
        }

        match self.status {
            SessionStatus::GeneratingChapter(target) if target == chapter => {
                debug!("第 {} 章已在生成中", chapter);
            }
            SessionStatus::Idle | SessionStatus::Error => self.start_foreground(chapter, effects),
            _ => self.busy(effects),
        }
    }

    fn handle_navigate(&mut self, delta: i64, effects: &mut Vec<Effect>) {
        let next = i64::from(self.current_chapter) + delta;
        match u32::try_from(next) {
            Ok(chapter) if self.outline.contains(chapter) => {
                self.handle_request_chapter(chapter, effects)
            }
            _ => debug!("已经没有{}一章了", if delta > 0 { "下" } else { "上" }),
        }
    }

    fn handle_chapter_ready(
        &mut self,
        epoch: u64,
        chapter: u32,
        text: String,
        effects: &mut Vec<Effect>,
    ) {
        if !self.is_current(epoch, "章节") {
            return;
        }
        if text.trim().is_empty() {
            return self.handle_chapter_failed(
                epoch,
                chapter,
                format!("第 {} 章生成内容为空", chapter),
                effects,
            );
        }
        if !self.outline.contains(chapter) {
            warn!("⚠️ 第 {} 章不在目录中，丢弃结果", chapter);
            return;
        }

        if self.cache.insert(chapter, text.clone()) {
            if let Some(conversation_id) = self.conversation_id {
                effects.push(Effect::PersistChapter {
                    conversation_id,
                    chapter,
                    text,
                });
            }
        }

        if self.target_chapter() == Some(chapter) {
            info!("✓ 第 {} 章生成完成", chapter);
            self.status = SessionStatus::Idle;
            self.current_chapter = chapter;
            self.last_error = None;
        } else {
            debug!("📦 第 {} 章已写入缓存 (后台)", chapter);
        }
    }

    fn handle_chapter_failed(
        &mut self,
        epoch: u64,
        chapter: u32,
        message: String,
        effects: &mut Vec<Effect>,
    ) {
        if !self.is_current(epoch, "章节") {
            return;
        }

        if self.target_chapter() == Some(chapter) {
            error!("❌ 第 {} 章生成失败: {}", chapter, message);
            self.status = SessionStatus::Error;
            self.last_error = Some(message.clone());
            effects.push(Effect::Notify(Notice::Failed {
                kind: FailureKind::ChapterGeneration,
                message,
            }));
        } else {
            warn!("⚠️ 第 {} 章预取失败 (不影响当前操作): {}", chapter, message);
        }
    }

    fn handle_set_displayed(&mut self, chapter: u32, effects: &mut Vec<Effect>) {
        if !self.cache.contains(chapter) {
            return self.reject(Rejection::ChapterNotCached { chapter }, effects);
        }

        match self.status {
            SessionStatus::Answering => {
                self.current_chapter = chapter;
            }
            SessionStatus::Indexing | SessionStatus::LoadingConversation => self.busy(effects),
            SessionStatus::GeneratingChapter(target) => {
                info!("↩️ 放弃等待第 {} 章，切换到第 {} 章", target, chapter);
                self.status = SessionStatus::Idle;
                self.current_chapter = chapter;
            }
            SessionStatus::Idle | SessionStatus::Error => {
                self.status = SessionStatus::Idle;
                self.current_chapter = chapter;
                self.last_error = None;
            }
        }
    }

    // ========== 问答 ==========

    fn handle_ask_question(&mut self, question: String, effects: &mut Vec<Effect>) {
        let question = question.trim().to_string();
        if question.is_empty() {
            return self.reject(Rejection::EmptyQuestion, effects);
        }
        if !self.has_active_document() {
            return self.reject(Rejection::NoActiveDocument, effects);
        }
        if !matches!(self.status, SessionStatus::Idle | SessionStatus::Error) {
            return self.busy(effects);
        }
        let Some(job) = self.answer_job(&question) else {
            return self.reject(Rejection::NoActiveDocument, effects);
        };

        info!("❓ 提问: {}", crate::utils::truncate_text(&question, 40));
        self.status = SessionStatus::Answering;
        self.last_error = None;
        self.qa_log.push_pending(question);
        effects.push(Effect::AnswerQuestion {
            epoch: self.epoch,
            job,
        });
    }

    fn handle_answer_ready(&mut self, epoch: u64, answer: String, effects: &mut Vec<Effect>) {
        if !self.is_current(epoch, "回答") || self.status != SessionStatus::Answering {
            return;
        }
        if answer.trim().is_empty() {
            return self.handle_answer_failed(epoch, "回答内容为空".to_string(), effects);
        }

        let Some(exchange) = self.qa_log.complete_last(answer).cloned() else {
            warn!("⚠️ 没有等待中的问题，丢弃回答");
            self.status = SessionStatus::Idle;
            return;
        };
        info!("✓ 回答完成");
        self.status = SessionStatus::Idle;
        if let Some(conversation_id) = self.conversation_id {
            effects.push(Effect::PersistExchange {
                conversation_id,
                exchange,
            });
        }
    }

    fn handle_answer_failed(&mut self, epoch: u64, message: String, effects: &mut Vec<Effect>) {
        if !self.is_current(epoch, "回答") || self.status != SessionStatus::Answering {
            return;
        }

        error!("❌ 回答失败: {}", message);
        self.qa_log.rollback_last();
        self.status = SessionStatus::Error;
        self.last_error = Some(message.clone());
        effects.push(Effect::Notify(Notice::Failed {
            kind: FailureKind::AnswerGeneration,
            message,
        }));
    }

    // ========== 会话 ==========

    fn handle_load_conversation(&mut self, id: ConversationId, effects: &mut Vec<Effect>) {
        if self.status == SessionStatus::LoadingConversation && self.conversation_id == Some(id) {
            return;
        }
        if !matches!(self.status, SessionStatus::Idle | SessionStatus::Error) {
            return self.busy(effects);
        }

        info!("📂 加载会话 {}", id);
        self.begin_new_epoch();
        self.status = SessionStatus::LoadingConversation;
        self.conversation_id = Some(id);
        effects.push(Effect::LoadConversation {
            epoch: self.epoch,
            id,
        });
    }

    fn handle_conversation_loaded(
        &mut self,
        epoch: u64,
        payload: ConversationPayload,
        effects: &mut Vec<Effect>,
    ) {
        if !self.is_current(epoch, "会话")
            || self.status != SessionStatus::LoadingConversation
            || self.conversation_id != Some(payload.id)
        {
            return;
        }

        info!(
            "✓ 会话 {} 加载完成: 共 {} 章，已生成 {} 章，问答 {} 条",
            payload.id,
            payload.outline.len(),
            payload.chapters.len(),
            payload.qa_history.len()
        );
        self.document = Some(Arc::new(payload.document));
        self.outline = payload.outline;
        self.cache = payload.chapters;
        self.qa_log = payload.qa_history;
        self.current_chapter = self.cache.first_chapter().unwrap_or(0);

        if self.cache.contains(1) {
            self.status = SessionStatus::Idle;
        } else {
            self.start_foreground(1, effects);
        }
    }

    fn handle_conversation_load_failed(
        &mut self,
        epoch: u64,
        message: String,
        effects: &mut Vec<Effect>,
    ) {
        if !self.is_current(epoch, "会话") || self.status != SessionStatus::LoadingConversation {
            return;
        }

        error!("❌ 会话加载失败: {}", message);
        *self = Self {
            epoch: self.epoch,
            limits: self.limits,
            status: SessionStatus::Error,
            last_error: Some(message.clone()),
            ..Default::default()
        };
        effects.push(Effect::Notify(Notice::Failed {
            kind: FailureKind::ConversationLoad,
            message,
        }));
    }

    fn handle_conversation_deleted(&mut self, id: ConversationId) {
        if self.conversation_id == Some(id) {
            info!("🗑️ 当前会话 {} 已删除，重置会话", id);
            self.handle_reset();
        }
    }

    fn handle_reset(&mut self) {
        self.begin_new_epoch();
        self.status = SessionStatus::Idle;
        debug!("会话已重置 (代数 {})", self.epoch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChapterCache, OutlineEntry, QaExchange, QaLog};

    fn outline(n: u32) -> OutlineStore {
        OutlineStore::from_entries(
            (1..=n)
                .map(|i| OutlineEntry::new(i, format!("第{i}章")))
                .collect(),
        )
        .unwrap()
    }

    /// 提交文档并完成目录
    fn indexed(n: u32) -> SessionState {
        let mut state = SessionState::default();
        state.reduce(Event::SubmitDocument(Document::new("全文", "本科生")));
        let epoch = state.epoch;
        state.reduce(Event::OutlineReady {
            epoch,
            conversation_id: ConversationId(1),
            outline: outline(n),
        });
        state
    }

    fn ready(state: &mut SessionState, chapter: u32, text: &str) -> Vec<Effect> {
        let epoch = state.epoch;
        state.reduce(Event::ChapterReady {
            epoch,
            chapter,
            text: text.to_string(),
        })
    }

    fn idle_on(chapters: &[u32], current: u32) -> SessionState {
        let mut state = indexed(30);
        for &chapter in chapters {
            ready(&mut state, chapter, &format!("内容{chapter}"));
        }
        state.reduce(Event::SetDisplayed(current));
        state
    }

    #[test]
    fn test_submit_document_starts_indexing() {
        let mut state = SessionState::default();
        let effects = state.reduce(Event::SubmitDocument(Document::new("全文", "本科生")));

        assert_eq!(state.status, SessionStatus::Indexing);
        assert_eq!(state.epoch, 1);
        assert!(matches!(effects.as_slice(), [Effect::GenerateOutline { epoch: 1, .. }]));
    }

    #[test]
    fn test_submit_document_rejects_blank_background() {
        let mut state = SessionState::default();
        let effects = state.reduce(Event::SubmitDocument(Document::new("全文", " ")));

        assert_eq!(state.status, SessionStatus::Idle);
        assert_eq!(
            effects,
            vec![Effect::Notify(Notice::Rejected(Rejection::InvalidSubmission))]
        );
    }

    #[test]
    fn test_outline_ready_requests_first_chapter() {
        let mut state = SessionState::default();
        state.reduce(Event::SubmitDocument(Document::new("全文", "本科生")));
        let effects = state.reduce(Event::OutlineReady {
            epoch: 1,
            conversation_id: ConversationId(9),
            outline: outline(3),
        });

        assert_eq!(state.status, SessionStatus::GeneratingChapter(1));
        assert_eq!(state.conversation_id, Some(ConversationId(9)));
        match effects.as_slice() {
            [Effect::GenerateChapter { role, job, .. }] => {
                assert_eq!(*role, RequestRole::Foreground);
                assert_eq!(job.chapter, 1);
                assert!(job.prior_chapters.is_empty());
            }
            other => panic!("unexpected effects: {other:?}"),
        }
    }

    #[test]
    fn test_outline_failed_clears_document() {
        let mut state = SessionState::default();
        state.reduce(Event::SubmitDocument(Document::new("全文", "本科生")));
        let effects = state.reduce(Event::OutlineFailed {
            epoch: 1,
            error: "超时".to_string(),
        });

        assert_eq!(state.status, SessionStatus::Error);
        assert!(state.document.is_none());
        assert_eq!(state.last_error.as_deref(), Some("超时"));
        assert!(matches!(
            effects.as_slice(),
            [Effect::Notify(Notice::Failed {
                kind: FailureKind::OutlineGeneration,
                ..
            })]
        ));
    }

    #[test]
    fn test_foreground_ready_goes_idle_and_persists() {
        let mut state = indexed(30);
        let effects = ready(&mut state, 1, "text");

        assert_eq!(state.status, SessionStatus::Idle);
        assert_eq!(state.current_chapter, 1);
        assert_eq!(state.cache.get(1), Some("text"));
        assert_eq!(
            effects,
            vec![Effect::PersistChapter {
                conversation_id: ConversationId(1),
                chapter: 1,
                text: "text".to_string(),
            }]
        );
    }

    #[test]
    fn test_background_ready_only_fills_cache() {
        let mut state = idle_on(&[1, 2, 3], 3);
        state.reduce(Event::AskQuestion("X 是什么？".to_string()));
        ready(&mut state, 4, "第四章");

        assert_eq!(state.status, SessionStatus::Answering);
        assert_eq!(state.current_chapter, 3);
        assert!(state.cache.contains(4));
    }

    #[test]
    fn test_duplicate_ready_keeps_first_value() {
        let mut state = indexed(30);
        ready(&mut state, 1, "第一次");
        let effects = ready(&mut state, 1, "第二次");

        assert_eq!(state.cache.get(1), Some("第一次"));
        assert!(effects.is_empty());
    }

    #[test]
    fn test_request_chapter_while_generating_other_is_rejected() {
        let mut state = indexed(30);
        let effects = state.reduce(Event::RequestChapter(5));

        assert_eq!(state.status, SessionStatus::GeneratingChapter(1));
        assert_eq!(
            effects,
            vec![Effect::Notify(Notice::Rejected(Rejection::Busy {
                status: SessionStatus::GeneratingChapter(1)
            }))]
        );
    }

    #[test]
    fn test_request_cached_chapter_only_displays() {
        let mut state = idle_on(&[1, 2], 2);
        let effects = state.reduce(Event::RequestChapter(1));

        assert!(effects.is_empty());
        assert_eq!(state.current_chapter, 1);
        assert_eq!(state.status, SessionStatus::Idle);
    }

    #[test]
    fn test_request_uncached_chapter_sends_prior_context() {
        let mut state = idle_on(&[1, 2], 2);
        let effects = state.reduce(Event::RequestChapter(4));

        assert_eq!(state.status, SessionStatus::GeneratingChapter(4));
        match effects.as_slice() {
            [Effect::GenerateChapter { job, .. }] => {
                let prior: Vec<u32> = job.prior_chapters.iter().map(|(n, _)| *n).collect();
                assert_eq!(prior, vec![1, 2]);
            }
            other => panic!("unexpected effects: {other:?}"),
        }
    }

    #[test]
    fn test_request_out_of_range_is_rejected() {
        let mut state = idle_on(&[1], 1);
        let effects = state.reduce(Event::RequestChapter(31));
        assert!(effects[0].is_rejection());
        assert_eq!(state.status, SessionStatus::Idle);
    }

    #[test]
    fn test_navigation_moves_through_outline() {
        let mut state = idle_on(&[1, 2], 1);
        state.reduce(Event::NextChapter);
        assert_eq!(state.current_chapter, 2);

        state.reduce(Event::PreviousChapter);
        state.reduce(Event::PreviousChapter);
        assert_eq!(state.current_chapter, 1);

        state.reduce(Event::SetDisplayed(2));
        let effects = state.reduce(Event::NextChapter);
        assert_eq!(state.status, SessionStatus::GeneratingChapter(3));
        assert_eq!(effects.len(), 1);
    }

    #[test]
    fn test_foreground_failure_surfaces_error() {
        let mut state = indexed(30);
        let effects = state.reduce(Event::ChapterFailed {
            epoch: state.epoch,
            chapter: 1,
            error: "500".to_string(),
        });

        assert_eq!(state.status, SessionStatus::Error);
        assert!(matches!(
            effects.as_slice(),
            [Effect::Notify(Notice::Failed {
                kind: FailureKind::ChapterGeneration,
                ..
            })]
        ));
    }

    #[test]
    fn test_speculative_failure_is_silent() {
        let mut state = idle_on(&[1], 1);
        let effects = state.reduce(Event::ChapterFailed {
            epoch: state.epoch,
            chapter: 2,
            error: "500".to_string(),
        });

        assert!(effects.is_empty());
        assert_eq!(state.status, SessionStatus::Idle);
        assert!(state.last_error.is_none());
    }

    #[test]
    fn test_cached_chapters_viewable_in_error() {
        let mut state = idle_on(&[1, 2], 2);
        state.reduce(Event::RequestChapter(3));
        state.reduce(Event::ChapterFailed {
            epoch: state.epoch,
            chapter: 3,
            error: "boom".to_string(),
        });
        assert_eq!(state.status, SessionStatus::Error);

        state.reduce(Event::SetDisplayed(1));
        assert_eq!(state.status, SessionStatus::Idle);
        assert_eq!(state.current_chapter, 1);
    }

    #[test]
    fn test_set_displayed_abandons_foreground_wait() {
        let mut state = idle_on(&[1, 2], 2);
        state.reduce(Event::RequestChapter(5));
        state.reduce(Event::SetDisplayed(1));

        assert_eq!(state.status, SessionStatus::Idle);
        assert_eq!(state.target_chapter(), None);

        ready(&mut state, 5, "第五章");
        assert_eq!(state.current_chapter, 1);
        assert!(state.cache.contains(5));
    }

    #[test]
    fn test_ask_question_is_exclusive() {
        let mut state = idle_on(&[1], 1);
        let effects = state.reduce(Event::AskQuestion("为什么？".to_string()));
        assert_eq!(state.status, SessionStatus::Answering);
        assert!(matches!(effects.as_slice(), [Effect::AnswerQuestion { .. }]));
        assert_eq!(state.qa_log.len(), 1);

        let effects = state.reduce(Event::AskQuestion("再问一次".to_string()));
        assert!(effects[0].is_rejection());
        assert_eq!(state.qa_log.len(), 1);
    }

    #[test]
    fn test_ask_question_rejected_while_generating() {
        let mut state = indexed(30);
        let effects = state.reduce(Event::AskQuestion("为什么？".to_string()));
        assert!(effects[0].is_rejection());
        assert!(state.qa_log.is_empty());
    }

    #[test]
    fn test_answer_ready_fills_last_exchange() {
        let mut state = idle_on(&[1], 1);
        state.reduce(Event::AskQuestion("为什么？".to_string()));
        let effects = state.reduce(Event::AnswerReady {
            epoch: state.epoch,
            answer: "因为".to_string(),
        });

        assert_eq!(state.status, SessionStatus::Idle);
        assert_eq!(state.qa_log.exchanges(), &[QaExchange::new("为什么？", "因为")]);
        assert!(matches!(effects.as_slice(), [Effect::PersistExchange { .. }]));
    }

    #[test]
    fn test_answer_failed_rolls_back() {
        let mut state = idle_on(&[1], 1);
        state.qa_log = QaLog::from(vec![QaExchange::new("旧问题", "旧回答")]);
        let before = state.qa_log.len();

        state.reduce(Event::AskQuestion("新问题".to_string()));
        state.reduce(Event::AnswerFailed {
            epoch: state.epoch,
            error: "限流".to_string(),
        });

        assert_eq!(state.qa_log.len(), before);
        assert_eq!(state.status, SessionStatus::Error);
        assert!(!state.qa_log.has_pending());
    }

    #[test]
    fn test_load_conversation_restores_cache() {
        let mut state = SessionState::default();
        let effects = state.reduce(Event::LoadConversation(ConversationId(7)));
        assert_eq!(state.status, SessionStatus::LoadingConversation);
        assert!(matches!(effects.as_slice(), [Effect::LoadConversation { .. }]));

        let chapters: ChapterCache = [(1, "一".to_string()), (2, "二".to_string())]
            .into_iter()
            .collect();
        state.reduce(Event::ConversationLoaded {
            epoch: state.epoch,
            payload: ConversationPayload {
                id: ConversationId(7),
                document: Document::new("全文", "背景"),
                outline: outline(10),
                chapters,
                qa_history: QaLog::new(),
            },
        });

        assert_eq!(state.status, SessionStatus::Idle);
        assert_eq!(state.outline.len(), 10);
        assert_eq!(state.cache.len(), 2);
        assert_eq!(state.current_chapter, 1);
    }

    #[test]
    fn test_load_conversation_without_first_chapter_generates_it() {
        let mut state = SessionState::default();
        state.reduce(Event::LoadConversation(ConversationId(3)));
        let effects = state.reduce(Event::ConversationLoaded {
            epoch: state.epoch,
            payload: ConversationPayload {
                id: ConversationId(3),
                document: Document::new("全文", "背景"),
                outline: outline(4),
                chapters: [(3, "三".to_string())].into_iter().collect(),
                qa_history: QaLog::new(),
            },
        });

        assert_eq!(state.status, SessionStatus::GeneratingChapter(1));
        assert_eq!(state.current_chapter, 3);
        assert_eq!(effects.len(), 1);
    }

    #[test]
    fn test_load_failure_empties_session() {
        let mut state = idle_on(&[1], 1);
        state.reduce(Event::LoadConversation(ConversationId(2)));
        state.reduce(Event::ConversationLoadFailed {
            epoch: state.epoch,
            error: "不存在".to_string(),
        });

        assert_eq!(state.status, SessionStatus::Error);
        assert!(state.cache.is_empty());
        assert!(state.conversation_id.is_none());
    }

    #[test]
    fn test_stale_epoch_results_are_dropped() {
        let mut state = indexed(30);
        let old_epoch = state.epoch;
        state.reduce(Event::Reset);

        let effects = state.reduce(Event::ChapterReady {
            epoch: old_epoch,
            chapter: 1,
            text: "旧会话的内容".to_string(),
        });
        assert!(effects.is_empty());
        assert!(state.cache.is_empty());
        assert_eq!(state.status, SessionStatus::Idle);
    }

    #[test]
    fn test_deleting_active_conversation_resets() {
        let mut state = idle_on(&[1], 1);
        state.reduce(Event::ConversationDeleted(ConversationId(99)));
        assert!(state.conversation_id.is_some());

        state.reduce(Event::ConversationDeleted(ConversationId(1)));
        assert!(state.conversation_id.is_none());
        assert!(state.cache.is_empty());
    }

    #[test]
    fn test_cache_never_shrinks_within_session() {
        let mut state = indexed(6);
        let mut last = 0;
        let epoch = state.epoch;
        let events = vec![
            Event::ChapterReady { epoch, chapter: 1, text: "1".into() },
            Event::ChapterReady { epoch, chapter: 3, text: "3".into() },
            Event::RequestChapter(2),
            Event::ChapterFailed { epoch, chapter: 2, error: "x".into() },
            Event::AskQuestion("q".into()),
            Event::AnswerFailed { epoch, error: "y".into() },
            Event::ChapterReady { epoch, chapter: 3, text: "3b".into() },
            Event::RequestChapter(2),
            Event::ChapterReady { epoch, chapter: 2, text: "2".into() },
        ];
        for event in events {
            state.reduce(event);
            assert!(state.cache.len() >= last);
            last = state.cache.len();
            if let Some(target) = state.target_chapter() {
                assert!(!state.cache.contains(target));
            }
        }
        assert_eq!(state.cache.len(), 3);
        assert_eq!(state.current_chapter, 2);
    }
}
