//! 基于 LLM 的内容生成网关
//!
//! 把 [`GenerationGateway`] 的三种能力翻译成提示词，交给 [`LlmService`]。
//! 目录响应在这里解析成结构化数据，章节和回答只做去空白。

use crate::error::{AppResult, GenerationError};
use crate::models::{Document, OutlineEntry};
use crate::services::gateway::{AnswerJob, ChapterJob, GenerationGateway};
use crate::services::{prompts, LlmService};
use crate::utils::truncate_text;
use regex::Regex;
use tracing::{debug, info};

/// LLM 内容生成网关
pub struct LlmGateway {
    llm: LlmService,
}

impl LlmGateway {
    pub fn new(llm: LlmService) -> Self {
        Self { llm }
    }
}

impl GenerationGateway for LlmGateway {
    async fn generate_outline(&self, document: &Document) -> AppResult<Vec<OutlineEntry>> {
        let (user_message, system_message) = prompts::outline_messages(document);
        let response = self
            .llm
            .send_to_llm(&user_message, Some(&system_message))
            .await?;

        let entries = parse_outline_response(&response)?;
        info!("📑 LLM 返回 {} 个目录条目", entries.len());
        Ok(entries)
    }

    async fn generate_chapter(&self, job: &ChapterJob) -> AppResult<String> {
        debug!(
            "生成第 {} 章，携带 {} 个前序章节",
            job.chapter,
            job.prior_chapters.len()
        );
        let (user_message, system_message) = prompts::chapter_messages(job);
        self.llm
            .send_to_llm(&user_message, Some(&system_message))
            .await
    }

    async fn answer_question(&self, job: &AnswerJob) -> AppResult<String> {
        debug!(
            "回答问题，携带 {} 个章节、{} 条历史",
            job.chapters.len(),
            job.history.len()
        );
        let (user_message, system_message) = prompts::answer_messages(job);
        self.llm
            .send_to_llm(&user_message, Some(&system_message))
            .await
    }
}

/// 解析目录响应
///
/// 依次尝试：代码块中的内容、第一个 `[` 到最后一个 `]` 之间的内容、整个响应。
pub fn parse_outline_response(response: &str) -> AppResult<Vec<OutlineEntry>> {
    let response = response.trim();

    let mut body = response;
    if let Ok(re) = Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)```") {
        if let Some(inner) = re.captures(response).and_then(|caps| caps.get(1)) {
            body = inner.as_str().trim();
        }
    }

    if let (Some(start), Some(end)) = (body.find('['), body.rfind(']')) {
        if start < end {
            body = &body[start..=end];
        }
    }

    serde_json::from_str(body).map_err(|source| {
        GenerationError::OutlineParseFailed {
            response: truncate_text(response, 200),
            source,
        }
        .into()
    })
}
