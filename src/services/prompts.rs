//! 提示词构建
//!
//! 每个函数返回 (user_message, system_message)。

use crate::models::{Document, OutlineEntry, QaExchange};
use crate::services::{AnswerJob, ChapterJob};

/// 目录提示词
pub fn outline_messages(document: &Document) -> (String, String) {
    let system_message = "你是一名擅长编写入门教材的教授，负责把学习材料拆分成循序渐进的章节。\
                          只输出 JSON，不输出任何解释。"
        .to_string();

    let user_message = format!(
        r#"分析下面的文档，像设计一本入门书的目录一样，把它拆分成有逻辑的学习单元（章节）。

【学习者背景】
{}

【要求】
- 从第一性原理出发，逐步建立概念
- 拆分为 25–40 章，每章篇幅适中
- 章节标题简洁，能体现该章主题和学习递进关系
- 使用文档本身的语言

【输出格式】
只输出一个 JSON 数组，每个元素包含 "chapter"（从 1 开始的连续整数）和 "title"（字符串）。
不要输出 markdown，不要在 JSON 前后添加任何文字。

【文档】
---
{}
---"#,
        document.background, document.text
    );

    (user_message, system_message)
}

/// 章节提示词
///
/// 只包含编号小于目标章节的已生成内容。
pub fn chapter_messages(job: &ChapterJob) -> (String, String) {
    let system_message = "你是一名专业的教授和清晰的讲解者。只讲解指定的章节，\
                          不复述提示词，不写开场白和总结语。"
        .to_string();

    let previous = if job.prior_chapters.is_empty() {
        "尚未生成前面的章节。".to_string()
    } else {
        job.prior_chapters
            .iter()
            .map(|(chapter, text)| {
                let title = title_of(&job.outline, *chapter);
                format!(
                    "--- 第 {} 章 (\"{}\") 开始 ---\n{}\n--- 第 {} 章结束 ---",
                    chapter, title, text, chapter
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    };

    let user_message = format!(
        r#"【学习者背景】
{}

【任务】
只讲解第 {} 章："{}"

【参考】
目录：
{}

前面章节的摘要：
{}

【讲解要求】
- 不要照抄原文，要解释和教学
- 自行判断文档中哪些部分对应这一章
- 把复杂的概念拆成一步一步讲
- 解释代码、算法或理论背后的目的
- 使用适合学习者背景的类比和例子
- 涉及矩阵等运算时，用带具体数字的例子演示
- 先引用所讲解的原文片段，再开始讲解
- 使用 Markdown（标题、列表、代码块）组织内容
- 使用文档本身的语言

【全文】
---
{}
---"#,
        job.document.background,
        job.chapter,
        job.title,
        outline_json(&job.outline),
        previous,
        job.document.text
    );

    (user_message, system_message)
}

/// 问答提示词
pub fn answer_messages(job: &AnswerJob) -> (String, String) {
    let system_message = format!(
        "你是一名耐心、知识渊博的助教，正在回答一位学习者的问题。学习者背景：{}。\
         优先依据提供的文档和已生成的章节回答；文档没有覆盖的内容可以使用通用知识补充。\
         直接回答，不要使用\"好的\"\"当然\"之类的开场白。",
        job.document.background
    );

    let chapters = if job.chapters.is_empty() {
        "尚未生成任何章节。".to_string()
    } else {
        job.chapters
            .iter()
            .map(|(chapter, text)| {
                format!(
                    "第 {} 章 (\"{}\"):\n{}",
                    chapter,
                    title_of(&job.outline, *chapter),
                    text
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    };

    let user_message = format!(
        r#"【参考资料】

1. 原始文档：
--- 文档开始 ---
{}
--- 文档结束 ---

2. 文档目录：
{}

3. 已生成章节的摘要：
{}

4. 最近的问答记录：
{}

【学习者的问题】
{}"#,
        job.document.text,
        outline_json(&job.outline),
        chapters,
        history_json(&job.history),
        job.question
    );

    (user_message, system_message)
}

fn title_of(outline: &[OutlineEntry], chapter: u32) -> &str {
    outline
        .iter()
        .find(|entry| entry.chapter == chapter)
        .map(|entry| entry.title.as_str())
        .unwrap_or("")
}

fn outline_json(outline: &[OutlineEntry]) -> String {
    serde_json::to_string_pretty(outline).unwrap_or_default()
}

fn history_json(history: &[QaExchange]) -> String {
    if history.is_empty() {
        return "暂无问答记录。".to_string();
    }
    serde_json::to_string_pretty(history).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn document() -> Arc<Document> {
        Arc::new(Document::new("注意力机制全文", "熟悉 Python 的本科生"))
    }

    fn outline() -> Vec<OutlineEntry> {
        vec![
            OutlineEntry::new(1, "背景"),
            OutlineEntry::new(2, "缩放点积注意力"),
            OutlineEntry::new(3, "多头注意力"),
        ]
    }

    #[test]
    fn test_outline_messages_contain_document_and_background() {
        let (user, system) = outline_messages(&document());
        assert!(user.contains("注意力机制全文"));
        assert!(user.contains("熟悉 Python 的本科生"));
        assert!(system.contains("JSON"));
    }

    #[test]
    fn test_chapter_messages_include_prior_chapters_only() {
        let job = ChapterJob {
            conversation_id: None,
            chapter: 3,
            title: "多头注意力".to_string(),
            document: document(),
            outline: outline(),
            prior_chapters: vec![(1, "第一章摘要".to_string())],
        };
        let (user, _) = chapter_messages(&job);

        assert!(user.contains("只讲解第 3 章：\"多头注意力\""));
        assert!(user.contains("--- 第 1 章 (\"背景\") 开始 ---"));
        assert!(!user.contains("第 2 章 (\""));
    }

    #[test]
    fn test_chapter_messages_without_prior_chapters() {
        let job = ChapterJob {
            conversation_id: None,
            chapter: 1,
            title: "背景".to_string(),
            document: document(),
            outline: outline(),
            prior_chapters: Vec::new(),
        };
        let (user, _) = chapter_messages(&job);
        assert!(user.contains("尚未生成前面的章节"));
    }

    #[test]
    fn test_answer_messages_include_history_and_question() {
        let job = AnswerJob {
            conversation_id: None,
            document: document(),
            outline: outline(),
            chapters: vec![(2, "点积除以根号 d".to_string())],
            history: vec![QaExchange::new("什么是 Q？", "查询向量")],
            question: "为什么要缩放？".to_string(),
        };
        let (user, system) = answer_messages(&job);

        assert!(system.contains("熟悉 Python 的本科生"));
        assert!(user.contains("第 2 章 (\"缩放点积注意力\")"));
        assert!(user.contains("什么是 Q？"));
        assert!(user.ends_with("为什么要缩放？"));
    }
}
