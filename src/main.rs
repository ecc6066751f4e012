use anyhow::{Context, Result};
use chapter_tutor::models::{ConversationId, Document};
use chapter_tutor::utils::{logging, truncate_text};
use chapter_tutor::{
    Config, Event, FileConversationStore, LlmGateway, LlmService, Orchestrator, SessionHandle,
    SessionState, SessionStatus,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

const HELP: &str = "\
命令:
  :open <文件> <学习背景>  提交文档
  :next / :prev            下一章 / 上一章
  :goto <章节>             跳转到指定章节
  :ask <问题>              提问（也可以直接输入问题）
  :outline                 显示目录
  :list                    列出已保存的会话
  :load <ID>               加载会话
  :delete <ID>             删除会话
  :reset                   重置当前会话
  :quit                    退出";

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置
    let config = Config::load()?;

    // 初始化日志
    logging::init(config.verbose_logging);
    logging::log_startup(&config);

    let gateway = Arc::new(LlmGateway::new(LlmService::new(&config)));
    let store = Arc::new(FileConversationStore::open(&config.store_dir).await?);
    let (orchestrator, handle, mut notices) =
        Orchestrator::new(gateway, store, config.context_limits());
    tokio::spawn(orchestrator.run());

    // 提示
    tokio::spawn(async move {
        while let Some(notice) = notices.recv().await {
            println!("{}", notice);
        }
    });

    // 状态变化
    let mut snapshots = handle.subscribe();
    tokio::spawn(async move {
        let mut shown = (SessionStatus::Idle, 0u32, 0u64, 0usize);
        while snapshots.changed().await.is_ok() {
            let state = snapshots.borrow_and_update().clone();
            let key = (
                state.status,
                state.current_chapter,
                state.epoch,
                state.qa_log.len(),
            );
            if key != shown {
                let chapter_changed = shown.1 != key.1 || shown.2 != key.2;
                print_state(&state, chapter_changed);
                shown = key;
            }
        }
    });

    // 命令行参数: <文件> <学习背景>
    let args: Vec<String> = std::env::args().skip(1).collect();
    if let [path, background @ ..] = args.as_slice() {
        submit_file(&handle, path, &background.join(" ")).await?;
    }

    println!("{}", HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match run_command(&handle, line).await {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => println!("❌ {:#}", e),
        }
    }

    Ok(())
}

/// 执行一条命令，返回 `false` 表示退出
async fn run_command(handle: &SessionHandle<FileConversationStore>, line: &str) -> Result<bool> {
    let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim();

    match command {
        ":quit" | ":q" => return Ok(false),
        ":help" => println!("{}", HELP),
        ":open" => {
            let (path, background) = rest.split_once(' ').unwrap_or((rest, ""));
            submit_file(handle, path, background).await?;
        }
        ":next" => handle.send(Event::NextChapter)?,
        ":prev" => handle.send(Event::PreviousChapter)?,
        ":goto" => handle.send(Event::RequestChapter(
            rest.parse().context("章节编号必须是正整数")?,
        ))?,
        ":ask" => handle.send(Event::AskQuestion(rest.to_string()))?,
        ":outline" => {
            let state = handle.state();
            for entry in state.outline.entries() {
                let mark = if state.cache.contains(entry.chapter) {
                    "✓"
                } else {
                    " "
                };
                println!("{} {:>3}. {}", mark, entry.chapter, entry.title);
            }
        }
        ":list" => {
            let conversations = handle.list_conversations().await?;
            if conversations.is_empty() {
                println!("没有已保存的会话");
            }
            for summary in conversations {
                println!(
                    "{:>5}  {}  {}",
                    summary.id,
                    summary.created_at.format("%Y-%m-%d %H:%M"),
                    summary.preview
                );
            }
        }
        ":load" => handle.send(Event::LoadConversation(parse_id(rest)?))?,
        ":delete" => {
            handle.delete_conversation(parse_id(rest)?).await?;
            println!("🗑️ 已删除");
        }
        ":reset" => handle.send(Event::Reset)?,
        _ if command.starts_with(':') => println!("未知命令: {}\n{}", command, HELP),
        _ => handle.send(Event::AskQuestion(line.to_string()))?,
    }
    Ok(true)
}

async fn submit_file(
    handle: &SessionHandle<FileConversationStore>,
    path: &str,
    background: &str,
) -> Result<()> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("无法读取文档: {}", path))?;
    handle.send(Event::SubmitDocument(Document::new(text, background)))?;
    Ok(())
}

fn parse_id(raw: &str) -> Result<ConversationId> {
    let raw = raw.trim_start_matches('#');
    Ok(ConversationId(raw.parse().context("会话 ID 必须是数字")?))
}

fn print_state(state: &SessionState, chapter_changed: bool) {
    println!("── {} ──", state.status);
    if state.status == SessionStatus::Error {
        if let Some(error) = &state.last_error {
            println!("❌ {}", error);
        }
    }
    if chapter_changed {
        if let (Some(title), Some(text)) = (
            state.outline.title(state.current_chapter),
            state.current_text(),
        ) {
            println!("\n# 第 {} 章 {}\n\n{}\n", state.current_chapter, title, text);
        }
    }
    if let Some(last) = state.qa_log.exchanges().last() {
        if state.status.is_idle() && !chapter_changed && !last.is_pending() {
            println!("💬 {}\n{}", truncate_text(&last.question, 60), last.answer);
        }
    }
}
