//! 会话控制器 - 编排层
//!
//! ## 职责
//!
//! 1. **串行事件循环**：用户操作和异步结果进入同一个队列，按到达顺序逐个处理
//! 2. **执行副作用**：把状态机和调度器产生的请求交给网关和存储，结果作为新事件回到队列
//! 3. **发布状态**：每处理完一个事件，通过 `watch` 通道发布最新的会话状态
//!
//! ## 设计特点
//!
//! - **唯一所有者**：`SessionState` 只属于控制器，外部只能拿到快照
//! - **不阻塞**：请求在 `tokio::spawn` 的任务中执行，控制器始终可以处理下一个事件
//! - **语义取消**：不中止在途请求，过期结果由会话代数过滤

use crate::error::{AppError, AppResult};
use crate::models::{ConversationId, ConversationSummary};
use crate::services::{
    validate_answer, validate_chapter_text, validate_outline, ConversationStore,
    GenerationGateway,
};
use crate::workflow::{ContextLimits, Effect, Event, Notice, Scheduler, SessionState};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// 队列中的消息
#[derive(Debug)]
enum Message {
    Event(Event),
    /// 后台任务结束，可能带回一个事件
    TaskFinished(Option<Event>),
}

/// 会话控制器
pub struct Orchestrator<G, S> {
    gateway: Arc<G>,
    store: Arc<S>,
    state: SessionState,
    scheduler: Scheduler,
    rx: mpsc::UnboundedReceiver<Message>,
    /// 后台任务用的发送端，不阻止通道关闭
    task_tx: mpsc::WeakUnboundedSender<Message>,
    snapshots: watch::Sender<SessionState>,
    notices: mpsc::UnboundedSender<Notice>,
    pending_tasks: usize,
}

/// 会话句柄
///
/// 可以克隆，用于发送用户操作、读取状态快照和管理已保存的会话。
pub struct SessionHandle<S> {
    tx: mpsc::UnboundedSender<Message>,
    snapshots: watch::Receiver<SessionState>,
    store: Arc<S>,
}

impl<S> Clone for SessionHandle<S> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            snapshots: self.snapshots.clone(),
            store: self.store.clone(),
        }
    }
}

impl<G, S> Orchestrator<G, S>
where
    G: GenerationGateway,
    S: ConversationStore,
{
    /// 创建控制器
    ///
    /// 返回 (控制器, 句柄, 提示接收端)
    pub fn new(
        gateway: Arc<G>,
        store: Arc<S>,
        limits: ContextLimits,
    ) -> (Self, SessionHandle<S>, mpsc::UnboundedReceiver<Notice>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (notice_tx, notice_rx) = mpsc::unbounded_channel();
        let state = SessionState::new(limits);
        let (snapshot_tx, snapshot_rx) = watch::channel(state.clone());

        let orchestrator = Self {
            gateway,
            store: store.clone(),
            state,
            scheduler: Scheduler::new(),
            rx,
            task_tx: tx.downgrade(),
            snapshots: snapshot_tx,
            notices: notice_tx,
            pending_tasks: 0,
        };
        let handle = SessionHandle {
            tx,
            snapshots: snapshot_rx,
            store,
        };
        (orchestrator, handle, notice_rx)
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// 尚未结束的后台任务数量
    pub fn pending_tasks(&self) -> usize {
        self.pending_tasks
    }

    /// 运行事件循环，直到所有句柄和后台任务都已释放
    pub async fn run(mut self) {
        info!("🔄 会话控制器启动");
        while let Some(message) = self.rx.recv().await {
            self.handle_message(message);
        }
        info!("🛑 会话控制器退出");
    }

    /// 处理队列中的下一条消息，队列关闭时返回 `false`
    pub async fn step(&mut self) -> bool {
        match self.rx.recv().await {
            Some(message) => {
                self.handle_message(message);
                true
            }
            None => false,
        }
    }

    /// 处理一个事件：状态机 → 调度器 → 执行副作用 → 发布快照
    pub fn dispatch(&mut self, event: Event) {
        debug!("事件: {}", event_name(&event));
        let before = self.scheduler.observe(&event, &self.state);
        let effects = self.state.reduce(event);
        let effects = self.scheduler.settle(before, &self.state, effects);

        for effect in effects {
            self.execute(effect);
        }
        self.snapshots.send_replace(self.state.clone());
    }

    fn handle_message(&mut self, message: Message) {
        match message {
            Message::Event(event) => self.dispatch(event),
            Message::TaskFinished(event) => {
                self.pending_tasks = self.pending_tasks.saturating_sub(1);
                if let Some(event) = event {
                    self.dispatch(event);
                }
            }
        }
    }

    fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::GenerateOutline { epoch, document } => {
                let gateway = self.gateway.clone();
                let store = self.store.clone();
                self.spawn(async move {
                    let result = async {
                        let entries = gateway.generate_outline(&document).await?;
                        let outline = validate_outline(entries)?;
                        let conversation_id = store.create_conversation(&document, &outline).await?;
                        Ok::<_, AppError>((conversation_id, outline))
                    }
                    .await;

                    Some(match result {
                        Ok((conversation_id, outline)) => Event::OutlineReady {
                            epoch,
                            conversation_id,
                            outline,
                        },
                        Err(e) => Event::OutlineFailed {
                            epoch,
                            error: e.to_string(),
                        },
                    })
                });
            }
            Effect::GenerateChapter { epoch, role, job } => {
                let gateway = self.gateway.clone();
                debug!("发送第 {} 章请求 ({:?})", job.chapter, role);
                self.spawn(async move {
                    let chapter = job.chapter;
                    let result = gateway
                        .generate_chapter(&job)
                        .await
                        .and_then(|raw| validate_chapter_text(chapter, raw));

                    Some(match result {
                        Ok(text) => Event::ChapterReady {
                            epoch,
                            chapter,
                            text,
                        },
                        Err(e) => Event::ChapterFailed {
                            epoch,
                            chapter,
                            error: e.to_string(),
                        },
                    })
                });
            }
            Effect::AnswerQuestion { epoch, job } => {
                let gateway = self.gateway.clone();
                self.spawn(async move {
                    let result = gateway
                        .answer_question(&job)
                        .await
                        .and_then(validate_answer);

                    Some(match result {
                        Ok(answer) => Event::AnswerReady { epoch, answer },
                        Err(e) => Event::AnswerFailed {
                            epoch,
                            error: e.to_string(),
                        },
                    })
                });
            }
            Effect::LoadConversation { epoch, id } => {
                let store = self.store.clone();
                self.spawn(async move {
                    Some(match store.load_conversation(id).await {
                        Ok(payload) => Event::ConversationLoaded { epoch, payload },
                        Err(e) => Event::ConversationLoadFailed {
                            epoch,
                            error: e.to_string(),
                        },
                    })
                });
            }
            Effect::PersistChapter {
                conversation_id,
                chapter,
                text,
            } => {
                let store = self.store.clone();
                self.spawn(async move {
                    if let Err(e) = store.save_chapter(conversation_id, chapter, &text).await {
                        warn!(
                            "⚠️ 保存会话 {} 第 {} 章失败: {}",
                            conversation_id, chapter, e
                        );
                    }
                    None
                });
            }
            Effect::PersistExchange {
                conversation_id,
                exchange,
            } => {
                let store = self.store.clone();
                self.spawn(async move {
                    if let Err(e) = store.save_exchange(conversation_id, &exchange).await {
                        warn!("⚠️ 保存会话 {} 的问答失败: {}", conversation_id, e);
                    }
                    None
                });
            }
            Effect::Notify(notice) => {
                if self.notices.send(notice).is_err() {
                    debug!("提示接收端已关闭");
                }
            }
        }
    }

    fn spawn<F>(&mut self, task: F)
    where
        F: Future<Output = Option<Event>> + Send + 'static,
    {
        let Some(tx) = self.task_tx.upgrade() else {
            warn!("⚠️ 事件队列已关闭，丢弃后台任务");
            return;
        };
        self.pending_tasks += 1;
        tokio::spawn(async move {
            let event = task.await;
            let _ = tx.send(Message::TaskFinished(event));
        });
    }
}

impl<S> SessionHandle<S>
where
    S: ConversationStore,
{
    /// 发送事件
    pub fn send(&self, event: Event) -> AppResult<()> {
        self.tx
            .send(Message::Event(event))
            .map_err(|_| AppError::Other("会话控制器已退出".to_string()))
    }

    /// 当前状态快照
    pub fn state(&self) -> SessionState {
        self.snapshots.borrow().clone()
    }

    /// 订阅状态变化
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.snapshots.clone()
    }

    /// 列出已保存的会话
    pub async fn list_conversations(&self) -> AppResult<Vec<ConversationSummary>> {
        self.store.list_conversations().await
    }

    /// 删除会话；删除的是当前会话时会话被重置
    pub async fn delete_conversation(&self, id: ConversationId) -> AppResult<()> {
        self.store.delete_conversation(id).await?;
        self.send(Event::ConversationDeleted(id))
    }
}

fn event_name(event: &Event) -> String {
    match event {
        Event::SubmitDocument(_) => "SubmitDocument".to_string(),
        Event::OutlineReady { .. } => "OutlineReady".to_string(),
        Event::OutlineFailed { .. } => "OutlineFailed".to_string(),
        Event::ChapterReady { chapter, .. } => format!("ChapterReady({})", chapter),
        Event::ChapterFailed { chapter, .. } => format!("ChapterFailed({})", chapter),
        Event::AnswerReady { .. } => "AnswerReady".to_string(),
        Event::ConversationLoaded { payload, .. } => format!("ConversationLoaded({})", payload.id),
        other => format!("{:?}", other),
    }
}
