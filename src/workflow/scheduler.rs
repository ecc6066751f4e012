//! 调度器 / 预取控制
//!
//! 职责：
//! - 每次状态机处理完事件后，检查新状态，决定是否发起后台预取
//! - 保证同一时刻最多一个前台请求、最多一个后台预取
//! - 同一章节不会同时有两个请求在路上（前台请求会接管已在路上的预取）
//!
//! 调度器只读 `SessionState`，自己的簿记（游标、在途请求表）不属于会话状态。
//! 用法：
//!
//! ```ignore
//! let before = scheduler.observe(&event, &state);
//! let effects = state.reduce(event);
//! let effects = scheduler.settle(before, &state, effects);
//! ```

use super::event::{Effect, Event, RequestRole};
use super::session_state::{SessionState, SessionStatus};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// 预取游标
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrefetchCursor {
    /// 正在预取的章节
    pub target: Option<u32>,
    pub in_flight: bool,
}

/// 事件对调度的影响
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Intent {
    /// 用户发起的新操作，取消预取意图
    Cancel,
    /// 某个章节请求结束
    Completion { epoch: u64, chapter: u32, success: bool },
    Neutral,
}

/// 处理事件之前的快照
#[derive(Debug, Clone, Copy)]
pub struct Settlement {
    status: SessionStatus,
    current_chapter: u32,
    intent: Intent,
}

/// 调度器
#[derive(Debug, Default)]
pub struct Scheduler {
    epoch: u64,
    cursor: PrefetchCursor,
    /// 当前这一代已发出、尚未返回的章节请求
    on_wire: BTreeMap<u32, RequestRole>,
    /// 上一次预取成功，空闲时继续预取下一章
    chain: bool,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cursor(&self) -> PrefetchCursor {
        self.cursor
    }

    /// 在途请求的角色
    pub fn in_flight(&self, chapter: u32) -> Option<RequestRole> {
        self.on_wire.get(&chapter).copied()
    }

    /// 在途请求数量
    pub fn in_flight_count(&self) -> usize {
        self.on_wire.len()
    }

    /// 记录事件处理前的状态
    pub fn observe(&self, event: &Event, state: &SessionState) -> Settlement {
        Settlement {
            status: state.status,
            current_chapter: state.current_chapter,
            intent: classify(event, state),
        }
    }

    /// 根据状态机的输出更新簿记，并追加预取请求
    pub fn settle(
        &mut self,
        before: Settlement,
        state: &SessionState,
        effects: Vec<Effect>,
    ) -> Vec<Effect> {
        if state.epoch != self.epoch {
            debug!("会话代数 {} → {}，清空调度状态", self.epoch, state.epoch);
            self.epoch = state.epoch;
            self.on_wire.clear();
            self.cursor = PrefetchCursor::default();
            self.chain = false;
        }

        match before.intent {
            Intent::Cancel if !effects.iter().any(Effect::is_rejection) => self.cancel(),
            Intent::Completion {
                epoch,
                chapter,
                success,
            } if epoch == self.epoch => self.complete(chapter, success),
            _ => {}
        }

        self.demote_abandoned(state);

        let mut scheduled = Vec::with_capacity(effects.len() + 1);
        for effect in effects {
            match effect {
                Effect::GenerateChapter {
                    role: RequestRole::Foreground,
                    ref job,
                    ..
                } if self.on_wire.contains_key(&job.chapter) => {
                    info!("🔁 第 {} 章已在预取中，转为前台等待", job.chapter);
                    self.on_wire.insert(job.chapter, RequestRole::Foreground);
                    if self.cursor.target == Some(job.chapter) {
                        self.cursor = PrefetchCursor::default();
                    }
                }
                Effect::GenerateChapter { role, ref job, .. } => {
                    self.on_wire.insert(job.chapter, role);
                    scheduled.push(effect);
                }
                other => scheduled.push(other),
            }
        }

        let settled_to_idle = state.status.is_idle()
            && (!before.status.is_idle()
                || before.current_chapter != state.current_chapter
                || self.chain);
        self.chain = false;
        if settled_to_idle {
            if let Some(effect) = self.next_prefetch(state) {
                scheduled.push(effect);
            }
        }

        scheduled
    }

    fn cancel(&mut self) {
        if self.cursor != PrefetchCursor::default() {
            debug!("取消预取游标 {:?}", self.cursor);
        }
        self.cursor = PrefetchCursor::default();
        self.chain = false;
    }

    fn complete(&mut self, chapter: u32, success: bool) {
        let role = self.on_wire.remove(&chapter);
        if self.cursor.target == Some(chapter) {
            self.cursor.in_flight = false;
            if !success {
                self.cursor.target = None;
            }
        }
        self.chain = success && role == Some(RequestRole::Speculative);
    }

    /// 用户不再等待的前台请求降级为后台请求
    fn demote_abandoned(&mut self, state: &SessionState) {
        let target = state.target_chapter();
        for (chapter, role) in self.on_wire.iter_mut() {
            if *role == RequestRole::Foreground && Some(*chapter) != target {
                debug!("第 {} 章不再是前台目标，转为后台", chapter);
                *role = RequestRole::Speculative;
            }
        }
    }

    /// 预取候选：当前章节之后第一个未缓存、未在途的章节
    fn next_prefetch(&mut self, state: &SessionState) -> Option<Effect> {
        if !state.has_active_document() {
            return None;
        }
        if self.cursor.in_flight
            || self
                .on_wire
                .values()
                .any(|role| *role == RequestRole::Speculative)
        {
            debug!("已有后台请求在途，暂不预取");
            return None;
        }

        let candidate = (state.current_chapter + 1..=state.outline.last_chapter())
            .find(|n| !state.cache.contains(*n) && !self.on_wire.contains_key(n));
        let Some(chapter) = candidate else {
            debug!("后续章节已全部缓存，停止预取");
            self.cursor = PrefetchCursor::default();
            return None;
        };

        let job = state.chapter_job(chapter)?;
        info!("🔮 后台预取第 {} 章: {}", chapter, job.title);
        self.cursor = PrefetchCursor {
            target: Some(chapter),
            in_flight: true,
        };
        self.on_wire.insert(chapter, RequestRole::Speculative);
        Some(Effect::GenerateChapter {
            epoch: state.epoch,
            role: RequestRole::Speculative,
            job,
        })
    }
}

fn classify(event: &Event, state: &SessionState) -> Intent {
    let uncached = |chapter: u32| !state.cache.contains(chapter);
    let neighbour = |delta: i64| {
        u32::try_from(i64::from(state.current_chapter) + delta)
            .ok()
            .filter(|n| state.outline.contains(*n))
    };

    match event {
        Event::SubmitDocument(_)
        | Event::AskQuestion(_)
        | Event::LoadConversation(_)
        | Event::Reset => Intent::Cancel,
        Event::ConversationDeleted(id) if state.conversation_id == Some(*id) => Intent::Cancel,
        Event::RequestChapter(n) if uncached(*n) => Intent::Cancel,
        Event::NextChapter if neighbour(1).is_some_and(uncached) => Intent::Cancel,
        Event::PreviousChapter if neighbour(-1).is_some_and(uncached) => Intent::Cancel,
        Event::ChapterReady {
            epoch,
            chapter,
            text,
        } => Intent::Completion {
            epoch: *epoch,
            chapter: *chapter,
            success: !text.trim().is_empty(),
        },
        Event::ChapterFailed { epoch, chapter, .. } => Intent::Completion {
            epoch: *epoch,
            chapter: *chapter,
            success: false,
        },
        _ => Intent::Neutral,
    }
}
