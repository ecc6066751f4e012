//! 流程层
//!
//! - `session_state` - 会话状态
//! - `event` - 事件与副作用
//! - `reducer` - 状态机
//! - `scheduler` - 后台预取调度

pub mod event;
pub mod reducer;
pub mod scheduler;
pub mod session_state;

pub use event::{Effect, Event, FailureKind, Notice, Rejection, RequestRole};
pub use scheduler::{PrefetchCursor, Scheduler, Settlement};
pub use session_state::{ContextLimits, SessionState, SessionStatus};
