//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 持有会话状态，驱动状态机和调度器，执行它们产生的副作用。
//!
//! ## 层次关系
//!
//! ```text
//! session_controller (串行事件循环)
//!     ↓
//! workflow (状态机 + 预取调度，纯函数)
//!     ↓
//! services (能力层：生成网关 / 会话存储)
//! ```

pub mod session_controller;

pub use session_controller::{Orchestrator, SessionHandle};
