//! # Chapter Tutor
//!
//! 把一份长文档按需讲解成一章一章的学习内容，并支持随时提问。
//!
//! ## 架构设计
//!
//! 本系统采用四层架构：
//!
//! ### ① 数据层（Models）
//! - `models/` - 文档、目录、章节缓存、问答记录、会话记录
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，不关心调度
//! - `GenerationGateway` / `LlmGateway` - 生成目录、章节、回答
//! - `ConversationStore` - 保存和加载会话
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 纯函数，不发请求
//! - `SessionState::reduce` - 状态机：(状态, 事件) → 副作用
//! - `Scheduler` - 每次结算后决定是否后台预取下一章
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/` - 串行事件循环，执行副作用，发布状态快照
//!
//! ## 模块结构

pub mod config;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult};
pub use orchestrator::{Orchestrator, SessionHandle};
pub use services::{
    ConversationStore, FileConversationStore, GenerationGateway, LlmGateway, LlmService,
    MemoryConversationStore,
};
pub use workflow::{Event, Notice, SessionState, SessionStatus};
