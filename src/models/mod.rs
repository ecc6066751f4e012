pub mod chapter_cache;
pub mod conversation;
pub mod document;
pub mod outline;
pub mod qa;

pub use chapter_cache::ChapterCache;
pub use conversation::{ConversationId, ConversationPayload, ConversationRecord, ConversationSummary};
pub use document::Document;
pub use outline::{OutlineEntry, OutlineStore};
pub use qa::{QaExchange, QaLog};
