pub mod conversation_store;
pub mod gateway;
pub mod llm_gateway;
pub mod llm_service;
pub mod prompts;

pub use conversation_store::{ConversationStore, FileConversationStore, MemoryConversationStore};
pub use gateway::{
    validate_answer, validate_chapter_text, validate_outline, AnswerJob, ChapterJob,
    GenerationGateway,
};
pub use llm_gateway::LlmGateway;
pub use llm_service::LlmService;
