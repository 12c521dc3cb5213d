pub mod conversation_state;
pub mod extract;
pub mod instructions;
pub mod orchestrator;
pub mod responder;

pub use conversation_state::{ConversationState, Turn};
pub use extract::FileSet;
pub use orchestrator::{ContextStore, ConversationOrchestrator, GenerationResult, Responder, RetrievalSettings};
pub use responder::OllamaResponder;
