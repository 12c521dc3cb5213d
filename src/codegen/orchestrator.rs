use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::codegen::{ConversationState, Turn};
use crate::codegen::extract::{FileExtractor, FileSet};
use crate::codegen::instructions::SYSTEM_INSTRUCTIONS;
use crate::error::{CodegenError, Result};

/// Source of reference passages for a query, most relevant first.
#[async_trait]
pub trait ContextStore: Send + Sync {
    async fn retrieve(&self, query: &str, k: usize, diversity: f32) -> Result<Vec<String>>;
}

/// The language model behind the assistant.
#[async_trait]
pub trait Responder: Send + Sync {
    /// Rewrite `question` so it can be understood without `history`.
    async fn reformulate(&self, question: &str, history: &[Turn]) -> Result<String>;

    async fn answer(
        &self,
        system_instructions: &str,
        context: &[String],
        history: &[Turn],
        question: &str,
    ) -> Result<String>;
}

/// Outcome of one request/response cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub message: String,
    pub files: FileSet,
}

impl GenerationResult {
    pub fn failure(err: &CodegenError) -> Self {
        Self {
            message: format!("Error: {}", err),
            files: FileSet::new(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetrievalSettings {
    pub k: usize,
    /// MMR lambda; 1.0 ranks purely by relevance.
    pub diversity: f32,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self { k: 6, diversity: 0.7 }
    }
}

pub struct ConversationOrchestrator {
    context_store: Arc<dyn ContextStore>,
    responder: Arc<dyn Responder>,
    extractor: FileExtractor,
    retrieval: RetrievalSettings,
}

impl ConversationOrchestrator {
    pub fn new(
        context_store: Arc<dyn ContextStore>,
        responder: Arc<dyn Responder>,
        retrieval: RetrievalSettings,
    ) -> Result<Self> {
        Ok(Self {
            context_store,
            responder,
            extractor: FileExtractor::standard()?,
            retrieval,
        })
    }

    /// Run one cycle against `state`.
    ///
    /// Only an empty prompt is returned as an error. Failures after the user turn has been
    /// recorded come back as an error-shaped result with no files, and the user turn stays
    /// in the history.
    pub async fn handle_turn(
        &self,
        prompt: &str,
        state: &mut ConversationState,
    ) -> Result<GenerationResult> {
        if prompt.trim().is_empty() {
            return Err(CodegenError::InvalidInput("prompt must not be empty".to_string()));
        }

        debug!("Received prompt: {}", prompt);
        state.append_user(prompt)?;

        match self.run_cycle(prompt, state).await {
            Ok(result) => Ok(result),
            Err(e) => {
                error!("Generation cycle failed: {}", e);
                Ok(GenerationResult::failure(&e))
            }
        }
    }

    async fn run_cycle(
        &self,
        prompt: &str,
        state: &mut ConversationState,
    ) -> Result<GenerationResult> {
        let question = self.responder.reformulate(prompt, state.history()).await?;
        debug!("Standalone question: {}", question);

        let passages = self
            .context_store
            .retrieve(&question, self.retrieval.k, self.retrieval.diversity)
            .await?;
        debug!("Retrieved {} passages", passages.len());

        let answer = self
            .responder
            .answer(SYSTEM_INSTRUCTIONS, &passages, state.history(), prompt)
            .await?;

        state.append_assistant(&answer)?;

        let files = self.extractor.extract(&answer);
        info!(
            "Extracted {} files: {:?}",
            files.len(),
            files.keys().collect::<Vec<_>>()
        );

        Ok(GenerationResult {
            message: answer,
            files,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::codegen::conversation_state::Role;

    struct StaticStore {
        passages: Vec<String>,
        queries: Mutex<Vec<String>>,
    }

    impl StaticStore {
        fn new(passages: &[&str]) -> Self {
            Self {
                passages: passages.iter().map(|p| p.to_string()).collect(),
                queries: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ContextStore for StaticStore {
        async fn retrieve(&self, query: &str, k: usize, _diversity: f32) -> Result<Vec<String>> {
            self.queries.lock().unwrap().push(query.to_string());
            Ok(self.passages.iter().take(k).cloned().collect())
        }
    }

    struct UnavailableStore;

    #[async_trait]
    impl ContextStore for UnavailableStore {
        async fn retrieve(&self, _query: &str, _k: usize, _diversity: f32) -> Result<Vec<String>> {
            Err(CodegenError::Retrieval("index offline".to_string()))
        }
    }

    /// Replies with scripted answers and records what it was asked.
    struct ScriptedResponder {
        answers: Mutex<Vec<String>>,
        seen_context: Mutex<Vec<Vec<String>>>,
        seen_history_len: Mutex<Vec<usize>>,
    }

    impl ScriptedResponder {
        fn new(answers: &[&str]) -> Self {
            Self {
                answers: Mutex::new(answers.iter().rev().map(|a| a.to_string()).collect()),
                seen_context: Mutex::new(Vec::new()),
                seen_history_len: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Responder for ScriptedResponder {
        async fn reformulate(&self, question: &str, history: &[Turn]) -> Result<String> {
            Ok(format!("{} (after {} turns)", question, history.len()))
        }

        async fn answer(
            &self,
            _system_instructions: &str,
            context: &[String],
            history: &[Turn],
            _question: &str,
        ) -> Result<String> {
            self.seen_context.lock().unwrap().push(context.to_vec());
            self.seen_history_len.lock().unwrap().push(history.len());
            self.answers
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| CodegenError::Responder("script exhausted".to_string()))
        }
    }

    struct FailingResponder;

    #[async_trait]
    impl Responder for FailingResponder {
        async fn reformulate(&self, question: &str, _history: &[Turn]) -> Result<String> {
            Ok(question.to_string())
        }

        async fn answer(
            &self,
            _system_instructions: &str,
            _context: &[String],
            _history: &[Turn],
            _question: &str,
        ) -> Result<String> {
            Err(CodegenError::Responder("model timed out".to_string()))
        }
    }

    struct UnreachableResponder;

    #[async_trait]
    impl Responder for UnreachableResponder {
        async fn reformulate(&self, _question: &str, _history: &[Turn]) -> Result<String> {
            Err(CodegenError::Responder("connection refused".to_string()))
        }

        async fn answer(
            &self,
            _system_instructions: &str,
            _context: &[String],
            _history: &[Turn],
            _question: &str,
        ) -> Result<String> {
            Ok("unused".to_string())
        }
    }

    fn orchestrator(
        store: Arc<dyn ContextStore>,
        responder: Arc<dyn Responder>,
    ) -> ConversationOrchestrator {
        ConversationOrchestrator::new(store, responder, RetrievalSettings::default()).unwrap()
    }

    #[tokio::test]
    async fn returns_message_and_extracted_files() {
        let responder = Arc::new(ScriptedResponder::new(&[
            "Here:\n```javascript:title=src/App.js\nconst x=1;\n```",
        ]));
        let orchestrator = orchestrator(Arc::new(StaticStore::new(&["doc"])), responder);
        let mut state = ConversationState::new();

        let result = orchestrator.handle_turn("make an app", &mut state).await.unwrap();

        assert_eq!(result.message, "Here:\n```javascript:title=src/App.js\nconst x=1;\n```");
        assert_eq!(result.files.len(), 1);
        assert_eq!(result.files["src/App.js"], "const x=1;");
    }

    #[tokio::test]
    async fn prose_answer_has_no_files() {
        let responder = Arc::new(ScriptedResponder::new(&["Sure, here's a plan."]));
        let orchestrator = orchestrator(Arc::new(StaticStore::new(&[])), responder);
        let mut state = ConversationState::new();

        let result = orchestrator.handle_turn("plan it", &mut state).await.unwrap();
        assert_eq!(result.message, "Sure, here's a plan.");
        assert!(result.files.is_empty());
    }

    #[tokio::test]
    async fn empty_prompt_is_rejected_before_any_mutation() {
        let responder = Arc::new(ScriptedResponder::new(&["unused"]));
        let orchestrator = orchestrator(Arc::new(StaticStore::new(&[])), responder.clone());
        let mut state = ConversationState::new();

        for prompt in ["", "   \n"] {
            let err = orchestrator.handle_turn(prompt, &mut state).await.unwrap_err();
            assert!(matches!(err, CodegenError::InvalidInput(_)));
        }
        assert_eq!(state.len(), 1);
        assert!(responder.seen_context.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn history_grows_by_two_per_cycle() {
        let responder = Arc::new(ScriptedResponder::new(&["one", "two", "three"]));
        let orchestrator = orchestrator(Arc::new(StaticStore::new(&["doc"])), responder.clone());
        let mut state = ConversationState::new();

        for prompt in ["a", "b", "c"] {
            orchestrator.handle_turn(prompt, &mut state).await.unwrap();
        }

        assert_eq!(state.len(), 1 + 2 * 3);
        let last = &state.history()[6];
        assert_eq!(last.role(), Role::Assistant);
        assert_eq!(last.text(), "three");
        // The responder sees the current user turn already recorded.
        assert_eq!(*responder.seen_history_len.lock().unwrap(), vec![2, 4, 6]);
    }

    #[tokio::test]
    async fn retrieval_uses_reformulated_question_and_settings() {
        let store = Arc::new(StaticStore::new(&["p1", "p2", "p3"]));
        let responder = Arc::new(ScriptedResponder::new(&["ok"]));
        let orchestrator = ConversationOrchestrator::new(
            store.clone(),
            responder.clone(),
            RetrievalSettings { k: 2, diversity: 0.5 },
        )
        .unwrap();
        let mut state = ConversationState::new();

        orchestrator.handle_turn("make it blue", &mut state).await.unwrap();

        assert_eq!(*store.queries.lock().unwrap(), vec!["make it blue (after 2 turns)"]);
        assert_eq!(
            *responder.seen_context.lock().unwrap(),
            vec![vec!["p1".to_string(), "p2".to_string()]]
        );
    }

    #[tokio::test]
    async fn responder_failure_is_contained() {
        let orchestrator = orchestrator(Arc::new(StaticStore::new(&["doc"])), Arc::new(FailingResponder));
        let mut state = ConversationState::new();

        let result = orchestrator.handle_turn("build a form", &mut state).await.unwrap();

        assert!(result.message.starts_with("Error:"));
        assert!(result.message.contains("model timed out"));
        assert!(result.files.is_empty());
        assert_eq!(state.len(), 2);
        assert_eq!(state.history()[1].role(), Role::User);
        assert_eq!(state.history()[1].text(), "build a form");
    }

    #[tokio::test]
    async fn reformulation_failure_is_contained() {
        let orchestrator = orchestrator(Arc::new(StaticStore::new(&["doc"])), Arc::new(UnreachableResponder));
        let mut state = ConversationState::new();

        let result = orchestrator.handle_turn("add a footer", &mut state).await.unwrap();

        assert!(result.message.starts_with("Error:"));
        assert!(result.message.contains("connection refused"));
        assert!(result.files.is_empty());
        assert_eq!(state.len(), 2);
        assert_eq!(state.history()[1].role(), Role::User);
        assert_eq!(state.history()[1].text(), "add a footer");
    }

    #[tokio::test]
    async fn retrieval_failure_is_contained_and_retry_succeeds() {
        let failing = orchestrator(
            Arc::new(UnavailableStore),
            Arc::new(ScriptedResponder::new(&["never"])),
        );
        let mut state = ConversationState::new();

        let result = failing.handle_turn("hello", &mut state).await.unwrap();
        assert!(result.message.contains("index offline"));
        assert!(result.files.is_empty());

        let working = orchestrator(
            Arc::new(StaticStore::new(&[])),
            Arc::new(ScriptedResponder::new(&["hi again"])),
        );
        let result = working.handle_turn("hello", &mut state).await.unwrap();
        assert_eq!(result.message, "hi again");

        let roles: Vec<Role> = state.history().iter().map(Turn::role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::User, Role::Assistant]);
    }

    #[test]
    fn generation_result_serializes_to_message_and_files() {
        let mut files = FileSet::new();
        files.insert("a.js".to_string(), "1".to_string());
        let json = serde_json::to_value(GenerationResult {
            message: "m".to_string(),
            files,
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"message": "m", "files": {"a.js": "1"}}));
    }
}
