use std::sync::Arc;

use async_trait::async_trait;

use crate::codegen::conversation_state::Role;
use crate::codegen::instructions::{context_message, REFORMULATE_INSTRUCTIONS};
use crate::codegen::{Responder, Turn};
use crate::error::Result;
use crate::ollama_client::{ChatMessage, OllamaClient};

/// [`Responder`] backed by an Ollama chat model.
pub struct OllamaResponder {
    client: Arc<OllamaClient>,
    model: String,
    temperature: f32,
}

impl OllamaResponder {
    pub fn new(client: Arc<OllamaClient>, model: impl Into<String>, temperature: f32) -> Self {
        Self {
            client,
            model: model.into(),
            temperature,
        }
    }
}

#[async_trait]
impl Responder for OllamaResponder {
    async fn reformulate(&self, question: &str, history: &[Turn]) -> Result<String> {
        let Some(messages) = reformulation_messages(question, history) else {
            return Ok(question.to_string());
        };

        let standalone = self.client.chat(&self.model, &messages, self.temperature).await?;
        let standalone = standalone.trim();
        if standalone.is_empty() {
            return Ok(question.to_string());
        }
        Ok(standalone.to_string())
    }

    async fn answer(
        &self,
        system_instructions: &str,
        context: &[String],
        history: &[Turn],
        question: &str,
    ) -> Result<String> {
        let messages = answer_messages(system_instructions, context, history, question);
        self.client.chat(&self.model, &messages, self.temperature).await
    }
}

/// Messages for the reformulation call, or `None` when there is nothing earlier to resolve
/// the question against.
fn reformulation_messages(question: &str, history: &[Turn]) -> Option<Vec<ChatMessage>> {
    if !history.iter().any(|turn| turn.role() == Role::Assistant) {
        return None;
    }

    let mut messages = vec![ChatMessage::new(Role::System.as_str(), REFORMULATE_INSTRUCTIONS)];
    messages.extend(
        history
            .iter()
            .filter(|turn| turn.role() != Role::System)
            .map(|turn| ChatMessage::new(turn.role().as_str(), turn.text())),
    );
    messages.push(ChatMessage::new(Role::User.as_str(), question));
    Some(messages)
}

fn answer_messages(
    system_instructions: &str,
    context: &[String],
    history: &[Turn],
    question: &str,
) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::new(Role::System.as_str(), system_instructions)];
    messages.extend(
        history
            .iter()
            .map(|turn| ChatMessage::new(turn.role().as_str(), turn.text())),
    );
    messages.push(ChatMessage::new(
        Role::User.as_str(),
        context_message(context, question),
    ));
    messages
}
