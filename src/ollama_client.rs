use serde_json::{json, Value};
use tracing::{debug, error};
use url::Url;

use crate::error::{CodegenError, Result};

/// One chat message as sent to Ollama.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: &'static str, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Thin HTTP client for a local Ollama server.
pub struct OllamaClient {
    base_url: Url,
    client: reqwest::Client,
}

impl OllamaClient {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }

    /// Non-streaming chat completion; returns the assistant content.
    pub async fn chat(&self, model: &str, messages: &[ChatMessage], temperature: f32) -> Result<String> {
        let request_body = chat_request_body(model, messages, temperature);
        let response_json = self.post("api/chat", &request_body).await?;
        parse_chat_response(&response_json)
    }

    /// Embed a batch of texts, one vector per input in input order.
    pub async fn embed(&self, model: &str, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let request_body = json!({
            "model": model,
            "input": inputs,
        });
        let response_json = self.post("api/embed", &request_body).await?;
        let embeddings = parse_embed_response(&response_json)?;

        if embeddings.len() != inputs.len() {
            return Err(CodegenError::Retrieval(format!(
                "expected {} embeddings, got {}",
                inputs.len(),
                embeddings.len()
            )));
        }
        Ok(embeddings)
    }

    async fn post(&self, path: &str, request_body: &Value) -> Result<Value> {
        let api_url = self
            .base_url
            .join(path)
            .map_err(|e| CodegenError::Config(format!("Invalid Ollama endpoint {}: {}", path, e)))?;

        debug!("Sending request to {}: {}", api_url, serde_json::to_string_pretty(request_body)?);

        let response = self.client.post(api_url).json(request_body).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            error!("Ollama request failed with {}: {}", status, error_text);
            return Err(CodegenError::Responder(format!("Ollama returned {}: {}", status, error_text)));
        }

        let response_json: Value = response.json().await?;
        debug!("Received response from Ollama: {}", serde_json::to_string_pretty(&response_json)?);
        Ok(response_json)
    }
}

pub fn chat_request_body(model: &str, messages: &[ChatMessage], temperature: f32) -> Value {
    let formatted_messages = messages
        .iter()
        .map(|m| json!({ "role": m.role, "content": m.content }))
        .collect::<Vec<_>>();

    json!({
        "model": model,
        "messages": formatted_messages,
        "stream": false,
        "options": {
            "temperature": temperature
        }
    })
}

pub fn parse_chat_response(response_json: &Value) -> Result<String> {
    if let Some(message) = response_json.get("error").and_then(|e| e.as_str()) {
        return Err(CodegenError::Responder(message.to_string()));
    }

    response_json
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| CodegenError::Responder("response has no message content".to_string()))
}

pub fn parse_embed_response(response_json: &Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = response_json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| CodegenError::Retrieval("response has no embeddings".to_string()))?;

    embeddings
        .iter()
        .map(|vector| {
            vector
                .as_array()
                .ok_or_else(|| CodegenError::Retrieval("embedding is not an array".to_string()))?
                .iter()
                .map(|x| {
                    x.as_f64()
                        .map(|x| x as f32)
                        .ok_or_else(|| CodegenError::Retrieval("embedding value is not a number".to_string()))
                })
                .collect()
        })
        .collect()
}
