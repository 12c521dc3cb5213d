use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::error::{CodegenError, Result};

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "llama3:8b";

/// Runtime settings shared by the `chat`, `serve` and `index` commands.
#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: Url,
    pub model: String,
    pub embed_model: String,
    pub temperature: f32,
    pub knowledge_dir: PathBuf,
    pub retrieval_k: usize,
    pub fetch_k: usize,
    pub diversity: f32,
    pub bind: SocketAddr,
    /// HTTP sessions unused for this long are dropped.
    pub session_idle: Duration,
}

impl Config {
    /// Build the configuration from process environment variables.
    ///
    /// Call `dotenv().ok()` beforehand so `.env` values are visible here.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = lookup("OLLAMA_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = parse_base_url(&base_url)?;

        let model = lookup("OLLAMA_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let embed_model = lookup("OLLAMA_EMBED_MODEL").unwrap_or_else(|| model.clone());

        let knowledge_dir = match lookup("CODEGEN_KNOWLEDGE_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => default_knowledge_dir(),
        };

        let diversity: f32 = parse_var(&lookup, "CODEGEN_DIVERSITY", 0.7)?;
        if !(0.0..=1.0).contains(&diversity) {
            return Err(CodegenError::Config(format!(
                "CODEGEN_DIVERSITY must be between 0 and 1, got {}",
                diversity
            )));
        }

        Ok(Self {
            base_url,
            model,
            embed_model,
            temperature: parse_var(&lookup, "CODEGEN_TEMPERATURE", 0.7)?,
            knowledge_dir,
            retrieval_k: parse_var(&lookup, "CODEGEN_RETRIEVAL_K", 6)?,
            fetch_k: parse_var(&lookup, "CODEGEN_FETCH_K", 20)?,
            diversity,
            bind: parse_var(&lookup, "CODEGEN_BIND", SocketAddr::from(([127, 0, 0, 1], 8000)))?,
            session_idle: Duration::from_secs(parse_var(&lookup, "CODEGEN_SESSION_IDLE_SECS", 1800)?),
        })
    }

    pub fn with_base_url(mut self, url: &str) -> Result<Self> {
        self.base_url = parse_base_url(url)?;
        Ok(self)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn index_path(&self) -> PathBuf {
        self.knowledge_dir.join("index.json")
    }
}

fn parse_base_url(raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|e| CodegenError::Config(format!("Invalid base URL {}: {}", raw, e)))
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| CodegenError::Config(format!("Invalid value for {}: {} ({})", key, raw, e))),
        None => Ok(default),
    }
}

fn default_knowledge_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("codegen-chat-cli")
}
