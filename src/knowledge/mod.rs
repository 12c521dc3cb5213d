//! Persisted knowledge base: chunked reference text with embeddings, searched with
//! maximal marginal relevance.

pub mod mmr;
pub mod splitter;

use std::fs;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::codegen::ContextStore;
use crate::error::{CodegenError, Result};
use crate::ollama_client::OllamaClient;
use mmr::{cosine_similarity, maximal_marginal_relevance};
use splitter::TextSplitter;

/// Turns texts into embedding vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>>;
}

pub struct OllamaEmbedder {
    client: Arc<OllamaClient>,
    model: String,
}

impl OllamaEmbedder {
    pub fn new(client: Arc<OllamaClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        self.client.embed(&self.model, inputs).await
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedChunk {
    pub text: String,
    pub source: String,
    pub embedding: Vec<f32>,
}

/// On-disk form of the knowledge base.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeIndex {
    pub created_at: String,
    pub chunks: Vec<IndexedChunk>,
}

impl KnowledgeIndex {
    /// Split and embed the file at `source_path`.
    pub async fn build(source_path: &Path, splitter: &TextSplitter, embedder: &dyn Embedder) -> Result<Self> {
        let text = fs::read_to_string(source_path)?;
        let source = source_path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| source_path.display().to_string());

        let texts = splitter.split(&text);
        info!("Split {} into {} chunks", source, texts.len());

        let embeddings = embedder.embed(&texts).await?;
        if embeddings.len() != texts.len() {
            return Err(CodegenError::Retrieval(format!(
                "embedder returned {} vectors for {} chunks",
                embeddings.len(),
                texts.len()
            )));
        }

        let chunks = texts
            .into_iter()
            .zip(embeddings)
            .map(|(text, embedding)| IndexedChunk {
                text,
                source: source.clone(),
                embedding,
            })
            .collect();

        Ok(Self {
            created_at: Utc::now().to_rfc3339(),
            chunks,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string(self)?)?;
        Ok(())
    }
}

/// Build and persist an index for `source_path` unless one already exists at `index_path`.
///
/// Returns `true` when a new index was written.
pub async fn ensure_index(
    source_path: &Path,
    index_path: &Path,
    force: bool,
    embedder: &dyn Embedder,
) -> Result<bool> {
    if index_path.exists() && !force {
        info!("Knowledge index already exists at {}, skipping", index_path.display());
        return Ok(false);
    }
    if !source_path.exists() {
        return Err(CodegenError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("source file not found: {}", source_path.display()),
        )));
    }

    let index = KnowledgeIndex::build(source_path, &TextSplitter::default(), embedder).await?;
    index.save(index_path)?;
    info!("Knowledge index with {} chunks saved to {}", index.chunks.len(), index_path.display());
    Ok(true)
}

/// [`ContextStore`] over a loaded [`KnowledgeIndex`].
pub struct KnowledgeBase {
    index: KnowledgeIndex,
    embedder: Arc<dyn Embedder>,
    fetch_k: usize,
}

impl KnowledgeBase {
    pub fn new(index: KnowledgeIndex, embedder: Arc<dyn Embedder>, fetch_k: usize) -> Self {
        Self {
            index,
            embedder,
            fetch_k,
        }
    }

    /// Load the index at `path`, or start empty when it does not exist yet.
    pub fn open(path: &Path, embedder: Arc<dyn Embedder>, fetch_k: usize) -> Result<Self> {
        let index = if path.exists() {
            KnowledgeIndex::load(path)?
        } else {
            warn!("No knowledge index at {}; answers will have no retrieved context", path.display());
            KnowledgeIndex::default()
        };
        Ok(Self::new(index, embedder, fetch_k))
    }

    pub fn len(&self) -> usize {
        self.index.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.chunks.is_empty()
    }
}

#[async_trait]
impl ContextStore for KnowledgeBase {
    async fn retrieve(&self, query: &str, k: usize, diversity: f32) -> Result<Vec<String>> {
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let query_embedding = self
            .embedder
            .embed(&[query.to_string()])
            .await
            .map_err(|e| CodegenError::Retrieval(e.to_string()))?
            .into_iter()
            .next()
            .ok_or_else(|| CodegenError::Retrieval("no embedding returned for query".to_string()))?;

        let mut ranked: Vec<(usize, f32)> = self
            .index
            .chunks
            .iter()
            .enumerate()
            .map(|(idx, chunk)| (idx, cosine_similarity(&query_embedding, &chunk.embedding)))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked.truncate(self.fetch_k.max(k));

        let candidates: Vec<&[f32]> = ranked
            .iter()
            .map(|(idx, _)| self.index.chunks[*idx].embedding.as_slice())
            .collect();
        let picked = maximal_marginal_relevance(&query_embedding, &candidates, k, diversity);
        debug!("MMR picked {} of {} candidates", picked.len(), candidates.len());

        Ok(picked
            .into_iter()
            .map(|i| self.index.chunks[ranked[i].0].text.clone())
            .collect())
    }
}
