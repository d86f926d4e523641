use anyhow::{Context, Result};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::models::Chunk;
use crate::search::hybrid::SearchFilters;

/// In-memory chunk table with disk persistence.
///
/// Holds every transcript chunk along with its optional embedding and
/// semantic metadata. The embedding worker and the enrichment batcher
/// mutate chunks only through the setters here; chunk deletion is an
/// external concern and has no entry point.
pub struct ChunkStore {
    chunks: RwLock<Vec<Chunk>>,
    persist_path: PathBuf,
}

impl ChunkStore {
    pub fn open_or_create(persist_path: &Path) -> Result<Self> {
        if let Some(parent) = persist_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let chunks = if persist_path.exists() {
            let data = std::fs::read_to_string(persist_path)
                .context("Failed to read chunk store")?;
            serde_json::from_str(&data).unwrap_or_default()
        } else {
            Vec::new()
        };

        Ok(Self {
            chunks: RwLock::new(chunks),
            persist_path: persist_path.to_path_buf(),
        })
    }

    /// Insert new chunks (no embedding, no metadata yet).
    pub fn insert_chunks(&self, new_chunks: Vec<Chunk>) -> Result<()> {
        let mut chunks = self.chunks.write();
        chunks.extend(new_chunks);
        self.persist(&chunks)
    }

    pub fn get(&self, id: Uuid) -> Option<Chunk> {
        self.chunks.read().iter().find(|c| c.id == id).cloned()
    }

    /// Look up several chunks, skipping unknown ids.
    pub fn get_many(&self, ids: &[Uuid]) -> Vec<Chunk> {
        let chunks = self.chunks.read();
        ids.iter()
            .filter_map(|id| chunks.iter().find(|c| c.id == *id).cloned())
            .collect()
    }

    /// True for every id that refers to a stored chunk.
    pub fn contains_all(&self, ids: &[Uuid]) -> bool {
        let chunks = self.chunks.read();
        ids.iter().all(|id| chunks.iter().any(|c| c.id == *id))
    }

    /// Store an embedding produced by the worker. The vector must match the
    /// configured dimensionality exactly.
    pub fn set_embedding(
        &self,
        chunk_id: Uuid,
        embedding: Vec<f32>,
        expected_dim: usize,
    ) -> Result<()> {
        if embedding.len() != expected_dim {
            anyhow::bail!(
                "Embedding dimension mismatch for chunk {chunk_id}: got {}, expected {expected_dim}",
                embedding.len()
            );
        }

        let mut chunks = self.chunks.write();
        let chunk = chunks
            .iter_mut()
            .find(|c| c.id == chunk_id)
            .with_context(|| format!("Chunk {chunk_id} not found"))?;
        chunk.embedding = Some(embedding);
        self.persist(&chunks)
    }

    /// Apply enrichment output. Topics is the completion marker, so it is
    /// always written in full here, never partially.
    pub fn set_metadata(
        &self,
        chunk_id: Uuid,
        topics: Vec<String>,
        sentiment: Option<String>,
    ) -> Result<()> {
        let mut chunks = self.chunks.write();
        let chunk = chunks
            .iter_mut()
            .find(|c| c.id == chunk_id)
            .with_context(|| format!("Chunk {chunk_id} not found"))?;
        chunk.topics = Some(topics);
        chunk.sentiment = sentiment;
        self.persist(&chunks)
    }

    /// Ids of chunks still lacking semantic metadata for one user, ordered
    /// by id so repeated backfill runs make forward progress
    /// deterministically.
    pub fn unenriched_ids(&self, user_id: Uuid, limit: usize) -> Vec<Uuid> {
        let chunks = self.chunks.read();
        let mut ids: Vec<Uuid> = chunks
            .iter()
            .filter(|c| c.user_id == user_id && !c.is_enriched())
            .map(|c| c.id)
            .collect();
        ids.sort();
        ids.truncate(limit);
        ids
    }

    /// The filtered candidate set for a search call: all filters are
    /// conjunctive, absent filter = unfiltered.
    pub fn filtered(&self, filters: &SearchFilters) -> Vec<Chunk> {
        let chunks = self.chunks.read();
        chunks
            .iter()
            .filter(|c| filters.matches(c))
            .cloned()
            .collect()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.read().len()
    }

    /// Atomic write via temp file + rename.
    fn persist(&self, chunks: &[Chunk]) -> Result<()> {
        let data = serde_json::to_string(chunks)?;
        let tmp_path = self.persist_path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &data).context("Failed to write chunk store")?;
        std::fs::rename(&tmp_path, &self.persist_path)
            .context("Failed to replace chunk store")?;
        Ok(())
    }
}
