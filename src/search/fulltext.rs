use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::Path;
use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::*;
use tantivy::{doc, Index, IndexWriter, ReloadPolicy, TantivyDocument};
use uuid::Uuid;

use crate::models::Chunk;

/// Full-text search index over chunk text, built on tantivy.
pub struct FullTextIndex {
    index: Index,
    #[allow(dead_code)]
    schema: Schema,
    // Field handles
    f_chunk_id: Field,
    f_user_id: Field,
    f_text: Field,
}

impl FullTextIndex {
    /// Create or open the index at the given directory.
    pub fn open_or_create(index_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(index_dir)?;

        let mut schema_builder = Schema::builder();
        let f_chunk_id = schema_builder.add_text_field("chunk_id", STRING | STORED);
        let f_user_id = schema_builder.add_text_field("user_id", STRING | STORED);
        let f_text = schema_builder.add_text_field("text", TEXT);

        let schema = schema_builder.build();

        let index = if index_dir.join("meta.json").exists() {
            Index::open_in_dir(index_dir).context("Failed to open existing tantivy index")?
        } else {
            Index::create_in_dir(index_dir, schema.clone())
                .context("Failed to create tantivy index")?
        };

        Ok(Self {
            index,
            schema,
            f_chunk_id,
            f_user_id,
            f_text,
        })
    }

    /// Index a batch of chunks.
    pub fn index_chunks(&self, chunks: &[Chunk]) -> Result<()> {
        let mut writer: IndexWriter = self
            .index
            .writer(50_000_000)
            .context("Failed to create index writer")?;

        for chunk in chunks {
            writer.add_document(doc!(
                self.f_chunk_id => chunk.id.to_string(),
                self.f_user_id => chunk.user_id.to_string(),
                self.f_text => chunk.text.clone(),
            ))?;
        }

        writer.commit().context("Failed to commit index")?;
        Ok(())
    }

    /// Search and return `(chunk_id, score)` pairs ordered by full-text
    /// relevance, restricted to the already-filtered candidate set.
    pub fn search(
        &self,
        query_str: &str,
        limit: usize,
        candidate_ids: &HashSet<Uuid>,
    ) -> Result<Vec<(Uuid, f32)>> {
        let reader = self
            .index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()
            .context("Failed to create reader")?;

        let searcher = reader.searcher();

        let query_parser = QueryParser::for_index(&self.index, vec![self.f_text]);
        // parse_query_lenient: transcript queries are free text and may
        // contain characters the query grammar reserves.
        let (query, _errors) = query_parser.parse_query_lenient(query_str);

        // Fetch extra so post-filtering by candidate set still fills `limit`.
        let top_docs = searcher
            .search(&query, &TopDocs::with_limit((limit * 4).max(limit)))
            .context("Search failed")?;

        let mut hits = Vec::new();

        for (score, doc_address) in top_docs {
            let doc: TantivyDocument = searcher
                .doc(doc_address)
                .context("Failed to retrieve document")?;

            let chunk_id_str = doc
                .get_first(self.f_chunk_id)
                .and_then(|v| v.as_str())
                .unwrap_or_default();

            let chunk_id = match Uuid::parse_str(chunk_id_str) {
                Ok(id) => id,
                Err(_) => continue,
            };

            if !candidate_ids.contains(&chunk_id) {
                continue;
            }

            hits.push((chunk_id, score));

            if hits.len() >= limit {
                break;
            }
        }

        Ok(hits)
    }
}
