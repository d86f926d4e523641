pub mod embeddings;
pub mod enrichment;
pub mod rerank;
