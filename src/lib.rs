//! # transcript-search
//!
//! A retrieval service for call transcripts: chunks are ingested, embedded
//! through a durable job queue, enriched with semantic metadata, and served
//! through a hybrid search pipeline combining full-text relevance, vector
//! similarity, cross-encoder re-ranking, and diversity filtering.
//!
//! ## Architecture
//!
//! Two write paths feed one read path:
//!
//! ```text
//!   Ingest                         Search
//!   ──────                         ──────
//!   ┌─────────────┐               ┌─────────────┐
//!   │ POST /chunks │               │  User Query  │
//!   └──────┬───────┘               └──────┬───────┘
//!          │                              │ filter to caller's data
//!          ▼                              ▼
//!   ┌─────────────┐               ┌──────────────────┐
//!   │ Chunk store  │               │  Candidate set   │
//!   │ + FTS index  │               └──┬────────────┬──┘
//!   └──────┬───────┘                  ▼            ▼
//!          │ POST /jobs        ┌───────────┐ ┌───────────┐
//!          ▼                   │ Full-text │ │  Cosine   │
//!   ┌─────────────┐            │  (tantivy)│ │ similarity│
//!   │  Job queue   │            └─────┬─────┘ └─────┬─────┘
//!   │ claim/retry/ │                  └──────┬──────┘
//!   │ lease sweep  │                         ▼
//!   └──────┬───────┘               ┌──────────────────┐
//!          ▼                       │    RRF fusion    │
//!   ┌─────────────┐               └────────┬─────────┘
//!   │  Embedding   │                        ▼
//!   │   worker     │               ┌──────────────────┐
//!   └──────────────┘               │ Re-rank (opt.)   │
//!                                  └────────┬─────────┘
//!   ┌─────────────┐                         ▼
//!   │POST /backfill│               ┌──────────────────┐
//!   │  enrichment  │               │ Diversity filter │
//!   └──────────────┘               └──────────────────┘
//! ```
//!
//! ## Module Overview
//!
//! - [`config`] - Environment-based configuration for server, LLM, queue, and backfill settings
//! - [`models`] - Shared data types: `Chunk`, `Job`, `QueueTask`, request/response types
//! - [`store`] - In-memory chunk table with atomic disk persistence
//! - [`queue`] - Durable embedding job queue: atomic claims, retry budget, lease reclaim
//! - [`worker`] - Background embedding worker driving queued tasks to completion
//! - [`backfill`] - Sequential metadata enrichment batcher with per-batch error containment
//! - [`search::fulltext`] - Full-text index powered by tantivy
//! - [`search::vector`] - Cosine similarity ranking over stored embeddings
//! - [`search::hybrid`] - Weighted Reciprocal Rank Fusion with deterministic tie-breaks
//! - [`search::diversity`] - Per-recording caps and near-duplicate suppression
//! - [`llm::embeddings`] - Batch embedding generation via Ollama or OpenAI-compatible APIs
//! - [`llm::enrichment`] - Topic and sentiment extraction for the backfill batcher
//! - [`llm::rerank`] - Cross-encoder re-ranking with RRF fallback scores
//! - [`api`] - Axum HTTP handlers for ingest, jobs, queue, search, and backfill
//! - [`state`] - Shared application state holding the store, index, queue, and config
//! - [`error`] - HTTP error taxonomy

pub mod api;
pub mod backfill;
pub mod config;
pub mod error;
pub mod llm;
pub mod models;
pub mod queue;
pub mod search;
pub mod state;
pub mod store;
pub mod worker;
