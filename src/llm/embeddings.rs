//! Embedding client for the configured LLM provider.
//!
//! Texts go out in fixed-size sub-batches and come back as one vector per
//! input. Count and dimension are validated here, so callers never see a
//! vector that would violate the store's dimensionality invariant.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;

/// Upper bound on characters per embedded text. Chunks arrive at ~400
/// tokens, but re-ingested legacy transcripts can be far larger;
/// conversational English runs about 4 chars per token, so 8 000 chars
/// stays inside the 8 192-token context of the default embedding models.
const MAX_EMBED_CHARS: usize = 8_000;

/// Inputs per request to Ollama's `/api/embed`.
const OLLAMA_SUB_BATCH: usize = 32;
/// Inputs per request to an OpenAI-style `/v1/embeddings` endpoint.
const OPENAI_SUB_BATCH: usize = 64;

/// Embed a batch of texts.
///
/// The output is parallel with the input: one vector per text, each exactly
/// `config.embedding_dim` long. Anything else is an error, never a
/// silently short or misshapen result.
pub async fn embed_batch(
    client: &reqwest::Client,
    config: &LlmConfig,
    texts: &[String],
) -> Result<Vec<Vec<f32>>> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }

    let clipped: Vec<String> = texts
        .iter()
        .map(|t| clip_to_char_boundary(t, MAX_EMBED_CHARS).to_string())
        .collect();

    let sub_batch = match config.provider.as_str() {
        "ollama" => OLLAMA_SUB_BATCH,
        "openai" => OPENAI_SUB_BATCH,
        other => bail!("Unknown LLM provider: {other}"),
    };

    let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(texts.len());
    for group in clipped.chunks(sub_batch) {
        let mut group_vectors = match config.provider.as_str() {
            "ollama" => embed_ollama(client, config, group).await?,
            _ => embed_openai(client, config, group).await?,
        };
        vectors.append(&mut group_vectors);
    }

    if vectors.len() != texts.len() {
        bail!(
            "Embedding count mismatch: sent {} texts, got {} vectors",
            texts.len(),
            vectors.len()
        );
    }
    if let Some(v) = vectors.iter().find(|v| v.len() != config.embedding_dim) {
        bail!(
            "Embedding dimension mismatch: model {} returned {} dims, configured for {}",
            config.embedding_model,
            v.len(),
            config.embedding_dim
        );
    }

    Ok(vectors)
}

/// Embed one text, e.g. a search query.
pub async fn embed_single(
    client: &reqwest::Client,
    config: &LlmConfig,
    text: &str,
) -> Result<Vec<f32>> {
    embed_batch(client, config, &[text.to_string()])
        .await?
        .into_iter()
        .next()
        .context("No embedding returned")
}

/// Clip to at most `max_chars` bytes without splitting a UTF-8 char.
fn clip_to_char_boundary(text: &str, max_chars: usize) -> &str {
    if text.len() <= max_chars {
        return text;
    }
    let mut end = max_chars;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

async fn check_status(resp: reqwest::Response, provider: &str) -> Result<reqwest::Response> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    bail!("{provider} embed call returned {status}: {body}")
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    input: &'a [String],
    /// Have the server clip over-length inputs instead of failing the call.
    truncate: bool,
}

#[derive(Deserialize)]
struct OllamaResponse {
    embeddings: Vec<Vec<f32>>,
}

async fn embed_ollama(
    client: &reqwest::Client,
    config: &LlmConfig,
    texts: &[String],
) -> Result<Vec<Vec<f32>>> {
    let url = format!("{}/api/embed", config.base_url);

    let resp = client
        .post(&url)
        .json(&OllamaRequest {
            model: &config.embedding_model,
            input: texts,
            truncate: true,
        })
        .send()
        .await
        .context("Failed to reach Ollama embed endpoint")?;

    let resp = check_status(resp, "Ollama").await?;
    let body: OllamaResponse = resp
        .json()
        .await
        .context("Failed to parse Ollama embed response")?;
    Ok(body.embeddings)
}

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct OpenAiResponse {
    data: Vec<OpenAiEmbedding>,
}

#[derive(Deserialize)]
struct OpenAiEmbedding {
    embedding: Vec<f32>,
}

async fn embed_openai(
    client: &reqwest::Client,
    config: &LlmConfig,
    texts: &[String],
) -> Result<Vec<Vec<f32>>> {
    let url = format!("{}/v1/embeddings", config.base_url);

    let resp = client
        .post(&url)
        .bearer_auth(config.api_key.as_deref().unwrap_or_default())
        .json(&OpenAiRequest {
            model: &config.embedding_model,
            input: texts,
        })
        .send()
        .await
        .context("Failed to reach OpenAI embed endpoint")?;

    let resp = check_status(resp, "OpenAI").await?;
    let body: OpenAiResponse = resp
        .json()
        .await
        .context("Failed to parse OpenAI embed response")?;
    Ok(body.data.into_iter().map(|d| d.embedding).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clip_short_text_untouched() {
        assert_eq!(clip_to_char_boundary("hello", MAX_EMBED_CHARS), "hello");
    }

    #[test]
    fn test_clip_respects_char_boundaries() {
        // Multi-byte chars straddling the limit must not be split.
        let text = "é".repeat(MAX_EMBED_CHARS);
        let clipped = clip_to_char_boundary(&text, MAX_EMBED_CHARS);
        assert!(clipped.len() <= MAX_EMBED_CHARS);
        assert!(text.is_char_boundary(clipped.len()));
    }

    #[tokio::test]
    async fn test_unknown_provider_rejected_before_any_request() {
        let client = reqwest::Client::new();
        let config = LlmConfig {
            provider: "bedrock".to_string(),
            ..LlmConfig::default()
        };

        let err = embed_batch(&client, &config, &["hi".to_string()])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Unknown LLM provider"));
    }
}
