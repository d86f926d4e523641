use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::LlmConfig;

/// Semantic metadata extracted for one chunk.
#[derive(Debug, Clone)]
pub struct ChunkEnrichment {
    pub chunk_id: Uuid,
    pub topics: Vec<String>,
    pub sentiment: Option<String>,
}

/// Extract topics and sentiment for a batch of chunks.
///
/// Each chunk is scored with its own completion call (the chat APIs have no
/// batch endpoint), bounded to 4 concurrent requests. Chunks whose call or
/// parse fails are skipped with a warning; the batch as a whole only fails
/// when nothing could be enriched.
pub async fn enrich_chunks(
    client: &reqwest::Client,
    config: &LlmConfig,
    chunks: &[(Uuid, String)],
) -> Result<Vec<ChunkEnrichment>> {
    if chunks.is_empty() {
        return Ok(Vec::new());
    }

    let semaphore = std::sync::Arc::new(tokio::sync::Semaphore::new(4));
    let mut handles = Vec::new();

    for (chunk_id, text) in chunks {
        let client = client.clone();
        let config = config.clone();
        let chunk_id = *chunk_id;
        let prompt = build_enrichment_prompt(text);
        let sem = semaphore.clone();

        let handle = tokio::spawn(async move {
            let _permit = sem.acquire().await;
            match enrich_single(&client, &config, &prompt).await {
                Ok((topics, sentiment)) => Some(ChunkEnrichment {
                    chunk_id,
                    topics,
                    sentiment,
                }),
                Err(e) => {
                    tracing::warn!("Enrichment failed for chunk {chunk_id}: {e:#}");
                    None
                }
            }
        });
        handles.push(handle);
    }

    let mut enriched = Vec::new();
    for handle in handles {
        if let Ok(Some(result)) = handle.await {
            enriched.push(result);
        }
    }

    if enriched.is_empty() {
        anyhow::bail!("Enrichment produced no results for a batch of {}", chunks.len());
    }

    Ok(enriched)
}

/// Build the extraction prompt for a single chunk.
fn build_enrichment_prompt(text: &str) -> String {
    let snippet = truncate_text(text, 2_000);
    format!(
        "Extract semantic metadata from this call transcript excerpt. \
         Answer with ONLY a JSON object: {{\"topics\": [\"...\", \"...\"], \
         \"sentiment\": \"positive\"|\"neutral\"|\"negative\"}}. \
         Topics are 1-5 short noun phrases naming what is discussed.\n\n\
         Transcript:\n{snippet}"
    )
}

fn truncate_text(text: &str, max_chars: usize) -> &str {
    if text.len() <= max_chars {
        return text;
    }
    let mut end = max_chars;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

async fn enrich_single(
    client: &reqwest::Client,
    config: &LlmConfig,
    prompt: &str,
) -> Result<(Vec<String>, Option<String>)> {
    let response = match config.provider.as_str() {
        "ollama" => call_ollama_single(client, config, prompt).await?,
        "openai" => call_openai_single(client, config, prompt).await?,
        other => anyhow::bail!("Unknown provider: {other}"),
    };

    parse_enrichment(&response)
}

fn parse_enrichment(content: &str) -> Result<(Vec<String>, Option<String>)> {
    // Try JSON parse first
    if let Ok(v) = serde_json::from_str::<EnrichmentResponse>(content) {
        return Ok(v.into_parts());
    }

    // Try to extract JSON from surrounding prose
    if let Some(start) = content.find('{') {
        if let Some(end) = content.rfind('}') {
            if let Ok(v) = serde_json::from_str::<EnrichmentResponse>(&content[start..=end]) {
                return Ok(v.into_parts());
            }
        }
    }

    anyhow::bail!("Unparseable enrichment response: {content}")
}

#[derive(Deserialize)]
struct EnrichmentResponse {
    topics: Vec<String>,
    sentiment: Option<String>,
}

impl EnrichmentResponse {
    fn into_parts(self) -> (Vec<String>, Option<String>) {
        let sentiment = self.sentiment.and_then(|s| {
            let s = s.to_lowercase();
            matches!(s.as_str(), "positive" | "neutral" | "negative").then_some(s)
        });
        (self.topics, sentiment)
    }
}

// ─── Ollama ──────────────────────────────────────────────

#[derive(Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
}

#[derive(Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: OllamaMessage,
}

async fn call_ollama_single(
    client: &reqwest::Client,
    config: &LlmConfig,
    prompt: &str,
) -> Result<String> {
    let url = format!("{}/api/chat", config.base_url);

    let req = OllamaChatRequest {
        model: config.chat_model.clone(),
        messages: vec![OllamaMessage {
            role: "user".to_string(),
            content: prompt.to_string(),
        }],
        stream: false,
    };

    let resp = client
        .post(&url)
        .json(&req)
        .send()
        .await
        .context("Failed to call Ollama for enrichment")?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        anyhow::bail!("Ollama enrichment call returned {status}: {body}");
    }

    let body: OllamaChatResponse = resp.json().await?;
    Ok(body.message.content)
}

// ─── OpenAI-compatible ───────────────────────────────────

#[derive(Serialize)]
struct OpenAiChatRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct OpenAiMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
}

#[derive(Deserialize)]
struct OpenAiResponseMessage {
    content: String,
}

async fn call_openai_single(
    client: &reqwest::Client,
    config: &LlmConfig,
    prompt: &str,
) -> Result<String> {
    let url = format!("{}/v1/chat/completions", config.base_url);
    let api_key = config.api_key.as_deref().unwrap_or_default();

    let req = OpenAiChatRequest {
        model: config.chat_model.clone(),
        messages: vec![OpenAiMessage {
            role: "user".to_string(),
            content: prompt.to_string(),
        }],
        temperature: 0.0,
        max_tokens: 200,
    };

    let resp = client
        .post(&url)
        .header("Authorization", format!("Bearer {api_key}"))
        .json(&req)
        .send()
        .await
        .context("Failed to call OpenAI for enrichment")?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        anyhow::bail!("OpenAI enrichment call returned {status}: {body}");
    }

    let body: OpenAiChatResponse = resp.json().await?;
    Ok(body
        .choices
        .first()
        .map(|c| c.message.content.clone())
        .unwrap_or_default())
}
