use std::time::Duration;

use irs_core::error::AppError;
use serde::{Deserialize, Serialize};

use super::Embedder;
use crate::ollama::OllamaClient;

const MAX_INPUT_CHARS: usize = 12_000;
const EMBED_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    client: OllamaClient,
}

impl OllamaEmbedder {
    pub fn new(client: OllamaClient) -> Self {
        Self { client }
    }
}

#[derive(Debug, Clone, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
struct EmbeddingsResponse {
    embedding: Vec<f32>,
}

/// First `max` characters, cut on a char boundary.
pub(crate) fn bounded(input: &str, max: usize) -> &str {
    match input.char_indices().nth(max) {
        Some((idx, _)) => &input[..idx],
        None => input,
    }
}

impl Embedder for OllamaEmbedder {
    fn embed(&self, model: &str, input: &str) -> Result<Vec<f32>, AppError> {
        let prompt = bounded(input, MAX_INPUT_CHARS);

        let url = format!("{}/api/embeddings", self.client.base_url());
        let req = EmbeddingsRequest { model, prompt };
        let resp = ureq::post(&url)
            .timeout(EMBED_TIMEOUT.min(self.client.timeout()))
            .send_json(serde_json::to_value(req).map_err(|e| {
                AppError::new("AI_EMBEDDINGS_FAILED", "Failed to encode embeddings request")
                    .with_details(e.to_string())
            })?);

        match resp {
            Ok(r) if r.status() == 200 => {
                let v: EmbeddingsResponse = r.into_json().map_err(|e| {
                    AppError::new("AI_EMBEDDINGS_FAILED", "Failed to decode embeddings response")
                        .with_details(e.to_string())
                })?;
                if v.embedding.is_empty() {
                    return Err(AppError::new(
                        "AI_EMBEDDINGS_FAILED",
                        "Embeddings response was empty",
                    ));
                }
                Ok(v.embedding)
            }
            Ok(r) => Err(
                AppError::new("AI_EMBEDDINGS_FAILED", "Embeddings request failed")
                    .with_details(format!("status={}", r.status())),
            ),
            Err(e) => Err(
                AppError::unavailable("AI_UNAVAILABLE", "Failed to call embeddings endpoint")
                    .with_details(e.to_string()),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::bounded;

    #[test]
    fn bounded_never_splits_a_character() {
        assert_eq!(bounded("ééé", 2), "éé");
        assert_eq!(bounded("abc", 10), "abc");
    }
}
