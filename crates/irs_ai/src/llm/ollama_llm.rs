use irs_core::error::AppError;
use serde::{Deserialize, Serialize};

use super::Llm;
use crate::ollama::OllamaClient;

#[derive(Debug, Clone)]
pub struct OllamaLlm {
    client: OllamaClient,
}

impl OllamaLlm {
    pub fn new(client: OllamaClient) -> Self {
        Self { client }
    }
}

#[derive(Debug, Clone, Serialize)]
struct GenerateOptions {
    temperature: f32,
    top_p: f32,
    num_predict: u32,
}

#[derive(Debug, Clone, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Clone, Deserialize)]
struct GenerateResponse {
    response: String,
}

impl Llm for OllamaLlm {
    fn generate(&self, model: &str, prompt: &str) -> Result<String, AppError> {
        let url = format!("{}/api/generate", self.client.base_url());
        let req = GenerateRequest {
            model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: 0.3,
                top_p: 0.9,
                num_predict: 800,
            },
        };

        let resp = ureq::post(&url)
            .timeout(self.client.timeout())
            .send_json(serde_json::to_value(req).map_err(|e| {
                AppError::new("AI_GENERATION_FAILED", "Failed to encode generate request")
                    .with_details(e.to_string())
            })?);

        match resp {
            Ok(r) if r.status() == 200 => {
                let v: GenerateResponse = r.into_json().map_err(|e| {
                    AppError::new("AI_GENERATION_FAILED", "Failed to decode generate response")
                        .with_details(e.to_string())
                })?;
                let text = v.response.trim();
                if text.is_empty() {
                    return Err(AppError::new("AI_GENERATION_FAILED", "Generate response was empty"));
                }
                Ok(text.to_string())
            }
            Ok(r) => Err(
                AppError::new("AI_GENERATION_FAILED", "Generate request failed")
                    .with_details(format!("status={}", r.status())),
            ),
            Err(e) => Err(AppError::unavailable("AI_UNAVAILABLE", "Failed to call generate endpoint")
                .with_details(e.to_string())),
        }
    }
}
