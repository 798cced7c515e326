use irs_core::error::AppError;

/// Prompt-in, text-out generation capability.
pub trait Llm {
    fn generate(&self, model: &str, prompt: &str) -> Result<String, AppError>;
}

pub mod ollama_llm;

pub use ollama_llm::OllamaLlm;
