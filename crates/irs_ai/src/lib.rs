pub mod embeddings;
pub mod feed;
pub mod llm;
pub mod ollama;
pub mod report;
