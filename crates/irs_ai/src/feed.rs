use irs_core::domain::Incident;
use irs_core::error::AppError;
use irs_core::feeder::FeedSnapshot;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::embeddings::Embedder;

/// What the similarity-search indexer consumes for one resolved incident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedDocument {
    pub snapshot: FeedSnapshot,
    pub text_content: String,
    /// Lets the indexer skip re-embedding unchanged documents.
    pub content_sha256: String,
    pub embedding_model: Option<String>,
    pub embedding: Option<Vec<f32>>,
}

pub fn content_sha256(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// Build the document for a resolved or closed incident. An embedding failure leaves the
/// embedding empty; only ineligibility is an error.
pub fn build_feed_document(
    incident: &Incident,
    embedder: Option<(&dyn Embedder, &str)>,
) -> Result<FeedDocument, AppError> {
    let snapshot = FeedSnapshot::from_incident(incident)?;
    let text_content = snapshot.text_content();
    let content_sha256 = content_sha256(&text_content);

    let (embedding_model, embedding) = match embedder {
        Some((e, model)) => match e.embed(model, &text_content) {
            Ok(v) => (Some(model.to_string()), Some(v)),
            Err(err) => {
                tracing::warn!(incident_id = %incident.id, "embedding failed, feeding text only: {err}");
                (None, None)
            }
        },
        None => (None, None),
    };

    Ok(FeedDocument {
        snapshot,
        text_content,
        content_sha256,
        embedding_model,
        embedding,
    })
}
