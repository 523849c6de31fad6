//! Corpus ingestion endpoints.

use std::path::Path;
use std::sync::Arc;

use axum::extract::{Json, State};
use axum::http::StatusCode;
use indexer::IndexOutcome;

use super::{ApiError, App};

#[derive(Debug, serde::Deserialize)]
pub struct CorpusPath {
    pub corpus_path: String,
}

#[derive(Debug, serde::Serialize)]
pub struct OpResponse {
    pub status: u16,
    pub message: String,
}

impl OpResponse {
    pub fn ok(message: String) -> Json<OpResponse> {
        Json(OpResponse {
            status: 200,
            message,
        })
    }
}

pub(super) fn stem_of(path: &Path, parameter: &str) -> Result<String, ApiError> {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .ok_or_else(|| {
            ApiError::new(
                StatusCode::BAD_REQUEST,
                anyhow::anyhow!("{parameter} has no file stem"),
            )
        })
}

pub async fn index(
    State(app): State<Arc<App>>,
    Json(body): Json<CorpusPath>,
) -> Result<Json<OpResponse>, ApiError> {
    let path = Path::new(&body.corpus_path);
    let stem = stem_of(path, "corpus_path")?;
    let fields = app.config.corpus_fields(&stem)?;

    let message = match app.indexer.index_corpus(path, fields).await? {
        IndexOutcome::Indexed => format!("corpus '{}' indexed", stem.to_lowercase()),
        IndexOutcome::AlreadyExists => {
            format!("collection '{}' already exists", stem.to_lowercase())
        }
    };
    Ok(OpResponse::ok(message))
}

pub async fn delete(
    State(app): State<Arc<App>>,
    Json(body): Json<CorpusPath>,
) -> Result<Json<OpResponse>, ApiError> {
    let path = Path::new(&body.corpus_path);
    let stem = stem_of(path, "corpus_path")?;
    app.indexer.delete_corpus(path).await?;
    Ok(OpResponse::ok(format!(
        "corpus '{}' deleted",
        stem.to_lowercase()
    )))
}
