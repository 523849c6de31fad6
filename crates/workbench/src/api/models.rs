//! Model ingestion endpoints.

use std::path::Path;
use std::sync::Arc;

use axum::extract::{Json, State};
use indexer::IndexOutcome;

use super::corpora::{stem_of, OpResponse};
use super::{ApiError, App};

#[derive(Debug, serde::Deserialize)]
pub struct ModelPath {
    pub model_path: String,
}

pub async fn index(
    State(app): State<Arc<App>>,
    Json(body): Json<ModelPath>,
) -> Result<Json<OpResponse>, ApiError> {
    let path = Path::new(&body.model_path);
    let stem = stem_of(path, "model_path")?;

    let message = match app.indexer.index_model(path).await? {
        IndexOutcome::Indexed => format!("model '{}' indexed", stem.to_lowercase()),
        IndexOutcome::AlreadyExists => {
            format!("collection '{}' already exists", stem.to_lowercase())
        }
    };
    Ok(OpResponse::ok(message))
}

pub async fn delete(
    State(app): State<Arc<App>>,
    Json(body): Json<ModelPath>,
) -> Result<Json<OpResponse>, ApiError> {
    let path = Path::new(&body.model_path);
    let stem = stem_of(path, "model_path")?;
    app.indexer.delete_model(path).await?;
    Ok(OpResponse::ok(format!(
        "model '{}' deleted",
        stem.to_lowercase()
    )))
}
