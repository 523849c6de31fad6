//! Bare collection management endpoints, mostly useful for operators.

use std::sync::Arc;

use axum::extract::{Json, State};
use indexer::IndexError;
use serde_json::Value;

use super::corpora::OpResponse;
use super::{ApiError, App};

#[derive(Debug, serde::Deserialize)]
pub struct CollectionName {
    pub name: String,
}

#[derive(Debug, serde::Serialize)]
pub struct CollectionListing {
    pub collections: Vec<String>,
}

fn check(operation: &str, resp: &solr_client::SolrResponse) -> Result<(), ApiError> {
    if resp.is_ok() {
        Ok(())
    } else {
        Err(IndexError::Engine {
            operation: operation.to_string(),
            status: resp.status,
            message: resp.message.clone(),
        }
        .into())
    }
}

pub async fn list(State(app): State<Arc<App>>) -> Result<Json<CollectionListing>, ApiError> {
    let resp = app
        .client
        .list_collections()
        .await
        .map_err(IndexError::from)?;
    check("list collections", &resp)?;
    let collections = resp
        .docs
        .iter()
        .filter_map(|d| d.get("name").and_then(Value::as_str))
        .map(str::to_string)
        .collect();
    Ok(Json(CollectionListing { collections }))
}

pub async fn create(
    State(app): State<Arc<App>>,
    Json(body): Json<CollectionName>,
) -> Result<Json<OpResponse>, ApiError> {
    let resp = app
        .client
        .create_collection(&body.name, &app.config.engine_config, 1, 1)
        .await
        .map_err(IndexError::from)?;
    check("create collection", &resp)?;
    Ok(OpResponse::ok(format!("collection '{}' created", body.name)))
}

pub async fn delete(
    State(app): State<Arc<App>>,
    Json(body): Json<CollectionName>,
) -> Result<Json<OpResponse>, ApiError> {
    let resp = app
        .client
        .delete_collection(&body.name)
        .await
        .map_err(IndexError::from)?;
    check("delete collection", &resp)?;
    Ok(OpResponse::ok(format!("collection '{}' deleted", body.name)))
}
