//! The HTTP surface: thin request parsing and routing over the indexer
//! and the query executor. Handlers share one [`App`] holding the pooled
//! engine client and the immutable configuration; each request runs on an
//! independent worker.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use indexer::{Indexer, IndexerConfig};
use queries::{Executor, ExecutorConfig};
use solr_client::SolrClient;

use crate::config::Config;

pub mod collections;
pub mod corpora;
mod error;
pub mod models;
pub mod queries_api;

pub use error::ApiError;

pub struct App {
    pub config: Config,
    pub client: SolrClient,
    pub indexer: Indexer,
    pub executor: Executor,
}

impl App {
    pub fn new(config: Config) -> anyhow::Result<App> {
        let client = SolrClient::new(
            config.engine_url.clone(),
            Duration::from_secs(config.timeout_secs),
        )?;
        let indexer = Indexer::new(
            client.clone(),
            IndexerConfig {
                registry_collection: config.registry_collection.clone(),
                engine_config: config.engine_config.clone(),
                batch_size: config.batch_size,
                payload_scale: config.payload_scale(),
                doctpc_field_type: config.doctpc_field_type.clone(),
                sim_field_type: config.sim_field_type.clone(),
                shards: 1,
                replicas: 1,
            },
        );
        let executor = Executor::new(
            client.clone(),
            ExecutorConfig {
                registry_collection: config.registry_collection.clone(),
                payload_scale: config.payload_scale(),
                denylist_fields: config.denylist_fields.clone(),
            },
        );
        Ok(App {
            config,
            client,
            indexer,
            executor,
        })
    }
}

/// Builds the service router. The catalogue routes one endpoint per
/// query; Q13 never made it into the catalogue and does not route.
pub fn build_router(app: Arc<App>) -> axum::Router {
    axum::Router::new()
        .route("/healthz", get(healthz))
        .route("/corpora/index", post(corpora::index))
        .route("/corpora/delete", post(corpora::delete))
        .route("/models/index", post(models::index))
        .route("/models/delete", post(models::delete))
        .route("/collections", get(collections::list))
        .route("/collections/create", post(collections::create))
        .route("/collections/delete", post(collections::delete))
        .route("/query", get(queries_api::raw))
        .route("/queries/q1", get(queries_api::q1))
        .route("/queries/q2", get(queries_api::q2))
        .route("/queries/q3", get(queries_api::q3))
        .route("/queries/q4", get(queries_api::q4))
        .route("/queries/q5", get(queries_api::q5))
        .route("/queries/q6", get(queries_api::q6))
        .route("/queries/q7", get(queries_api::q7))
        .route("/queries/q8", get(queries_api::q8))
        .route("/queries/q9", get(queries_api::q9))
        .route("/queries/q10", get(queries_api::q10))
        .route("/queries/q11", get(queries_api::q11))
        .route("/queries/q12", get(queries_api::q12))
        .route("/queries/q14", get(queries_api::q14))
        .route("/queries/q15", get(queries_api::q15))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::cors::CorsLayer::permissive())
        .with_state(app)
}

async fn healthz() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({"status": "ok"}))
}
