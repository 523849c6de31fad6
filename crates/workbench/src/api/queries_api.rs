//! One endpoint per catalogue query, plus the raw `select` passthrough.
//! Every endpoint accepts `results_file_path` to persist the returned
//! document list after the query completes.

use std::path::Path;
use std::sync::Arc;

use axum::extract::{Json, Query, State};
use queries::QueryResult;
use serde_json::{Map, Value};
use solr_client::SelectParams;

use super::{ApiError, App};

fn persist_if(
    app: &App,
    path: Option<&str>,
    result: &QueryResult,
) -> Result<(), ApiError> {
    if let Some(path) = path {
        app.executor.persist(Path::new(path), result)?;
    }
    Ok(())
}

fn single_doc(key: &str, value: Value) -> QueryResult {
    let mut doc = Map::new();
    doc.insert(key.to_string(), value);
    QueryResult {
        num_found: 1,
        docs: vec![doc],
    }
}

#[derive(Debug, serde::Deserialize)]
pub struct Q1Params {
    pub corpus_collection: String,
    pub model_name: String,
    pub doc_id: String,
    pub results_file_path: Option<String>,
}

pub async fn q1(
    State(app): State<Arc<App>>,
    Query(p): Query<Q1Params>,
) -> Result<Json<QueryResult>, ApiError> {
    let result = app
        .executor
        .doc_topics(&p.corpus_collection, &p.model_name, &p.doc_id)
        .await?;
    persist_if(&app, p.results_file_path.as_deref(), &result)?;
    Ok(Json(result))
}

#[derive(Debug, serde::Deserialize)]
pub struct Q2Params {
    pub corpus_collection: String,
    pub results_file_path: Option<String>,
}

pub async fn q2(
    State(app): State<Arc<App>>,
    Query(p): Query<Q2Params>,
) -> Result<Json<QueryResult>, ApiError> {
    let fields = app.executor.metadata_fields(&p.corpus_collection).await?;
    let result = single_doc("fields", Value::from(fields));
    persist_if(&app, p.results_file_path.as_deref(), &result)?;
    Ok(Json(result))
}

#[derive(Debug, serde::Deserialize)]
pub struct Q3Params {
    pub collection: String,
    pub results_file_path: Option<String>,
}

pub async fn q3(
    State(app): State<Arc<App>>,
    Query(p): Query<Q3Params>,
) -> Result<Json<QueryResult>, ApiError> {
    let ndocs = app.executor.doc_count(&p.collection).await?;
    let result = single_doc("ndocs", Value::from(ndocs));
    persist_if(&app, p.results_file_path.as_deref(), &result)?;
    Ok(Json(result))
}

#[derive(Debug, serde::Deserialize)]
pub struct Q4Params {
    pub corpus_collection: String,
    pub model_name: String,
    pub topic_id: u32,
    pub threshold: u64,
    pub start: Option<String>,
    pub rows: Option<String>,
    pub results_file_path: Option<String>,
}

pub async fn q4(
    State(app): State<Arc<App>>,
    Query(p): Query<Q4Params>,
) -> Result<Json<QueryResult>, ApiError> {
    let result = app
        .executor
        .docs_with_topic_above(
            &p.corpus_collection,
            &p.model_name,
            p.topic_id,
            p.threshold,
            p.start.as_deref(),
            p.rows.as_deref(),
        )
        .await?;
    persist_if(&app, p.results_file_path.as_deref(), &result)?;
    Ok(Json(result))
}

#[derive(Debug, serde::Deserialize)]
pub struct Q5Params {
    pub corpus_collection: String,
    pub model_name: String,
    pub doc_id: String,
    pub start: Option<String>,
    pub rows: Option<String>,
    pub results_file_path: Option<String>,
}

pub async fn q5(
    State(app): State<Arc<App>>,
    Query(p): Query<Q5Params>,
) -> Result<Json<QueryResult>, ApiError> {
    let result = app
        .executor
        .similar_to_doc(
            &p.corpus_collection,
            &p.model_name,
            &p.doc_id,
            p.start.as_deref(),
            p.rows.as_deref(),
        )
        .await?;
    persist_if(&app, p.results_file_path.as_deref(), &result)?;
    Ok(Json(result))
}

#[derive(Debug, serde::Deserialize)]
pub struct Q6Params {
    pub corpus_collection: String,
    pub doc_id: String,
    pub results_file_path: Option<String>,
}

pub async fn q6(
    State(app): State<Arc<App>>,
    Query(p): Query<Q6Params>,
) -> Result<Json<QueryResult>, ApiError> {
    let result = app
        .executor
        .doc_metadata(&p.corpus_collection, &p.doc_id)
        .await?;
    persist_if(&app, p.results_file_path.as_deref(), &result)?;
    Ok(Json(result))
}

#[derive(Debug, serde::Deserialize)]
pub struct Q7Params {
    pub corpus_collection: String,
    pub search_string: String,
    pub start: Option<String>,
    pub rows: Option<String>,
    pub results_file_path: Option<String>,
}

pub async fn q7(
    State(app): State<Arc<App>>,
    Query(p): Query<Q7Params>,
) -> Result<Json<QueryResult>, ApiError> {
    let result = app
        .executor
        .docs_with_title(
            &p.corpus_collection,
            &p.search_string,
            p.start.as_deref(),
            p.rows.as_deref(),
        )
        .await?;
    persist_if(&app, p.results_file_path.as_deref(), &result)?;
    Ok(Json(result))
}

#[derive(Debug, serde::Deserialize)]
pub struct ModelPageParams {
    pub model_collection: String,
    pub start: Option<String>,
    pub rows: Option<String>,
    pub results_file_path: Option<String>,
}

pub async fn q8(
    State(app): State<Arc<App>>,
    Query(p): Query<ModelPageParams>,
) -> Result<Json<QueryResult>, ApiError> {
    let result = app
        .executor
        .topic_labels(&p.model_collection, p.start.as_deref(), p.rows.as_deref())
        .await?;
    persist_if(&app, p.results_file_path.as_deref(), &result)?;
    Ok(Json(result))
}

#[derive(Debug, serde::Deserialize)]
pub struct Q9Params {
    pub corpus_collection: String,
    pub model_name: String,
    pub topic_id: u32,
    pub start: Option<String>,
    pub rows: Option<String>,
    pub results_file_path: Option<String>,
}

pub async fn q9(
    State(app): State<Arc<App>>,
    Query(p): Query<Q9Params>,
) -> Result<Json<QueryResult>, ApiError> {
    let result = app
        .executor
        .topic_top_docs(
            &p.corpus_collection,
            &p.model_name,
            p.topic_id,
            p.start.as_deref(),
            p.rows.as_deref(),
        )
        .await?;
    persist_if(&app, p.results_file_path.as_deref(), &result)?;
    Ok(Json(result))
}

pub async fn q10(
    State(app): State<Arc<App>>,
    Query(p): Query<ModelPageParams>,
) -> Result<Json<QueryResult>, ApiError> {
    let result = app
        .executor
        .model_info(&p.model_collection, p.start.as_deref(), p.rows.as_deref())
        .await?;
    persist_if(&app, p.results_file_path.as_deref(), &result)?;
    Ok(Json(result))
}

#[derive(Debug, serde::Deserialize)]
pub struct Q11Params {
    pub model_collection: String,
    pub topic_id: u32,
    pub results_file_path: Option<String>,
}

pub async fn q11(
    State(app): State<Arc<App>>,
    Query(p): Query<Q11Params>,
) -> Result<Json<QueryResult>, ApiError> {
    let result = app
        .executor
        .topic_betas(&p.model_collection, p.topic_id)
        .await?;
    persist_if(&app, p.results_file_path.as_deref(), &result)?;
    Ok(Json(result))
}

#[derive(Debug, serde::Deserialize)]
pub struct Q12Params {
    pub model_collection: String,
    pub topic_id: u32,
    pub start: Option<String>,
    pub rows: Option<String>,
    pub results_file_path: Option<String>,
}

pub async fn q12(
    State(app): State<Arc<App>>,
    Query(p): Query<Q12Params>,
) -> Result<Json<QueryResult>, ApiError> {
    let result = app
        .executor
        .correlated_topics(
            &p.model_collection,
            p.topic_id,
            p.start.as_deref(),
            p.rows.as_deref(),
        )
        .await?;
    persist_if(&app, p.results_file_path.as_deref(), &result)?;
    Ok(Json(result))
}

#[derive(Debug, serde::Deserialize)]
pub struct Q14Params {
    pub corpus_collection: String,
    pub model_name: String,
    /// Payload-encoded topic vector of the free text, produced by an
    /// external inference service.
    pub text_payload: String,
    pub start: Option<String>,
    pub rows: Option<String>,
    pub results_file_path: Option<String>,
}

pub async fn q14(
    State(app): State<Arc<App>>,
    Query(p): Query<Q14Params>,
) -> Result<Json<QueryResult>, ApiError> {
    let result = app
        .executor
        .similar_to_text(
            &p.corpus_collection,
            &p.model_name,
            &p.text_payload,
            p.start.as_deref(),
            p.rows.as_deref(),
        )
        .await?;
    persist_if(&app, p.results_file_path.as_deref(), &result)?;
    Ok(Json(result))
}

#[derive(Debug, serde::Deserialize)]
pub struct Q15Params {
    pub corpus_collection: String,
    pub doc_id: String,
    pub results_file_path: Option<String>,
}

pub async fn q15(
    State(app): State<Arc<App>>,
    Query(p): Query<Q15Params>,
) -> Result<Json<QueryResult>, ApiError> {
    let result = app
        .executor
        .doc_lemmas(&p.corpus_collection, &p.doc_id)
        .await?;
    persist_if(&app, p.results_file_path.as_deref(), &result)?;
    Ok(Json(result))
}

#[derive(Debug, serde::Deserialize)]
pub struct RawParams {
    pub collection: String,
    pub q: String,
    pub fq: Option<String>,
    pub fl: Option<String>,
    pub sort: Option<String>,
    pub start: Option<String>,
    pub rows: Option<String>,
    pub df: Option<String>,
    #[serde(rename = "q.op")]
    pub q_op: Option<String>,
    pub results_file_path: Option<String>,
}

pub async fn raw(
    State(app): State<Arc<App>>,
    Query(p): Query<RawParams>,
) -> Result<Json<QueryResult>, ApiError> {
    let params = SelectParams {
        q: p.q.clone(),
        fq: p.fq.clone(),
        fl: p.fl.clone(),
        sort: p.sort.clone(),
        start: p.start.clone(),
        rows: p.rows.clone(),
        df: p.df.clone(),
        q_op: p.q_op.clone(),
    };
    let result = app.executor.raw(&p.collection, &params).await?;
    persist_if(&app, p.results_file_path.as_deref(), &result)?;
    Ok(Json(result))
}
