//! Executes catalogue queries: validates preconditions against the
//! registry, resolves pagination, runs the engine request, post-processes
//! scores and optionally persists the returned documents.

use std::path::Path;

use indexer::{Registry, RegistryRecord};
use serde_json::{Map, Value};
use solr_client::{SelectParams, SolrClient, SolrResponse};

use crate::Catalogue;

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error(transparent)]
    Transport(#[from] solr_client::Error),

    #[error("engine rejected {operation} with status {status}: {message}")]
    Engine {
        operation: String,
        status: u16,
        message: String,
    },

    #[error("failed to persist results to {path}: {source}")]
    Persist {
        path: String,
        source: std::io::Error,
    },
}

impl From<indexer::IndexError> for QueryError {
    fn from(err: indexer::IndexError) -> Self {
        match err {
            indexer::IndexError::Transport(e) => QueryError::Transport(e),
            indexer::IndexError::NotFound(msg) => QueryError::NotFound(msg),
            indexer::IndexError::Engine {
                operation,
                status,
                message,
            } => QueryError::Engine {
                operation,
                status,
                message,
            },
            other => QueryError::Engine {
                operation: "registry access".to_string(),
                status: 500,
                message: other.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct QueryResult {
    pub num_found: u64,
    pub docs: Vec<Map<String, Value>>,
}

impl QueryResult {
    fn from_response(resp: SolrResponse) -> Self {
        QueryResult {
            num_found: resp.num_found,
            docs: resp.docs,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub registry_collection: String,
    pub payload_scale: u64,
    pub denylist_fields: Vec<String>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        ExecutorConfig {
            registry_collection: "Corpora".to_string(),
            payload_scale: 1000,
            denylist_fields: Vec::new(),
        }
    }
}

/// Query executor. Shares the engine client with the rest of the process;
/// the catalogue is immutable. Queries are independent of one another and
/// safe to run concurrently.
pub struct Executor {
    client: SolrClient,
    catalogue: Catalogue,
    config: ExecutorConfig,
}

impl Executor {
    pub fn new(client: SolrClient, config: ExecutorConfig) -> Self {
        Executor {
            client,
            catalogue: Catalogue,
            config,
        }
    }

    // ---- preconditions ----

    fn registry(&self) -> Registry<'_> {
        Registry::new(&self.client, &self.config.registry_collection)
    }

    /// The collection must be a registered corpus.
    async fn corpus_record(&self, corpus: &str) -> Result<RegistryRecord, QueryError> {
        self.registry()
            .lookup(corpus)
            .await?
            .ok_or_else(|| QueryError::NotFound(format!("collection '{corpus}' is not a corpus")))
    }

    /// The corpus must carry the model's doc-topic field.
    async fn corpus_with_model(
        &self,
        corpus: &str,
        model: &str,
    ) -> Result<RegistryRecord, QueryError> {
        let record = self.corpus_record(corpus).await?;
        let field = format!("doctpc_{model}");
        if !record.fields.iter().any(|f| f == &field) {
            return Err(QueryError::NotFound(format!(
                "model '{model}' is not indexed in corpus '{corpus}'"
            )));
        }
        Ok(record)
    }

    /// The collection must be a model listed in some registry record.
    async fn require_model(&self, model: &str) -> Result<(), QueryError> {
        let params = SelectParams {
            q: format!("models:{model}"),
            fl: Some("id".to_string()),
            rows: Some("1".to_string()),
            ..Default::default()
        };
        let resp = self
            .run("registry model check", &self.config.registry_collection, &params)
            .await?;
        if resp.docs.is_empty() {
            return Err(QueryError::NotFound(format!(
                "collection '{model}' is not a model"
            )));
        }
        Ok(())
    }

    async fn require_collection(&self, name: &str) -> Result<(), QueryError> {
        let listing = self.client.list_collections().await?;
        ensure_ok("list collections", &listing)?;
        let found = listing
            .docs
            .iter()
            .any(|d| d.get("name").and_then(Value::as_str) == Some(name));
        if !found {
            return Err(QueryError::NotFound(format!(
                "collection '{name}' does not exist"
            )));
        }
        Ok(())
    }

    // ---- pagination and post-processing ----

    async fn count(&self, collection: &str) -> Result<u64, QueryError> {
        let resp = self
            .run("document count", collection, &self.catalogue.q3())
            .await?;
        Ok(resp.num_found)
    }

    /// `start` defaults to 0; an absent `rows` means "all documents" and
    /// is resolved with a count pre-query against the target collection.
    async fn paging(
        &self,
        collection: &str,
        start: Option<&str>,
        rows: Option<&str>,
    ) -> Result<(String, String), QueryError> {
        let start = start.unwrap_or("0").to_string();
        let rows = match rows {
            Some(r) => r.to_string(),
            None => self.count(collection).await?.to_string(),
        };
        Ok((start, rows))
    }

    async fn run(
        &self,
        operation: &str,
        collection: &str,
        params: &SelectParams,
    ) -> Result<SolrResponse, QueryError> {
        tracing::debug!(collection, q = %params.q, operation, "executing select");
        let resp = self.client.select(collection, params).await?;
        ensure_ok(operation, &resp)?;
        Ok(resp)
    }

    // ---- the catalogue, executed ----

    /// Q1: doc-topic distribution of one document.
    pub async fn doc_topics(
        &self,
        corpus: &str,
        model: &str,
        doc_id: &str,
    ) -> Result<QueryResult, QueryError> {
        self.corpus_with_model(corpus, model).await?;
        let resp = self
            .run("doc-topic lookup", corpus, &self.catalogue.q1(doc_id, model))
            .await?;
        Ok(QueryResult::from_response(resp))
    }

    /// Q2: metadata field names of a corpus, with payload fields and the
    /// configured denylist removed.
    pub async fn metadata_fields(&self, corpus: &str) -> Result<Vec<String>, QueryError> {
        let record = self.corpus_record(corpus).await?;
        Ok(filter_metadata_fields(
            record.fields,
            &self.config.denylist_fields,
        ))
    }

    /// Q3: document count of any existing collection.
    pub async fn doc_count(&self, collection: &str) -> Result<u64, QueryError> {
        self.require_collection(collection).await?;
        self.count(collection).await
    }

    /// Q4: documents with a weight of at least `threshold` on a topic.
    pub async fn docs_with_topic_above(
        &self,
        corpus: &str,
        model: &str,
        topic: u32,
        threshold: u64,
        start: Option<&str>,
        rows: Option<&str>,
    ) -> Result<QueryResult, QueryError> {
        self.corpus_with_model(corpus, model).await?;
        let (start, rows) = self.paging(corpus, start, rows).await?;
        let params = self.catalogue.q4(
            model,
            &threshold.to_string(),
            &topic.to_string(),
            &start,
            &rows,
        );
        let resp = self.run("topic threshold scan", corpus, &params).await?;
        Ok(QueryResult::from_response(resp))
    }

    /// Q5: documents most similar to a document, by doc-topic vector.
    pub async fn similar_to_doc(
        &self,
        corpus: &str,
        model: &str,
        doc_id: &str,
        start: Option<&str>,
        rows: Option<&str>,
    ) -> Result<QueryResult, QueryError> {
        let thetas = self.payload_of(corpus, model, doc_id).await?;
        self.vector_scored(corpus, model, &thetas, start, rows).await
    }

    /// Q6: metadata of one document.
    pub async fn doc_metadata(
        &self,
        corpus: &str,
        doc_id: &str,
    ) -> Result<QueryResult, QueryError> {
        let fields = self.metadata_fields(corpus).await?;
        let fl = fields.join(",");
        let resp = self
            .run("metadata lookup", corpus, &self.catalogue.q6(doc_id, &fl))
            .await?;
        Ok(QueryResult::from_response(resp))
    }

    /// Q7: ids of documents whose title contains a string.
    pub async fn docs_with_title(
        &self,
        corpus: &str,
        needle: &str,
        start: Option<&str>,
        rows: Option<&str>,
    ) -> Result<QueryResult, QueryError> {
        self.corpus_record(corpus).await?;
        let (start, rows) = self.paging(corpus, start, rows).await?;
        let params = self.catalogue.q7("title", needle, &start, &rows);
        let resp = self.run("title search", corpus, &params).await?;
        Ok(QueryResult::from_response(resp))
    }

    /// Q8: topic labels of a model.
    pub async fn topic_labels(
        &self,
        model: &str,
        start: Option<&str>,
        rows: Option<&str>,
    ) -> Result<QueryResult, QueryError> {
        self.require_model(model).await?;
        let (start, rows) = self.paging(model, start, rows).await?;
        let resp = self
            .run("topic labels", model, &self.catalogue.q8(&start, &rows))
            .await?;
        Ok(QueryResult::from_response(resp))
    }

    /// Q9: top documents of a topic.
    pub async fn topic_top_docs(
        &self,
        corpus: &str,
        model: &str,
        topic: u32,
        start: Option<&str>,
        rows: Option<&str>,
    ) -> Result<QueryResult, QueryError> {
        self.corpus_with_model(corpus, model).await?;
        let (start, rows) = self.paging(corpus, start, rows).await?;
        let params = self.catalogue.q9(model, &topic.to_string(), &start, &rows);
        let resp = self.run("topic top docs", corpus, &params).await?;
        Ok(QueryResult::from_response(resp))
    }

    /// Q10: full per-topic information of a model.
    pub async fn model_info(
        &self,
        model: &str,
        start: Option<&str>,
        rows: Option<&str>,
    ) -> Result<QueryResult, QueryError> {
        self.require_model(model).await?;
        let (start, rows) = self.paging(model, start, rows).await?;
        let resp = self
            .run("model info", model, &self.catalogue.q10(&start, &rows))
            .await?;
        Ok(QueryResult::from_response(resp))
    }

    /// Q11: word distribution of one topic.
    pub async fn topic_betas(&self, model: &str, topic: u32) -> Result<QueryResult, QueryError> {
        self.require_model(model).await?;
        let resp = self
            .run(
                "topic betas lookup",
                model,
                &self.catalogue.q11(&topic.to_string()),
            )
            .await?;
        Ok(QueryResult::from_response(resp))
    }

    /// Q12: topics most correlated with one topic, by word distribution.
    pub async fn correlated_topics(
        &self,
        model: &str,
        topic: u32,
        start: Option<&str>,
        rows: Option<&str>,
    ) -> Result<QueryResult, QueryError> {
        let betas = self.topic_betas(model, topic).await?;
        let payload = extract_payload(&betas.docs, "betas").ok_or_else(|| {
            QueryError::NotFound(format!("topic t{topic} not found in model '{model}'"))
        })?;
        let (start, rows) = self.paging(model, start, rows).await?;
        let params = self.catalogue.q12(&payload, &start, &rows);
        let mut result =
            QueryResult::from_response(self.run("topic correlation", model, &params).await?);
        normalize_scores(&mut result.docs, self.config.payload_scale);
        Ok(result)
    }

    /// Q14: documents similar to free text, given its encoded payload.
    pub async fn similar_to_text(
        &self,
        corpus: &str,
        model: &str,
        text_payload: &str,
        start: Option<&str>,
        rows: Option<&str>,
    ) -> Result<QueryResult, QueryError> {
        if text_payload.trim().is_empty() {
            return Err(QueryError::MalformedInput(
                "text_payload must be a non-empty payload vector".to_string(),
            ));
        }
        self.corpus_with_model(corpus, model).await?;
        self.vector_scored(corpus, model, text_payload, start, rows)
            .await
    }

    /// Q15: lemmas of one document.
    pub async fn doc_lemmas(
        &self,
        corpus: &str,
        doc_id: &str,
    ) -> Result<QueryResult, QueryError> {
        self.corpus_record(corpus).await?;
        let resp = self
            .run("lemmas lookup", corpus, &self.catalogue.q15(doc_id))
            .await?;
        Ok(QueryResult::from_response(resp))
    }

    /// Raw `select` passthrough for the generic query endpoint.
    pub async fn raw(
        &self,
        collection: &str,
        params: &SelectParams,
    ) -> Result<QueryResult, QueryError> {
        self.require_collection(collection).await?;
        let resp = self.run("raw query", collection, params).await?;
        Ok(QueryResult::from_response(resp))
    }

    /// Writes the returned document list to `path` as a JSON array.
    pub fn persist(&self, path: &Path, result: &QueryResult) -> Result<(), QueryError> {
        let rendered = serde_json::to_vec_pretty(&result.docs).expect("documents are plain JSON");
        std::fs::write(path, rendered).map_err(|source| QueryError::Persist {
            path: path.display().to_string(),
            source,
        })
    }

    // ---- shared steps ----

    async fn payload_of(
        &self,
        corpus: &str,
        model: &str,
        doc_id: &str,
    ) -> Result<String, QueryError> {
        let result = self.doc_topics(corpus, model, doc_id).await?;
        extract_payload(&result.docs, &format!("doctpc_{model}")).ok_or_else(|| {
            QueryError::NotFound(format!("document '{doc_id}' not found in corpus '{corpus}'"))
        })
    }

    async fn vector_scored(
        &self,
        corpus: &str,
        model: &str,
        vector: &str,
        start: Option<&str>,
        rows: Option<&str>,
    ) -> Result<QueryResult, QueryError> {
        let (start, rows) = self.paging(corpus, start, rows).await?;
        let params = self.catalogue.q5(model, vector, &start, &rows);
        let mut result =
            QueryResult::from_response(self.run("vector similarity", corpus, &params).await?);
        normalize_scores(&mut result.docs, self.config.payload_scale);
        Ok(result)
    }
}

fn ensure_ok(operation: &str, resp: &SolrResponse) -> Result<(), QueryError> {
    if resp.is_ok() {
        Ok(())
    } else {
        Err(QueryError::Engine {
            operation: operation.to_string(),
            status: resp.status,
            message: resp.message.clone(),
        })
    }
}

/// Pulls a payload string out of the first returned document. Stored
/// fields may come back as plain strings or one-element arrays.
fn extract_payload(docs: &[Map<String, Value>], field: &str) -> Option<String> {
    let value = docs.first()?.get(field)?;
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => items.first().and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

/// Raw vector-product scores are dot products of two payload vectors of
/// scale S; dividing by S² and scaling by 100 yields a percentage.
fn normalize_scores(docs: &mut [Map<String, Value>], payload_scale: u64) {
    let factor = 100.0 / (payload_scale as f64 * payload_scale as f64);
    for doc in docs {
        if let Some(score) = doc.get("score").and_then(Value::as_f64) {
            doc.insert(
                "score".to_string(),
                Value::from((score * factor * 1e6).round() / 1e6),
            );
        }
    }
}

/// Q2's filtering: payload fields and denylisted names never surface as
/// corpus metadata.
fn filter_metadata_fields(fields: Vec<String>, denylist: &[String]) -> Vec<String> {
    fields
        .into_iter()
        .filter(|f| !f.starts_with("doctpc_"))
        .filter(|f| !f.starts_with("sim_"))
        .filter(|f| !denylist.contains(f))
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn scores_normalize_to_percentages() {
        let mut docs = vec![
            doc(json!({"id": "D1", "score": 1_000_000.0})),
            doc(json!({"id": "D2", "score": 250_000.0})),
            doc(json!({"id": "D3"})),
        ];
        normalize_scores(&mut docs, 1000);
        assert_eq!(docs[0]["score"], json!(100.0));
        assert_eq!(docs[1]["score"], json!(25.0));
        assert!(docs[2].get("score").is_none());
    }

    #[test]
    fn metadata_filter_drops_payload_and_denylisted_fields() {
        let fields = vec![
            "id".to_string(),
            "title".to_string(),
            "date".to_string(),
            "bow".to_string(),
            "doctpc_mallet-25".to_string(),
            "sim_mallet-25".to_string(),
        ];
        let denylist = vec!["bow".to_string()];
        assert_eq!(
            filter_metadata_fields(fields, &denylist),
            vec!["id", "title", "date"]
        );
    }

    #[test]
    fn payload_extraction_handles_both_stored_shapes() {
        let docs = vec![doc(json!({"doctpc_m": "t0|600 t1|400"}))];
        assert_eq!(
            extract_payload(&docs, "doctpc_m").as_deref(),
            Some("t0|600 t1|400")
        );

        let docs = vec![doc(json!({"doctpc_m": ["t0|600 t1|400"]}))];
        assert_eq!(
            extract_payload(&docs, "doctpc_m").as_deref(),
            Some("t0|600 t1|400")
        );

        assert_eq!(extract_payload(&[], "doctpc_m"), None);
    }

    #[tokio::test]
    async fn empty_free_text_payload_is_malformed() {
        // Validation fails before any engine request is attempted.
        let client = SolrClient::new(
            "http://localhost:8983".parse().unwrap(),
            std::time::Duration::from_secs(1),
        )
        .unwrap();
        let executor = Executor::new(client, ExecutorConfig::default());
        let err = executor
            .similar_to_text("cordis", "mallet-25", "  ", None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::MalformedInput(_)));
    }

    #[test]
    fn persist_writes_a_json_array() {
        let client = SolrClient::new(
            "http://localhost:8983".parse().unwrap(),
            std::time::Duration::from_secs(1),
        )
        .unwrap();
        let executor = Executor::new(client, ExecutorConfig::default());
        let result = QueryResult {
            num_found: 1,
            docs: vec![doc(json!({"id": "D1", "score": 100.0}))],
        };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");
        executor.persist(&path, &result).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let parsed: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed, json!([{"id": "D1", "score": 100.0}]));
    }
}
