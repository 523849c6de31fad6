//! Ingestion pipeline: turns logical corpora and trained topic models into
//! engine collections, evolving schemas and keeping the registry's
//! corpus-to-model bookkeeping consistent along the way.
//!
//! Engine operations inside one ingestion call are issued strictly in
//! order; batches of one update all complete before the next step begins.
//! Concurrent ingestions of *different* corpora or models are safe.
//! Concurrent ingestions of the *same* name are not serialized here:
//! correctness relies on the create-collection 409 check and on callers
//! not racing conflicting requests against one collection.

pub mod registry;

use std::collections::HashMap;
use std::path::Path;

use loaders::{CorpusFields, DocumentStream, LogicalCorpus, TopicModel};
use serde_json::{json, Value};
use solr_client::{SelectParams, SolrClient, SolrResponse};

pub use registry::{Registry, RegistryRecord};

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Load(#[from] loaders::LoadError),

    #[error(transparent)]
    Transport(#[from] solr_client::Error),

    #[error("engine rejected {operation} with status {status}: {message}")]
    Engine {
        operation: String,
        status: u16,
        message: String,
    },

    #[error("invariant violation: {0}")]
    Invariant(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl IndexError {
    fn engine(operation: &str, resp: &SolrResponse) -> Self {
        IndexError::Engine {
            operation: operation.to_string(),
            status: resp.status,
            message: resp.message.clone(),
        }
    }
}

/// Result of an index operation that tolerates pre-existing collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOutcome {
    Indexed,
    AlreadyExists,
}

#[derive(Debug, Clone)]
pub struct IndexerConfig {
    pub registry_collection: String,
    pub engine_config: String,
    pub batch_size: usize,
    pub payload_scale: u64,
    pub doctpc_field_type: Option<String>,
    pub sim_field_type: Option<String>,
    pub shards: u32,
    pub replicas: u32,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        IndexerConfig {
            registry_collection: "Corpora".to_string(),
            engine_config: "workbench_config".to_string(),
            batch_size: 100,
            payload_scale: 1000,
            doctpc_field_type: Some("VectorField".to_string()),
            sim_field_type: Some("VectorFloatField".to_string()),
            shards: 1,
            replicas: 1,
        }
    }
}

pub struct Indexer {
    client: SolrClient,
    config: IndexerConfig,
}

impl Indexer {
    pub fn new(client: SolrClient, config: IndexerConfig) -> Self {
        Indexer { client, config }
    }

    pub fn client(&self) -> &SolrClient {
        &self.client
    }

    fn registry(&self) -> Registry<'_> {
        Registry::new(&self.client, &self.config.registry_collection)
    }

    /// Indexes a logical corpus: creates its collection, registers it, and
    /// streams its documents in batches.
    #[tracing::instrument(skip(self, fields), fields(manifest = %manifest_path.display()))]
    pub async fn index_corpus(
        &self,
        manifest_path: &Path,
        fields: CorpusFields,
    ) -> Result<IndexOutcome, IndexError> {
        let corpus = LogicalCorpus::open(manifest_path, fields)?;
        let name = corpus.name().to_string();

        let created = self.create_collection(&name).await?;
        if created.status == 409 {
            tracing::info!(collection = %name, "collection already exists, nothing to do");
            return Ok(IndexOutcome::AlreadyExists);
        }
        ensure_ok("create corpus collection", &created)?;
        tracing::info!(collection = %name, "collection created");

        let registry_created = self
            .create_collection(&self.config.registry_collection)
            .await?;
        let corpus_id = if registry_created.status == 409 {
            self.registry().highest_id().await?.map(|id| id + 1).unwrap_or(1)
        } else {
            ensure_ok("create registry collection", &registry_created)?;
            1
        };

        let mut stream = corpus.stream()?;
        let record = RegistryRecord {
            id: corpus_id,
            corpus_name: name.clone(),
            fields: stream.columns().to_vec(),
            models: Vec::new(),
        };
        self.registry().insert(&record).await?;

        self.stream_documents(&name, &mut stream).await?;
        Ok(IndexOutcome::Indexed)
    }

    /// Deletes a corpus collection, every model collection trained on it,
    /// and finally its registry record. Engine collections go first so an
    /// interrupted run leaves a state the registry can still describe.
    #[tracing::instrument(skip(self), fields(manifest = %manifest_path.display()))]
    pub async fn delete_corpus(&self, manifest_path: &Path) -> Result<(), IndexError> {
        let name = stem_lowercase(manifest_path);

        // A collection can already be gone if an earlier deletion was
        // interrupted; skip those instead of re-deleting, so the pipeline
        // stays re-runnable.
        let existing = self.collection_names().await?;
        if existing.contains(&name) {
            let deleted = self.client.delete_collection(&name).await?;
            ensure_ok("delete corpus collection", &deleted)?;
        } else {
            tracing::info!(corpus = %name, "corpus collection already absent, skipping");
        }

        let record = self
            .registry()
            .lookup(&name)
            .await?
            .ok_or_else(|| IndexError::NotFound(format!("corpus '{name}' is not registered")))?;

        for model in &record.models {
            if !existing.contains(model) {
                tracing::info!(model = %model, "model collection already absent, skipping");
                continue;
            }
            let resp = self.client.delete_collection(model).await?;
            ensure_ok("delete model collection", &resp)?;
            tracing::info!(model = %model, "model collection deleted");
        }

        self.registry().delete(record.id).await?;
        tracing::info!(corpus = %name, id = record.id, "registry record removed");
        Ok(())
    }

    /// Indexes a trained model: creates its collection, appends it to the
    /// registry record of its training corpus, evolves the corpus schema,
    /// and writes the doc-topic payloads and per-topic records.
    #[tracing::instrument(skip(self), fields(model = %model_path.display()))]
    pub async fn index_model(&self, model_path: &Path) -> Result<IndexOutcome, IndexError> {
        let model = TopicModel::open(model_path)?;
        let name = model.name().to_string();

        let created = self.create_collection(&name).await?;
        if created.status == 409 {
            tracing::info!(collection = %name, "collection already exists, nothing to do");
            return Ok(IndexOutcome::AlreadyExists);
        }
        ensure_ok("create model collection", &created)?;

        let corpus_name = model.corpus_name();
        let record = self.registry().lookup(&corpus_name).await?.ok_or_else(|| {
            IndexError::Invariant(format!(
                "model '{name}' references corpus '{corpus_name}' which is not registered"
            ))
        })?;
        if record.models.contains(&name) {
            return Err(IndexError::Invariant(format!(
                "model '{name}' is already registered for corpus '{corpus_name}'"
            )));
        }

        let doctpc_field = format!("doctpc_{name}");
        let sim_field = format!("sim_{name}");
        let doctpc_type = self.field_type(&self.config.doctpc_field_type, "doctpc_field_type")?;
        let sim_type = self.field_type(&self.config.sim_field_type, "sim_field_type")?;

        // Encode everything before the first registry write, so a bad
        // model leaves the registry untouched.
        let scale = self.config.payload_scale;
        let doc_payloads = model.encode_doc_topics(scale)?;
        let topic_records = model.encode_topics(scale)?;
        let similarities = model.encode_similarities(scale)?;

        self.registry()
            .attach_model(record.id, &name, &doctpc_field)
            .await?;

        let resp = self
            .client
            .add_field(&corpus_name, &doctpc_field, &doctpc_type)
            .await?;
        ensure_ok("add doc-topic field", &resp)?;
        let resp = self.client.add_field(&corpus_name, &sim_field, &sim_type).await?;
        ensure_ok("add similarity field", &resp)?;
        tracing::info!(corpus = %corpus_name, field = %doctpc_field, "schema evolved");

        let mut sims_by_id: HashMap<String, String> = similarities
            .map(|pairs| pairs.into_iter().collect())
            .unwrap_or_default();
        let corpus_updates: Vec<Value> = doc_payloads
            .into_iter()
            .map(|(id, payload)| {
                let mut doc = serde_json::Map::new();
                doc.insert("id".to_string(), Value::String(id.clone()));
                doc.insert(doctpc_field.clone(), json!({"set": payload}));
                if let Some(sim) = sims_by_id.remove(&id) {
                    doc.insert(sim_field.clone(), json!({"set": sim}));
                }
                Value::Object(doc)
            })
            .collect();
        self.send_batches(&corpus_name, &corpus_updates).await?;

        let topic_docs: Vec<Value> = topic_records.into_iter().map(Value::Object).collect();
        self.send_batches(&name, &topic_docs).await?;
        Ok(IndexOutcome::Indexed)
    }

    /// Removes a model: its collection, its registry entry, and the
    /// payload fields it added to the corpus schema.
    #[tracing::instrument(skip(self), fields(model = %model_path.display()))]
    pub async fn delete_model(&self, model_path: &Path) -> Result<(), IndexError> {
        let model = TopicModel::open(model_path)?;
        let name = model.name().to_string();
        let corpus_name = model.corpus_name();

        let record = self
            .registry()
            .lookup(&corpus_name)
            .await?
            .ok_or_else(|| {
                IndexError::NotFound(format!("corpus '{corpus_name}' is not registered"))
            })?;
        if !record.models.contains(&name) {
            return Err(IndexError::NotFound(format!(
                "model '{name}' is not registered for corpus '{corpus_name}'"
            )));
        }

        let existing = self.collection_names().await?;
        if existing.contains(&name) {
            let resp = self.client.delete_collection(&name).await?;
            ensure_ok("delete model collection", &resp)?;
        } else {
            tracing::info!(model = %name, "model collection already absent, skipping");
        }

        let doctpc_field = format!("doctpc_{name}");
        let sim_field = format!("sim_{name}");
        self.registry()
            .detach_model(record.id, &name, &doctpc_field)
            .await?;

        // Clear stored payloads before dropping the fields.
        let ids = self.document_ids(&corpus_name).await?;
        let clears: Vec<Value> = ids
            .into_iter()
            .map(|id| {
                let mut doc = serde_json::Map::new();
                doc.insert("id".to_string(), Value::String(id));
                doc.insert(doctpc_field.clone(), json!({"set": []}));
                Value::Object(doc)
            })
            .collect();
        self.send_batches(&corpus_name, &clears).await?;

        let resp = self.client.remove_field(&corpus_name, &doctpc_field).await?;
        ensure_ok("remove doc-topic field", &resp)?;
        let resp = self.client.remove_field(&corpus_name, &sim_field).await?;
        ensure_ok("remove similarity field", &resp)?;
        tracing::info!(model = %name, corpus = %corpus_name, "model removed");
        Ok(())
    }

    async fn create_collection(&self, name: &str) -> Result<SolrResponse, IndexError> {
        Ok(self
            .client
            .create_collection(
                name,
                &self.config.engine_config,
                self.config.shards,
                self.config.replicas,
            )
            .await?)
    }

    async fn collection_names(&self) -> Result<Vec<String>, IndexError> {
        let listing = self.client.list_collections().await?;
        ensure_ok("list collections", &listing)?;
        Ok(listing
            .docs
            .iter()
            .filter_map(|d| d.get("name").and_then(Value::as_str))
            .map(str::to_string)
            .collect())
    }

    async fn document_ids(&self, collection: &str) -> Result<Vec<String>, IndexError> {
        let count = self
            .client
            .select(collection, &SelectParams {
                q: "*:*".to_string(),
                rows: Some("0".to_string()),
                ..Default::default()
            })
            .await?;
        ensure_ok("count documents", &count)?;

        let listing = self
            .client
            .select(collection, &SelectParams {
                q: "*:*".to_string(),
                fl: Some("id".to_string()),
                rows: Some(count.num_found.to_string()),
                ..Default::default()
            })
            .await?;
        ensure_ok("list document ids", &listing)?;
        Ok(listing
            .docs
            .iter()
            .filter_map(|d| d.get("id"))
            .filter_map(|v| match v {
                Value::String(s) => Some(s.clone()),
                other => other.as_u64().map(|n| n.to_string()),
            })
            .collect())
    }

    /// Streams corpus documents into the collection in configured batches.
    async fn stream_documents(
        &self,
        collection: &str,
        stream: &mut DocumentStream,
    ) -> Result<(), IndexError> {
        let total = stream.total_rows();
        let mut batch: Vec<Value> = Vec::with_capacity(self.config.batch_size);
        let mut sent: u64 = 0;
        for doc in stream.by_ref() {
            batch.push(Value::Object(doc?));
            if batch.len() == self.config.batch_size {
                sent = self.flush(collection, &mut batch, sent, total).await?;
            }
        }
        if !batch.is_empty() {
            self.flush(collection, &mut batch, sent, total).await?;
        }
        tracing::info!(collection = %collection, total, "finished indexing");
        Ok(())
    }

    async fn send_batches(&self, collection: &str, docs: &[Value]) -> Result<(), IndexError> {
        let total = docs.len() as u64;
        let mut sent: u64 = 0;
        for chunk in docs.chunks(self.config.batch_size.max(1)) {
            let resp = self.client.batch_update(collection, chunk).await?;
            ensure_ok("batch update", &resp)?;
            let from = sent;
            sent += chunk.len() as u64;
            tracing::info!(collection = %collection, from, to = sent, total, "indexed batch");
        }
        Ok(())
    }

    async fn flush(
        &self,
        collection: &str,
        batch: &mut Vec<Value>,
        sent: u64,
        total: u64,
    ) -> Result<u64, IndexError> {
        let resp = self.client.batch_update(collection, batch).await?;
        ensure_ok("batch update", &resp)?;
        let new_sent = sent + batch.len() as u64;
        tracing::info!(collection = %collection, from = sent, to = new_sent, total, "indexed batch");
        batch.clear();
        Ok(new_sent)
    }

    fn field_type(&self, value: &Option<String>, key: &str) -> Result<String, IndexError> {
        value
            .clone()
            .ok_or_else(|| IndexError::Config(format!("{key} is not configured")))
    }
}

fn ensure_ok(operation: &str, resp: &SolrResponse) -> Result<(), IndexError> {
    if resp.is_ok() {
        Ok(())
    } else {
        Err(IndexError::engine(operation, resp))
    }
}

fn stem_lowercase(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn engine_errors_carry_operation_and_status() {
        let resp = SolrResponse::error(503, "no healthy replicas");
        let err = ensure_ok("batch update", &resp).unwrap_err();
        match err {
            IndexError::Engine {
                operation,
                status,
                message,
            } => {
                assert_eq!(operation, "batch update");
                assert_eq!(status, 503);
                assert_eq!(message, "no healthy replicas");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn collection_names_derive_from_path_stems() {
        assert_eq!(stem_lowercase(Path::new("/data/source/Cordis.json")), "cordis");
        assert_eq!(stem_lowercase(Path::new("/models/Mallet-25")), "mallet-25");
    }

    #[test]
    fn missing_field_type_is_a_config_error() {
        let indexer = Indexer::new(
            SolrClient::new(
                "http://localhost:8983".parse().unwrap(),
                std::time::Duration::from_secs(10),
            )
            .unwrap(),
            IndexerConfig {
                doctpc_field_type: None,
                ..Default::default()
            },
        );
        let err = indexer
            .field_type(&indexer.config.doctpc_field_type, "doctpc_field_type")
            .unwrap_err();
        assert!(matches!(err, IndexError::Config(msg) if msg.contains("doctpc_field_type")));
    }
}
