//! The registry collection: one document per indexed logical corpus,
//! holding its name, its field list and the models trained against it.
//! This collection is the single source of truth for the corpus-to-model
//! mapping; every mutation is a single-document atomic op, which is all
//! the consistency the ingestion pipeline requires.

use serde_json::{json, Map, Value};
use solr_client::{SelectParams, SolrClient};

use crate::IndexError;

/// One registry document.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct RegistryRecord {
    pub id: u64,
    pub corpus_name: String,
    pub fields: Vec<String>,
    pub models: Vec<String>,
}

impl RegistryRecord {
    /// Lenient extraction from an engine document. Single-valued strings
    /// may come back as one-element arrays depending on the collection
    /// schema, so both shapes are accepted.
    pub fn from_doc(doc: &Map<String, Value>) -> Option<RegistryRecord> {
        Some(RegistryRecord {
            id: doc.get("id").and_then(scalar_u64)?,
            corpus_name: doc.get("corpus_name").and_then(scalar_str)?,
            fields: doc.get("fields").map(string_list).unwrap_or_default(),
            models: doc.get("models").map(string_list).unwrap_or_default(),
        })
    }
}

fn scalar_u64(v: &Value) -> Option<u64> {
    match v {
        Value::Array(items) => items.first().and_then(scalar_u64),
        Value::String(s) => s.parse().ok(),
        other => other.as_u64(),
    }
}

fn scalar_str(v: &Value) -> Option<String> {
    match v {
        Value::Array(items) => items.first().and_then(scalar_str),
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

fn string_list(v: &Value) -> Vec<String> {
    match v {
        Value::Array(items) => items
            .iter()
            .filter_map(|i| i.as_str().map(str::to_string))
            .collect(),
        Value::String(s) => vec![s.clone()],
        _ => Vec::new(),
    }
}

/// Handle over the registry collection.
pub struct Registry<'a> {
    client: &'a SolrClient,
    collection: &'a str,
}

impl<'a> Registry<'a> {
    pub fn new(client: &'a SolrClient, collection: &'a str) -> Self {
        Registry { client, collection }
    }

    pub async fn lookup(
        &self,
        corpus_name: &str,
    ) -> Result<Option<RegistryRecord>, IndexError> {
        let params = SelectParams {
            q: format!("corpus_name:{corpus_name}"),
            fl: Some("id,corpus_name,fields,models".to_string()),
            ..Default::default()
        };
        let resp = self.client.select(self.collection, &params).await?;
        if !resp.is_ok() {
            return Err(IndexError::engine("registry lookup", &resp));
        }
        Ok(resp.docs.first().and_then(RegistryRecord::from_doc))
    }

    /// Highest corpus id currently assigned, if any.
    pub async fn highest_id(&self) -> Result<Option<u64>, IndexError> {
        let params = SelectParams {
            q: "*:*".to_string(),
            fl: Some("id".to_string()),
            sort: Some("id desc".to_string()),
            rows: Some("1".to_string()),
            ..Default::default()
        };
        let resp = self.client.select(self.collection, &params).await?;
        if !resp.is_ok() {
            return Err(IndexError::engine("registry id scan", &resp));
        }
        Ok(resp.docs.first().and_then(|d| d.get("id")).and_then(scalar_u64))
    }

    pub async fn insert(&self, record: &RegistryRecord) -> Result<(), IndexError> {
        let doc = json!({
            "id": record.id,
            "corpus_name": record.corpus_name,
            "fields": record.fields,
        });
        let resp = self.client.batch_update(self.collection, &[doc]).await?;
        if !resp.is_ok() {
            return Err(IndexError::engine("registry insert", &resp));
        }
        Ok(())
    }

    /// Atomically appends a model and its payload field to a record.
    pub async fn attach_model(
        &self,
        id: u64,
        model_name: &str,
        doctpc_field: &str,
    ) -> Result<(), IndexError> {
        let doc = json!({
            "id": id,
            "fields": {"add": doctpc_field},
            "models": {"add": model_name},
        });
        let resp = self.client.batch_update(self.collection, &[doc]).await?;
        if !resp.is_ok() {
            return Err(IndexError::engine("registry model attach", &resp));
        }
        Ok(())
    }

    /// Atomically removes a model and its payload field from a record.
    pub async fn detach_model(
        &self,
        id: u64,
        model_name: &str,
        doctpc_field: &str,
    ) -> Result<(), IndexError> {
        let doc = json!({
            "id": id,
            "fields": {"remove": doctpc_field},
            "models": {"remove": model_name},
        });
        let resp = self.client.batch_update(self.collection, &[doc]).await?;
        if !resp.is_ok() {
            return Err(IndexError::engine("registry model detach", &resp));
        }
        Ok(())
    }

    pub async fn delete(&self, id: u64) -> Result<(), IndexError> {
        let resp = self
            .client
            .delete_by_id(self.collection, &id.to_string())
            .await?;
        if !resp.is_ok() {
            return Err(IndexError::engine("registry delete", &resp));
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn record_parses_from_plain_doc() {
        let doc = json!({
            "id": 2,
            "corpus_name": "cordis",
            "fields": ["id", "title", "date", "doctpc_mallet-25"],
            "models": ["mallet-25"],
        });
        let record = RegistryRecord::from_doc(doc.as_object().unwrap()).unwrap();
        assert_eq!(record.id, 2);
        assert_eq!(record.corpus_name, "cordis");
        assert_eq!(record.models, vec!["mallet-25"]);
    }

    #[test]
    fn record_parses_from_multivalued_doc() {
        // Schemaless collections answer single-valued fields as arrays.
        let doc = json!({
            "id": ["7"],
            "corpus_name": ["cordis"],
            "fields": ["id"],
        });
        let record = RegistryRecord::from_doc(doc.as_object().unwrap()).unwrap();
        assert_eq!(record.id, 7);
        assert_eq!(record.corpus_name, "cordis");
        assert!(record.models.is_empty());
    }

    #[test]
    fn record_without_id_is_rejected() {
        let doc = json!({"corpus_name": "cordis"});
        assert!(RegistryRecord::from_doc(doc.as_object().unwrap()).is_none());
    }
}
