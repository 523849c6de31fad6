use std::time::Duration;

use serde_json::{json, Value};
use url::Url;

use crate::{Error, SolrResponse};

/// Soft-commit window passed to every update request, in milliseconds.
const COMMIT_WITHIN_MS: &str = "1000";

/// Parameters of a `select` query. All values travel as strings, matching
/// the engine's wire format (`start`/`rows` included).
#[derive(Debug, Clone, Default)]
pub struct SelectParams {
    pub q: String,
    pub fq: Option<String>,
    pub fl: Option<String>,
    pub sort: Option<String>,
    pub start: Option<String>,
    pub rows: Option<String>,
    pub df: Option<String>,
    pub q_op: Option<String>,
}

impl SelectParams {
    pub fn query(q: impl Into<String>) -> Self {
        SelectParams {
            q: q.into(),
            ..Default::default()
        }
    }

    fn to_pairs(&self) -> Vec<(&'static str, &str)> {
        let mut pairs = vec![("q", self.q.as_str())];
        if let Some(fq) = &self.fq {
            pairs.push(("fq", fq));
        }
        if let Some(fl) = &self.fl {
            pairs.push(("fl", fl));
        }
        if let Some(sort) = &self.sort {
            pairs.push(("sort", sort));
        }
        if let Some(start) = &self.start {
            pairs.push(("start", start));
        }
        if let Some(rows) = &self.rows {
            pairs.push(("rows", rows));
        }
        if let Some(df) = &self.df {
            pairs.push(("df", df));
        }
        if let Some(q_op) = &self.q_op {
            pairs.push(("q.op", q_op));
        }
        pairs.push(("wt", "json"));
        pairs
    }
}

/// A reusable Solr client. Holds one pooled `reqwest::Client`; cloning is
/// cheap and clones share connections. The adapter performs no retries:
/// transient failures surface to the caller as [`Error::Transport`].
#[derive(Debug, Clone)]
pub struct SolrClient {
    base_url: Url,
    http: reqwest::Client,
}

impl SolrClient {
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(SolrClient { base_url, http })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, Error> {
        Ok(self.base_url.join(path)?)
    }

    /// Reads a response body into the uniform envelope, logging engine
    /// errors at the call boundary.
    async fn decode(
        &self,
        operation: &'static str,
        resp: reqwest::Response,
    ) -> Result<SolrResponse, Error> {
        let decoded = SolrResponse::from_body(&resp.text().await?);
        if !decoded.is_ok() {
            tracing::warn!(
                operation,
                status = decoded.status,
                message = %decoded.message,
                "engine returned an error"
            );
        }
        Ok(decoded)
    }

    /// Creates a collection, synthesizing a 409 when the name is already
    /// taken. Solr itself answers an unhelpful 400 for that case, so the
    /// listing is consulted first.
    pub async fn create_collection(
        &self,
        name: &str,
        config: &str,
        shards: u32,
        replicas: u32,
    ) -> Result<SolrResponse, Error> {
        let listing = self.list_collections().await?;
        if !listing.is_ok() {
            return Ok(listing);
        }
        let exists = listing
            .docs
            .iter()
            .any(|d| d.get("name").and_then(Value::as_str) == Some(name));
        if exists {
            return Ok(SolrResponse::error(
                409,
                format!("collection {name} already exists"),
            ));
        }

        tracing::debug!(collection = %name, %config, shards, replicas, "creating collection");
        let body = json!({
            "create": {
                "name": name,
                "config": config,
                "numShards": shards,
                "replicationFactor": replicas,
            }
        });
        let url = self.endpoint("api/collections")?;
        let resp = self.http.post(url).json(&body).send().await?;
        self.decode("create collection", resp).await
    }

    pub async fn delete_collection(&self, name: &str) -> Result<SolrResponse, Error> {
        tracing::debug!(collection = %name, "deleting collection");
        let mut url = self.endpoint("api/collections")?;
        url.query_pairs_mut()
            .append_pair("action", "DELETE")
            .append_pair("name", name);
        let resp = self.http.get(url).send().await?;
        self.decode("delete collection", resp).await
    }

    pub async fn list_collections(&self) -> Result<SolrResponse, Error> {
        let url = self.endpoint("api/collections")?;
        let resp = self.http.get(url).send().await?;
        self.decode("list collections", resp).await
    }

    /// Adds a field to a collection schema. The field is indexed, stored,
    /// multivalued and carries term vectors/positions/offsets, which the
    /// payload functions require.
    pub async fn add_field(
        &self,
        collection: &str,
        field: &str,
        field_type: &str,
    ) -> Result<SolrResponse, Error> {
        tracing::debug!(%collection, %field, %field_type, "adding schema field");
        let body = json!({
            "add-field": {
                "name": field,
                "type": field_type,
                "indexed": "true",
                "termOffsets": "true",
                "stored": "true",
                "termPositions": "true",
                "termVectors": "true",
                "multiValued": "true",
            }
        });
        let url = self.endpoint(&format!("api/collections/{collection}/schema"))?;
        let resp = self.http.post(url).json(&body).send().await?;
        self.decode("add field", resp).await
    }

    pub async fn remove_field(
        &self,
        collection: &str,
        field: &str,
    ) -> Result<SolrResponse, Error> {
        tracing::debug!(%collection, %field, "removing schema field");
        let body = json!({"delete-field": {"name": field}});
        let url = self.endpoint(&format!("api/collections/{collection}/schema"))?;
        let resp = self.http.post(url).json(&body).send().await?;
        self.decode("remove field", resp).await
    }

    pub async fn delete_by_id(&self, collection: &str, id: &str) -> Result<SolrResponse, Error> {
        tracing::debug!(%collection, %id, "deleting document");
        let body = format!("<delete><query>(id:{id})</query></delete>");
        let url = self.endpoint(&format!("solr/{collection}/update"))?;
        let resp = self
            .http
            .post(url)
            .query(&update_params())
            .header(reqwest::header::CONTENT_TYPE, "application/xml")
            .body(body)
            .send()
            .await?;
        self.decode("delete by id", resp).await
    }

    /// Posts a batch of documents to the update endpoint. Documents may be
    /// whole records or atomic-op records (`{"set": v}`, `{"add": v}`,
    /// `{"remove": v}` on named fields); both pass through unchanged.
    pub async fn batch_update(
        &self,
        collection: &str,
        docs: &[Value],
    ) -> Result<SolrResponse, Error> {
        tracing::debug!(%collection, docs = docs.len(), "posting update batch");
        let url = self.endpoint(&format!("solr/{collection}/update"))?;
        let resp = self
            .http
            .post(url)
            .query(&update_params())
            .json(docs)
            .send()
            .await?;
        self.decode("batch update", resp).await
    }

    pub async fn select(
        &self,
        collection: &str,
        params: &SelectParams,
    ) -> Result<SolrResponse, Error> {
        tracing::debug!(%collection, q = %params.q, "running select");
        let url = self.endpoint(&format!("solr/{collection}/select"))?;
        let resp = self
            .http
            .get(url)
            .query(&params.to_pairs())
            .send()
            .await?;
        self.decode("select", resp).await
    }
}

fn update_params() -> [(&'static str, &'static str); 3] {
    [
        ("commitWithin", COMMIT_WITHIN_MS),
        ("overwrite", "true"),
        ("wt", "json"),
    ]
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn select_params_serialize_in_wire_order() {
        let params = SelectParams {
            q: "id:D1".to_string(),
            fl: Some("doctpc_mallet-25".to_string()),
            start: Some("0".to_string()),
            rows: Some("10".to_string()),
            q_op: Some("OR".to_string()),
            ..Default::default()
        };
        let pairs = params.to_pairs();
        assert_eq!(
            pairs,
            vec![
                ("q", "id:D1"),
                ("fl", "doctpc_mallet-25"),
                ("start", "0"),
                ("rows", "10"),
                ("q.op", "OR"),
                ("wt", "json"),
            ]
        );
    }

    #[test]
    fn minimal_params_still_request_json() {
        let params = SelectParams::query("*:*");
        let pairs = params.to_pairs();
        assert_eq!(pairs, vec![("q", "*:*"), ("wt", "json")]);
    }
}
