use serde_json::{Map, Value};

/// Uniform result of any engine operation, regardless of which native
/// envelope Solr used for it.
///
/// A well-formed acknowledgment (`responseHeader.status == 0`) maps to
/// status 200. A non-zero engine status is propagated as-is. A body that
/// cannot be decoded at all maps to 400 with the raw body as the message.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SolrResponse {
    pub status: u16,
    pub message: String,
    pub docs: Vec<Map<String, Value>>,
    pub num_found: u64,
    pub qtime: Option<u64>,
    pub next_cursor: Option<String>,
}

impl SolrResponse {
    pub fn error(status: u16, message: impl Into<String>) -> Self {
        SolrResponse {
            status,
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == 200
    }

    /// Decodes a raw engine body into the uniform envelope.
    pub fn from_body(body: &str) -> Self {
        let parsed: Value = match serde_json::from_str(body) {
            Ok(v) => v,
            Err(_) => return SolrResponse::error(400, body),
        };

        let mut out = SolrResponse::default();

        let header_status = parsed
            .get("responseHeader")
            .and_then(|h| h.get("status"))
            .and_then(Value::as_u64);
        match header_status {
            Some(0) => out.status = 200,
            Some(code) => {
                out.status = code as u16;
                out.message = parsed
                    .get("error")
                    .and_then(|e| e.get("msg"))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
            }
            // Some admin endpoints answer without a responseHeader; a body
            // we could decode but cannot interpret is a bad request.
            None => return SolrResponse::error(400, body),
        }

        out.qtime = parsed
            .get("responseHeader")
            .and_then(|h| h.get("QTime"))
            .and_then(Value::as_u64);

        // Collection listings carry a bare array of names.
        if let Some(collections) = parsed.get("collections").and_then(Value::as_array) {
            out.docs = collections
                .iter()
                .map(|name| {
                    let mut doc = Map::new();
                    doc.insert("name".to_string(), name.clone());
                    doc
                })
                .collect();
        }

        // Query responses carry a `response` object with docs and a total.
        if let Some(response) = parsed.get("response") {
            out.num_found = response
                .get("numFound")
                .and_then(Value::as_u64)
                .unwrap_or(0);
            if let Some(docs) = response.get("docs").and_then(Value::as_array) {
                out.docs = docs
                    .iter()
                    .filter_map(|d| d.as_object().cloned())
                    .collect();
            }
        }

        out.next_cursor = parsed
            .get("nextCursorMark")
            .and_then(Value::as_str)
            .map(str::to_string);

        out
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn acknowledgment_maps_to_200() {
        let body = json!({"responseHeader": {"status": 0, "QTime": 1130}});
        let resp = SolrResponse::from_body(&body.to_string());
        assert_eq!(resp.status, 200);
        assert_eq!(resp.qtime, Some(1130));
        assert!(resp.docs.is_empty());
    }

    #[test]
    fn engine_error_propagates_status_and_message() {
        let body = json!({
            "responseHeader": {"status": 400, "QTime": 10},
            "error": {"msg": "Collection 'nope' not found", "code": 400}
        });
        let resp = SolrResponse::from_body(&body.to_string());
        assert_eq!(resp.status, 400);
        assert_eq!(resp.message, "Collection 'nope' not found");
    }

    #[test]
    fn query_response_carries_docs_and_total() {
        let body = json!({
            "responseHeader": {"status": 0, "QTime": 15},
            "response": {
                "numFound": 3,
                "start": 0,
                "docs": [{"id": "1"}, {"id": "2"}, {"id": "3"}]
            },
            "nextCursorMark": "AoE/1g=="
        });
        let resp = SolrResponse::from_body(&body.to_string());
        assert_eq!(resp.status, 200);
        assert_eq!(resp.num_found, 3);
        assert_eq!(resp.docs.len(), 3);
        assert_eq!(resp.docs[0]["id"], json!("1"));
        assert_eq!(resp.next_cursor.as_deref(), Some("AoE/1g=="));
    }

    #[test]
    fn collection_listing_becomes_name_docs() {
        let body = json!({
            "responseHeader": {"status": 0},
            "collections": ["cordis", "Corpora", "mallet-25"]
        });
        let resp = SolrResponse::from_body(&body.to_string());
        assert_eq!(resp.status, 200);
        let names: Vec<&str> = resp
            .docs
            .iter()
            .map(|d| d["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["cordis", "Corpora", "mallet-25"]);
    }

    #[test]
    fn undecodable_body_maps_to_400_with_raw_body() {
        let resp = SolrResponse::from_body("<html>502 Bad Gateway</html>");
        assert_eq!(resp.status, 400);
        assert_eq!(resp.message, "<html>502 Bad Gateway</html>");
    }

    #[test]
    fn decodable_but_headerless_body_maps_to_400() {
        let resp = SolrResponse::from_body(r#"{"unexpected": true}"#);
        assert_eq!(resp.status, 400);
    }
}
