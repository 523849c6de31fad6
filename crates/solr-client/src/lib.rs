//! Typed wrapper over the Solr HTTP API used by the workbench: collection
//! management, schema evolution, batched updates and `select` queries.
//! Every engine response is normalized into a single [`SolrResponse`]
//! envelope so that callers never see Solr's native response shapes.

mod client;
mod response;

pub use client::{SelectParams, SolrClient};
pub use response::SolrResponse;

/// Error type for failures that happen before an engine envelope exists:
/// the request never completed, or the client itself was misconfigured.
/// Engine-level errors (non-zero status in the response header) are *not*
/// errors at this layer; they are carried inside [`SolrResponse::status`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("engine request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid engine URL: {0}")]
    Url(#[from] url::ParseError),
}
