//! Defines the `ApiError` type returned from API handlers: an HTTP status
//! code wrapping an `anyhow::Error`, with `From` impls that assign each
//! domain error its documented status. Handlers return
//! `Result<Json<T>, ApiError>` and let `?` do the mapping.

use axum::http::StatusCode;
use indexer::IndexError;
use queries::QueryError;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub error: anyhow::Error,
}

impl ApiError {
    pub fn new(status: StatusCode, error: anyhow::Error) -> ApiError {
        ApiError { status, error }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        ApiError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error,
        }
    }
}

/// Engine statuses pass through when they are client errors; everything
/// 5xx (and anything unrepresentable) is a transient engine condition the
/// caller may retry, answered as 503.
fn engine_status(status: u16) -> StatusCode {
    if status >= 500 {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl From<IndexError> for ApiError {
    fn from(err: IndexError) -> Self {
        let status = match &err {
            IndexError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            IndexError::Load(load) => match load {
                // A path the caller handed us that does not resolve.
                loaders::LoadError::Io(_) | loaders::LoadError::MissingArtifact(_) => {
                    StatusCode::BAD_REQUEST
                }
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            IndexError::Transport(_) => StatusCode::SERVICE_UNAVAILABLE,
            IndexError::Engine { status, .. } => engine_status(*status),
            IndexError::Invariant(_) => StatusCode::INTERNAL_SERVER_ERROR,
            IndexError::NotFound(_) => StatusCode::NOT_FOUND,
        };
        ApiError::new(status, err.into())
    }
}

impl From<QueryError> for ApiError {
    fn from(err: QueryError) -> Self {
        let status = match &err {
            QueryError::NotFound(_) => StatusCode::NOT_FOUND,
            QueryError::MalformedInput(_) => StatusCode::BAD_REQUEST,
            QueryError::Transport(_) => StatusCode::SERVICE_UNAVAILABLE,
            QueryError::Engine { status, .. } => engine_status(*status),
            QueryError::Persist { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError::new(status, err.into())
    }
}

impl axum::response::IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        if self.status.is_server_error() {
            tracing::error!(error = ?self.error, status = %self.status, "API error");
        }
        let body = serde_json::json!({
            "status": self.status.as_u16(),
            // Alternate rendering includes nested causes.
            "error": format!("{:#}", self.error),
        });
        (self.status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn engine_5xx_becomes_service_unavailable() {
        assert_eq!(engine_status(500), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(engine_status(503), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(engine_status(409), StatusCode::CONFLICT);
        assert_eq!(engine_status(400), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn domain_errors_map_to_documented_statuses() {
        let err: ApiError = QueryError::NotFound("collection 'x' is not a corpus".into()).into();
        assert_eq!(err.status, StatusCode::NOT_FOUND);

        let err: ApiError = QueryError::MalformedInput("text_payload".into()).into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);

        let err: ApiError = IndexError::Invariant("duplicate model".into()).into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);

        let err: ApiError = IndexError::Config("doctpc_field_type".into()).into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
