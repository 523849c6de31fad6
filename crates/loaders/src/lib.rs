//! Loaders for the two on-disk asset kinds the workbench ingests: logical
//! corpora (a manifest pointing at one parquet file) and trained topic
//! models (a directory of sparse matrices and per-topic statistics).
//! Corpus loading streams documents one parquet row at a time; model
//! loading densifies one matrix row at a time. Neither ever materializes a
//! whole asset in memory beyond what a single record needs.

pub mod corpus;
pub mod model;
pub mod npz;
pub mod payload;
pub mod sanitize;

pub use corpus::{CorpusFields, DocumentStream, LogicalCorpus};
pub use model::TopicModel;
pub use npz::CsrMatrix;

/// Error type returned by all load operations.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to read asset: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to read parquet: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("failed to open npz archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("malformed npy entry: {0}")]
    Npy(String),

    #[error("manifest names {0} datasets; only single-dataset corpora are supported")]
    MultipleDatasets(usize),

    #[error("column '{0}' is not present in the source file")]
    MissingColumn(String),

    #[error("model artifact missing: {0}")]
    MissingArtifact(String),

    #[error("doc-topic matrix has {rows} rows but the id list has {ids} entries")]
    RowIdMismatch { rows: usize, ids: usize },

    #[error("topic-word matrix has {cols} columns but the vocabulary has {terms} terms")]
    VocabMismatch { cols: usize, terms: usize },

    #[error("unsupported trainer family '{0}'")]
    UnsupportedTrainer(String),
}
