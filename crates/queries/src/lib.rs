//! The query layer: a fixed catalogue of parameterized query templates
//! and the executor that compiles them into engine requests, validates
//! their preconditions, paginates, normalizes scores and persists results
//! on request.

mod catalogue;
mod executor;

pub use catalogue::Catalogue;
pub use executor::{Executor, ExecutorConfig, QueryError, QueryResult};
