use derive_more::{Display, From};
use valid::ValidationError;

#[derive(Debug, Display, derive_more::Error, From)]
pub enum Error {
    #[display("{_0}")]
    Parse(async_graphql_parser::Error),
    #[display("{_0}")]
    Schema(SchemaError),
}

/// Malformed ownership or entity-key declarations. Every problem found while
/// indexing a schema is reported at once.
#[derive(Debug, Clone, PartialEq, Display, derive_more::Error, From)]
#[display("{_0}")]
pub struct SchemaError(ValidationError<String>);

impl SchemaError {
    pub fn causes(&self) -> &ValidationError<String> {
        &self.0
    }

    /// Messages of every cause, each prefixed with its trace.
    pub fn messages(&self) -> Vec<String> {
        self.0
            .as_vec()
            .iter()
            .map(|cause| {
                if cause.trace.is_empty() {
                    cause.message.clone()
                } else {
                    format!("{}: {}", cause.trace.join("."), cause.message)
                }
            })
            .collect()
    }
}
