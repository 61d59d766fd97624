use blueprint::{OperationKind, SourceId};
use derive_more::{Display, Error, From};

use crate::ResponsePath;

/// No source can resolve a field the operation selects.
#[derive(Clone, Debug, PartialEq, Display, Error)]
#[display("no source can resolve `{type_name}.{field}` at {path}")]
pub struct UnresolvableFieldError {
    pub type_name: String,
    pub field: String,
    pub path: ResponsePath,
}

/// A selection needs a second source but the type cannot be re-entered from
/// the source currently resolving it.
#[derive(Clone, Debug, PartialEq, Display, Error)]
#[display("`{type_name}` at {path} is resolved by `{from}` but `{to}` is needed: {reason}")]
pub struct UngroupableSelectionError {
    pub type_name: String,
    pub path: ResponsePath,
    pub from: SourceId,
    pub to: SourceId,
    pub reason: String,
}

/// The target of a cross-source hop has no entry point receiving the key.
#[derive(Clone, Debug, PartialEq, Display, Error)]
#[display("`{target}` declares no entry point for `{type_name}` receiving `{field}` at {path}")]
pub struct KeyForwardingError {
    pub type_name: String,
    pub target: SourceId,
    pub field: String,
    pub path: ResponsePath,
}

#[derive(Clone, Debug, PartialEq, Display, Error)]
#[display("{kind} operations cannot be planned")]
pub struct UnsupportedOperationError {
    pub kind: OperationKind,
}

/// The operation does not fit the schema it is planned against.
#[derive(Clone, Debug, PartialEq, Display, Error)]
#[display("{message} at {path}")]
pub struct InvalidQueryError {
    pub path: ResponsePath,
    pub message: String,
}

impl InvalidQueryError {
    pub fn new(path: ResponsePath, message: impl Into<String>) -> Self {
        InvalidQueryError { path, message: message.into() }
    }
}

#[derive(Debug, Display, Error, From)]
pub enum PlanError {
    #[display("{_0}")]
    Parse(async_graphql_parser::Error),
    #[display("{_0}")]
    InvalidQuery(InvalidQueryError),
    #[display("{_0}")]
    Unsupported(UnsupportedOperationError),
    #[display("{_0}")]
    Unresolvable(UnresolvableFieldError),
    #[display("{_0}")]
    Ungroupable(UngroupableSelectionError),
    #[display("{_0}")]
    KeyForwarding(KeyForwardingError),
}
