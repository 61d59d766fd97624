use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::error::{Error, SchemaError};
use crate::SchemaIndex;

/// The logical schema description consumed by the planner: which sources
/// exist, which sources declare each composite type and which sources own
/// each field.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Blueprint {
    #[serde(default = "default_query")]
    pub query: String,
    #[serde(default)]
    pub mutation: Option<String>,
    #[serde(default)]
    pub subscription: Option<String>,
    pub sources: Vec<SourceId>,
    pub types: Vec<TypeDefinition>,
}

fn default_query() -> String {
    "Query".to_string()
}

impl Blueprint {
    /// Reads a supergraph SDL annotated with `@join__*` directives.
    pub fn parse_sdl(sdl: &str) -> Result<Blueprint, Error> {
        let document = async_graphql_parser::parse_schema(sdl)?;
        Ok(crate::build::parse(document)?)
    }

    pub fn to_index(&self) -> Result<SchemaIndex, SchemaError> {
        SchemaIndex::try_new(self)
    }

    pub fn root_type(&self, kind: OperationKind) -> Option<&str> {
        match kind {
            OperationKind::Query => Some(self.query.as_str()),
            OperationKind::Mutation => self.mutation.as_deref(),
            OperationKind::Subscription => self.subscription.as_deref(),
        }
    }
}

/// Identifies an independent backend (a subgraph).
#[derive(
    Clone, Debug, Serialize, Deserialize, Ord, PartialOrd, Eq, PartialEq, Hash, derive_more::Display,
)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    pub fn new(name: &str) -> Self {
        SourceId(name.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Query,
    Mutation,
    Subscription,
}

impl Display for OperationKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationKind::Query => f.write_str("query"),
            OperationKind::Mutation => f.write_str("mutation"),
            OperationKind::Subscription => f.write_str("subscription"),
        }
    }
}

/// A composite (object or interface) type.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TypeDefinition {
    pub name: String,
    /// Sources declaring the type, in preference order.
    #[serde(default)]
    pub join_types: Vec<JoinType>,
    #[serde(default)]
    pub fields: Vec<FieldDefinition>,
}

impl TypeDefinition {
    pub fn new(name: &str) -> Self {
        TypeDefinition { name: name.to_string(), join_types: Vec::new(), fields: Vec::new() }
    }

    pub fn join_type(mut self, join_type: JoinType) -> Self {
        self.join_types.push(join_type);
        self
    }

    pub fn field(mut self, field: FieldDefinition) -> Self {
        self.fields.push(field);
        self
    }

    pub fn get_field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|field| field.name == name)
    }
}

/// Declaration of a type by one source. A declaration carrying a `key`
/// makes the type re-enterable in that source.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JoinType {
    pub graph: SourceId,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default = "default_resolvable")]
    pub resolvable: bool,
    /// Root field used to re-enter the type, `_entities` when absent.
    #[serde(default)]
    pub entry_field: Option<String>,
    /// Overrides of the argument receiving a key field; key fields missing
    /// here are passed under their own name.
    #[serde(default)]
    pub arguments: BTreeMap<String, String>,
}

fn default_resolvable() -> bool {
    true
}

impl JoinType {
    pub fn new(graph: SourceId) -> Self {
        Self {
            graph,
            key: None,
            resolvable: true,
            entry_field: None,
            arguments: BTreeMap::new(),
        }
    }

    pub fn key(mut self, key: &str) -> Self {
        self.key = Some(key.to_string());
        self
    }

    pub fn argument(mut self, field: &str, argument: &str) -> Self {
        self.arguments.insert(field.to_string(), argument.to_string());
        self
    }

    pub fn resolvable(mut self, resolvable: bool) -> Self {
        self.resolvable = resolvable;
        self
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FieldDefinition {
    pub name: String,
    pub of_type: Type,
    /// When empty the field is owned by every source declaring the
    /// enclosing type.
    #[serde(default)]
    pub join_fields: Vec<JoinField>,
}

impl FieldDefinition {
    pub fn new(name: &str, of_type: Type) -> Self {
        FieldDefinition { name: name.to_string(), of_type, join_fields: Vec::new() }
    }

    pub fn join_field(mut self, join_field: JoinField) -> Self {
        self.join_fields.push(join_field);
        self
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct JoinField {
    #[serde(default)]
    pub graph: Option<SourceId>,
    /// External fields are declared by the source but resolved elsewhere.
    #[serde(default)]
    pub external: Option<bool>,
    /// Fields of the enclosing type the source needs in the representation
    /// before it can resolve this one.
    #[serde(default)]
    pub requires: Option<String>,
    /// Fields of the returned type the source resolves along this path even
    /// though it does not own them.
    #[serde(default)]
    pub provides: Option<String>,
}

impl JoinField {
    pub fn new(graph: SourceId) -> Self {
        JoinField { graph: Some(graph), ..Default::default() }
    }

    pub fn external(graph: SourceId) -> Self {
        JoinField { graph: Some(graph), external: Some(true), ..Default::default() }
    }

    pub fn requires(mut self, fields: &str) -> Self {
        self.requires = Some(fields.to_string());
        self
    }

    pub fn provides(mut self, fields: &str) -> Self {
        self.provides = Some(fields.to_string());
        self
    }

    pub fn is_external(&self) -> bool {
        self.external.unwrap_or(false)
    }
}

/// Type to represent GraphQL type usage with modifiers
/// [spec](https://spec.graphql.org/October2021/#sec-Wrapping-Types)
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum Type {
    Named {
        /// Name of the type
        name: String,
        /// Flag to indicate the type is required.
        required: bool,
    },
    List {
        /// Type is a list
        of_type: Box<Type>,
        /// Flag to indicate the type is required.
        non_null: bool,
    },
}

impl Type {
    pub fn named(name: &str) -> Self {
        Type::Named { name: name.to_string(), required: false }
    }

    pub fn list(of_type: Type) -> Self {
        Type::List { of_type: Box::new(of_type), non_null: false }
    }

    /// Name of the innermost named type.
    pub fn name(&self) -> &str {
        match self {
            Type::Named { name, .. } => name,
            Type::List { of_type, .. } => of_type.name(),
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Type::List { .. })
    }
}
