use std::fmt::{Display, Formatter};
use std::ops::{Deref, DerefMut};

use async_graphql_value::Value;
use derive_setters::Setters;
use indexmap::IndexMap;
use serde::{Serialize, Serializer};

pub(crate) const TYPENAME: &str = "__typename";

/// One step into a response: a response key or the `@` marker standing for
/// "every element of this list".
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PathSegment {
    Field(String),
    Each,
}

impl Display for PathSegment {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PathSegment::Field(key) => f.write_str(key),
            PathSegment::Each => f.write_str("@"),
        }
    }
}

impl Serialize for PathSegment {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Location inside the response tree, expressed in response keys (aliases
/// win over field names).
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ResponsePath(Vec<PathSegment>);

impl ResponsePath {
    pub fn root() -> Self {
        ResponsePath(Vec::new())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn field(&self, key: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(PathSegment::Field(key.to_string()));
        ResponsePath(segments)
    }

    pub fn each(&self) -> Self {
        let mut segments = self.0.clone();
        segments.push(PathSegment::Each);
        ResponsePath(segments)
    }

    /// Response keys only, list markers dropped.
    pub fn keys(&self) -> Vec<&str> {
        self.0
            .iter()
            .filter_map(|segment| match segment {
                PathSegment::Field(key) => Some(key.as_str()),
                PathSegment::Each => None,
            })
            .collect()
    }

    /// Keys leading from `prefix` down to `self`, if `self` lies below it.
    pub fn keys_below(&self, prefix: &ResponsePath) -> Option<Vec<&str>> {
        let rest = self.0.strip_prefix(prefix.0.as_slice())?;
        Some(
            rest.iter()
                .filter_map(|segment| match segment {
                    PathSegment::Field(key) => Some(key.as_str()),
                    PathSegment::Each => None,
                })
                .collect(),
        )
    }
}

impl From<Vec<PathSegment>> for ResponsePath {
    fn from(segments: Vec<PathSegment>) -> Self {
        ResponsePath(segments)
    }
}

impl Display for ResponsePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let segments: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "[{}]", segments.join(", "))
    }
}

#[derive(Default, Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct SelectionSet(Vec<SelectionNode>);

impl Deref for SelectionSet {
    type Target = Vec<SelectionNode>;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl DerefMut for SelectionSet {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.0.as_mut()
    }
}

impl SelectionSet {
    pub fn new(fields: Vec<SelectionNode>) -> Self {
        Self(fields)
    }

    /// First selection answering to `response_key`.
    pub fn find(&self, response_key: &str) -> Option<&SelectionNode> {
        self.0.iter().find(|node| node.response_key() == response_key)
    }

    /// Follows `keys` down the selection tree.
    pub fn find_path(&self, keys: &[&str]) -> Option<&SelectionSet> {
        match keys.split_first() {
            None => Some(self),
            Some((key, rest)) => self.find(key)?.children.find_path(rest),
        }
    }

    /// Variables referenced anywhere in the selection, each once, in order of
    /// first use.
    pub fn variables(&self) -> Vec<&str> {
        let mut variables: Vec<&str> = Vec::new();
        for node in self.iter() {
            let used = node
                .arguments
                .iter()
                .flat_map(Argument::variables)
                .chain(node.children.variables());
            for variable in used {
                if !variables.contains(&variable) {
                    variables.push(variable);
                }
            }
        }
        variables
    }

    /// Compact GraphQL rendering. Selections made on a type other than
    /// `enclosing` are grouped under `... on Type`.
    pub fn render(&self, enclosing: Option<&str>) -> String {
        let mut parts = Vec::new();
        let mut conditions: IndexMap<&str, Vec<String>> = IndexMap::new();
        for node in self.iter() {
            if enclosing == Some(node.on_type.as_str()) {
                parts.push(node.to_string());
            } else {
                conditions
                    .entry(node.on_type.as_str())
                    .or_default()
                    .push(node.to_string());
            }
        }
        for (type_name, nodes) in conditions {
            parts.push(format!("... on {} {{ {} }}", type_name, nodes.join(" ")));
        }

        if parts.is_empty() {
            "{}".to_string()
        } else {
            format!("{{ {} }}", parts.join(" "))
        }
    }
}

impl Display for SelectionSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let enclosing = self.first().map(|node| node.on_type.as_str());
        f.write_str(&self.render(enclosing))
    }
}

/// A field selected by an operation, with its arguments and sub-selection.
#[derive(Debug, Clone, PartialEq, Setters, Serialize)]
#[setters(into)]
#[serde(rename_all = "camelCase")]
pub struct SelectionNode {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<Argument>,
    /// Response keys from the operation root down to this field.
    pub response_path: Vec<String>,
    /// Type the field is selected on (the type condition when selected
    /// through a fragment).
    pub on_type: String,
    /// Innermost named type the field returns.
    pub of_type: String,
    pub children: SelectionSet,

    /// When set to true the field was added by the planner to carry entity
    /// keys and should not be exposed to the user.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_hidden: bool,
}

impl SelectionNode {
    pub fn new(name: &str, on_type: &str, of_type: &str) -> Self {
        SelectionNode {
            name: name.to_string(),
            alias: None,
            arguments: Vec::new(),
            response_path: vec![name.to_string()],
            on_type: on_type.to_string(),
            of_type: of_type.to_string(),
            children: SelectionSet::default(),
            is_hidden: false,
        }
    }

    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    pub fn is_typename(&self) -> bool {
        self.name == TYPENAME
    }
}

impl Display for SelectionNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if let Some(alias) = &self.alias {
            write!(f, "{}: ", alias)?;
        }
        f.write_str(&self.name)?;
        if !self.arguments.is_empty() {
            let arguments: Vec<String> = self.arguments.iter().map(ToString::to_string).collect();
            write!(f, "({})", arguments.join(", "))?;
        }
        if !self.children.is_empty() {
            write!(f, " {}", self.children.render(Some(&self.of_type)))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Setters, Serialize)]
#[setters(into)]
pub struct Argument {
    pub name: String,
    pub value: Value,
}

impl Argument {
    /// Variables the value refers to, in order of appearance.
    pub fn variables(&self) -> Vec<&str> {
        let mut variables = Vec::new();
        collect_variables(&self.value, &mut variables);
        variables
    }
}

fn collect_variables<'a>(value: &'a Value, out: &mut Vec<&'a str>) {
    match value {
        Value::Variable(name) => out.push(name.as_str()),
        Value::List(items) => items.iter().for_each(|item| collect_variables(item, out)),
        Value::Object(fields) => fields.values().for_each(|field| collect_variables(field, out)),
        _ => {}
    }
}

impl Display for Argument {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.name, self.value)
    }
}
