use std::collections::HashMap;

use async_graphql_parser::types::{self as Q, DocumentOperations, OperationType};
use async_graphql_parser::Positioned;
use async_graphql_value::Name;
use blueprint::{OperationKind, SchemaIndex};

use crate::error::{InvalidQueryError, PlanError};
use crate::model::TYPENAME;
use crate::{Argument, PathSegment, ResponsePath, SelectionNode, SelectionSet};

type Fragments = HashMap<Name, Positioned<Q::FragmentDefinition>>;

/// A single operation resolved against the schema: fragments are inlined,
/// selections sharing a response key are merged and every field knows the
/// type it is selected on.
#[derive(Clone, Debug, PartialEq)]
pub struct Operation {
    pub kind: OperationKind,
    pub name: Option<String>,
    pub root_type: String,
    pub variables: Vec<VariableDefinition>,
    pub selection: SelectionSet,
}

/// A variable declared by the operation, with its type as written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VariableDefinition {
    pub name: String,
    pub of_type: String,
}

impl Operation {
    pub fn variable(&self, name: &str) -> Option<&VariableDefinition> {
        self.variables.iter().find(|variable| variable.name == name)
    }

    /// Parses `query` and picks the operation to plan. `operation_name` is
    /// only needed when the document defines several operations.
    pub fn parse(
        query: &str,
        operation_name: Option<&str>,
        index: &SchemaIndex,
    ) -> Result<Operation, PlanError> {
        let document = async_graphql_parser::parse_query(query)?;
        let (name, definition) = select_operation(&document.operations, operation_name)?;

        let kind = match definition.node.ty {
            OperationType::Query => OperationKind::Query,
            OperationType::Mutation => OperationKind::Mutation,
            OperationType::Subscription => OperationKind::Subscription,
        };
        let root_type = index.root_type(kind).ok_or_else(|| {
            InvalidQueryError::new(
                ResponsePath::root(),
                format!("the schema defines no {} root", kind),
            )
        })?;

        let variables: Vec<VariableDefinition> = definition
            .node
            .variable_definitions
            .iter()
            .map(|Positioned { node: variable, .. }| VariableDefinition {
                name: variable.name.node.to_string(),
                of_type: variable.var_type.node.to_string(),
            })
            .collect();

        let collector = Collector { index, fragments: &document.fragments, variables: &variables };
        let mut selection = Vec::new();
        collector.collect(
            &definition.node.selection_set.node,
            root_type,
            &[],
            &mut Vec::new(),
            &mut selection,
        )?;

        Ok(Operation {
            kind,
            name,
            root_type: root_type.to_string(),
            variables,
            selection: SelectionSet::new(selection),
        })
    }
}

fn select_operation<'a>(
    operations: &'a DocumentOperations,
    operation_name: Option<&str>,
) -> Result<(Option<String>, &'a Positioned<Q::OperationDefinition>), InvalidQueryError> {
    match (operations, operation_name) {
        (DocumentOperations::Single(operation), _) => Ok((None, operation)),
        (DocumentOperations::Multiple(operations), Some(name)) => operations
            .get(name)
            .map(|operation| (Some(name.to_string()), operation))
            .ok_or_else(|| {
                InvalidQueryError::new(
                    ResponsePath::root(),
                    format!("operation `{}` is not defined", name),
                )
            }),
        (DocumentOperations::Multiple(operations), None) => {
            let mut operations = operations.iter();
            match (operations.next(), operations.next()) {
                (Some((name, operation)), None) => Ok((Some(name.to_string()), operation)),
                _ => Err(InvalidQueryError::new(
                    ResponsePath::root(),
                    "an operation name is required when several operations are defined",
                )),
            }
        }
    }
}

fn to_path(keys: &[String]) -> ResponsePath {
    ResponsePath::from(
        keys.iter()
            .map(|key| PathSegment::Field(key.clone()))
            .collect::<Vec<_>>(),
    )
}

struct Collector<'a> {
    index: &'a SchemaIndex,
    fragments: &'a Fragments,
    variables: &'a [VariableDefinition],
}

impl Collector<'_> {
    /// Appends the fields of `selection_set` selected on `on_type` to `out`.
    /// `spreads` holds the fragments being expanded above this point.
    fn collect(
        &self,
        selection_set: &Q::SelectionSet,
        on_type: &str,
        path: &[String],
        spreads: &mut Vec<String>,
        out: &mut Vec<SelectionNode>,
    ) -> Result<(), InvalidQueryError> {
        for Positioned { node: selection, .. } in selection_set.items.iter() {
            match selection {
                Q::Selection::Field(Positioned { node: field, .. }) => {
                    self.collect_field(field, on_type, path, spreads, out)?;
                }
                Q::Selection::InlineFragment(Positioned { node: fragment, .. }) => {
                    let type_condition = fragment
                        .type_condition
                        .as_ref()
                        .map(|condition| condition.node.on.node.as_str())
                        .unwrap_or(on_type);
                    self.check_type(type_condition, path)?;
                    self.collect(&fragment.selection_set.node, type_condition, path, spreads, out)?;
                }
                Q::Selection::FragmentSpread(Positioned { node: spread, .. }) => {
                    let name = spread.fragment_name.node.as_str();
                    if spreads.iter().any(|spread| spread == name) {
                        continue;
                    }
                    let fragment = self.fragments.get(name).ok_or_else(|| {
                        InvalidQueryError::new(
                            to_path(path),
                            format!("fragment `{}` is not defined", name),
                        )
                    })?;
                    let type_condition = fragment.node.type_condition.node.on.node.as_str();
                    self.check_type(type_condition, path)?;

                    spreads.push(name.to_string());
                    let collected = self.collect(
                        &fragment.node.selection_set.node,
                        type_condition,
                        path,
                        spreads,
                        out,
                    );
                    spreads.pop();
                    collected?;
                }
            }
        }
        Ok(())
    }

    fn collect_field(
        &self,
        field: &Q::Field,
        on_type: &str,
        path: &[String],
        spreads: &mut Vec<String>,
        out: &mut Vec<SelectionNode>,
    ) -> Result<(), InvalidQueryError> {
        let name = field.name.node.to_string();
        let alias = field.alias.as_ref().map(|alias| alias.node.to_string());
        let response_key = alias.clone().unwrap_or_else(|| name.clone());
        let mut response_path = path.to_vec();
        response_path.push(response_key.clone());

        let of_type = if name == TYPENAME {
            "String".to_string()
        } else {
            self.index
                .field(on_type, &name)
                .map(|field| field.of_type.clone())
                .ok_or_else(|| {
                    InvalidQueryError::new(
                        to_path(&response_path),
                        format!("`{}` has no field `{}`", on_type, name),
                    )
                })?
        };

        let sub_selection = &field.selection_set.node;
        let is_composite = self.index.has_type(&of_type);
        if is_composite && sub_selection.items.is_empty() {
            return Err(InvalidQueryError::new(
                to_path(&response_path),
                format!("field `{}` of type `{}` needs a selection", name, of_type),
            ));
        }
        if !is_composite && !sub_selection.items.is_empty() {
            return Err(InvalidQueryError::new(
                to_path(&response_path),
                format!("field `{}` of type `{}` has no sub-selection", name, of_type),
            ));
        }

        let arguments: Vec<Argument> = field
            .arguments
            .iter()
            .map(|(name, value)| Argument { name: name.node.to_string(), value: value.node.clone() })
            .collect();
        if let Some(undefined) = arguments
            .iter()
            .flat_map(Argument::variables)
            .find(|variable| !self.variables.iter().any(|defined| defined.name == *variable))
        {
            return Err(InvalidQueryError::new(
                to_path(&response_path),
                format!("variable `${}` is not defined", undefined),
            ));
        }

        let position = out
            .iter()
            .position(|node| node.response_key() == response_key && node.on_type == on_type);
        let node = match position {
            Some(position) => {
                let node = &mut out[position];
                if node.name != name || node.arguments != arguments {
                    return Err(InvalidQueryError::new(
                        to_path(&response_path),
                        format!("conflicting selections for `{}`", response_key),
                    ));
                }
                node
            }
            None => {
                out.push(SelectionNode {
                    name,
                    alias,
                    arguments,
                    response_path: response_path.clone(),
                    on_type: on_type.to_string(),
                    of_type: of_type.clone(),
                    children: SelectionSet::default(),
                    is_hidden: false,
                });
                let last = out.len() - 1;
                &mut out[last]
            }
        };

        self.collect(sub_selection, &of_type, &response_path, spreads, &mut node.children)
    }

    fn check_type(&self, type_name: &str, path: &[String]) -> Result<(), InvalidQueryError> {
        if self.index.has_type(type_name) {
            Ok(())
        } else {
            Err(InvalidQueryError::new(
                to_path(path),
                format!("type `{}` is not defined", type_name),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use blueprint::Blueprint;
    use pretty_assertions::assert_eq;

    use super::*;

    fn index() -> SchemaIndex {
        Blueprint::parse_sdl(include_str!("fixtures/supergraph.graphql"))
            .unwrap()
            .to_index()
            .unwrap()
    }

    fn parse(query: &str) -> Result<Operation, PlanError> {
        Operation::parse(query, None, &index())
    }

    #[test]
    fn test_parse_query() {
        let operation = parse("{ me { id handle: username } }").unwrap();

        assert_eq!(operation.kind, OperationKind::Query);
        assert_eq!(operation.root_type, "Query");
        assert_eq!(operation.selection.to_string(), "{ me { id handle: username } }");

        let me = operation.selection.find("me").unwrap();
        assert_eq!(me.of_type, "User");
        let handle = me.children.find("handle").unwrap();
        assert_eq!(handle.name, "username");
        assert_eq!(handle.response_path, vec!["me", "handle"]);
    }

    #[test]
    fn test_parse_arguments() {
        let operation = parse(r#"query($id: ID!) { user(id: $id) { id } topProducts(first: 3) { upc } }"#)
            .unwrap();
        assert_eq!(
            operation.selection.to_string(),
            "{ user(id: $id) { id } topProducts(first: 3) { upc } }"
        );
    }

    #[test]
    fn test_merge_by_response_key() {
        let operation = parse("{ me { id } me { username } }").unwrap();
        assert_eq!(operation.selection.len(), 1);
        assert_eq!(operation.selection.to_string(), "{ me { id username } }");
    }

    #[test]
    fn test_conflicting_response_keys() {
        let error = parse("{ me { name: id name: username } }").unwrap_err();
        assert_eq!(
            error.to_string(),
            "conflicting selections for `name` at [me, name]"
        );
    }

    #[test]
    fn test_fragments() {
        let query = r#"
            query { me { ...UserFields profile { ... on Profile { bio } } } }
            fragment UserFields on User { id username }
        "#;
        let operation = parse(query).unwrap();
        assert_eq!(
            operation.selection.to_string(),
            "{ me { id username profile { bio } } }"
        );
    }

    #[test]
    fn test_type_conditions() {
        let operation = parse("{ node(id: 1) { id ... on Product { name } } }").unwrap();
        let node = operation.selection.find("node").unwrap();

        assert_eq!(node.children[0].on_type, "Node");
        assert_eq!(node.children[1].on_type, "Product");
        assert_eq!(
            operation.selection.to_string(),
            "{ node(id: 1) { id ... on Product { name } } }"
        );
    }

    #[test]
    fn test_cyclic_fragments_are_expanded_once() {
        let query = r#"
            query { me { ...A } }
            fragment A on User { id ...B }
            fragment B on User { username ...A }
        "#;
        let operation = parse(query).unwrap();
        assert_eq!(operation.selection.to_string(), "{ me { id username } }");
    }

    #[test]
    fn test_unknown_field() {
        let error = parse("{ me { email } }").unwrap_err();
        assert_eq!(error.to_string(), "`User` has no field `email` at [me, email]");
    }

    #[test]
    fn test_unknown_fragment() {
        let error = parse("{ me { ...Missing } }").unwrap_err();
        assert_eq!(error.to_string(), "fragment `Missing` is not defined at [me]");
    }

    #[test]
    fn test_missing_sub_selection() {
        let error = parse("{ me }").unwrap_err();
        assert!(matches!(error, PlanError::InvalidQuery(_)));
    }

    #[test]
    fn test_named_operations() {
        let query = r#"
            query First { me { id } }
            mutation Second { logout }
        "#;
        let operation = Operation::parse(query, Some("Second"), &index()).unwrap();
        assert_eq!(operation.kind, OperationKind::Mutation);
        assert_eq!(operation.name.as_deref(), Some("Second"));
        assert_eq!(operation.root_type, "Mutation");

        let error = Operation::parse(query, None, &index()).unwrap_err();
        assert!(matches!(error, PlanError::InvalidQuery(_)));
    }

    #[test]
    fn test_syntax_error() {
        let error = parse("{ me { id }").unwrap_err();
        assert!(matches!(error, PlanError::Parse(_)));
    }

    #[test]
    fn test_subscription_without_root() {
        let error = parse("subscription { me { id } }").unwrap_err();
        assert_eq!(error.to_string(), "the schema defines no subscription root at []");
    }

    #[test]
    fn test_variable_definitions() {
        let operation =
            parse("query($id: ID!, $size: Int = 32) { user(id: $id) { profile { avatar(size: $size) } } }")
                .unwrap();

        assert_eq!(
            operation.variables,
            vec![
                VariableDefinition { name: "id".to_string(), of_type: "ID!".to_string() },
                VariableDefinition { name: "size".to_string(), of_type: "Int".to_string() },
            ]
        );
        assert_eq!(operation.variable("size").map(|v| v.of_type.as_str()), Some("Int"));
        assert_eq!(operation.selection.variables(), vec!["id", "size"]);
    }

    #[test]
    fn test_undefined_variable() {
        let error = parse("{ user(id: $id) { id } }").unwrap_err();
        assert_eq!(error.to_string(), "variable `$id` is not defined at [user]");
    }
}
