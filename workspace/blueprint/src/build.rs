use std::collections::BTreeMap;

use async_graphql_parser::types::{self as Q, TypeKind, TypeSystemDefinition};
use async_graphql_parser::Positioned;
use async_graphql_value::{ConstValue, Name};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use valid::{Valid, Validator};

use crate::error::SchemaError;
use crate::{Blueprint, FieldDefinition, JoinField, JoinType, SourceId, Type, TypeDefinition};

struct Directive {
    name: String,
    arguments: serde_json::Value,
}

#[derive(Deserialize)]
struct JoinGraph {
    name: Option<String>,
}

/// Graph enum values (`ACCOUNTS`) mapped to the source they stand for.
type Graphs = BTreeMap<String, SourceId>;

pub fn parse(doc: Q::ServiceDocument) -> Result<Blueprint, SchemaError> {
    let mut query = None;
    let mut mutation = None;
    let mut subscription = None;
    let mut join_graph = None;
    let mut type_nodes = Vec::new();

    for definition in doc.definitions.into_iter() {
        match definition {
            TypeSystemDefinition::Schema(Positioned { node: schema_node, .. }) => {
                query = query.or(schema_node.query.map(|name| name.node.to_string()));
                mutation = mutation.or(schema_node.mutation.map(|name| name.node.to_string()));
                subscription =
                    subscription.or(schema_node.subscription.map(|name| name.node.to_string()));
            }
            TypeSystemDefinition::Type(Positioned { node: type_node, .. }) => {
                let name = type_node.name.node.to_string();
                let keep = match &type_node.kind {
                    TypeKind::Enum(enum_type) if name == "join__Graph" => {
                        join_graph = Some(enum_type.clone());
                        false
                    }
                    TypeKind::Object(_) | TypeKind::Interface(_) => !is_federation_type(&name),
                    _ => false,
                };
                if keep {
                    type_nodes.push(type_node);
                }
            }
            TypeSystemDefinition::Directive(_) => {}
        }
    }

    let has_type = |name: &str| type_nodes.iter().any(|node| node.name.node.as_str() == name);
    let query = query.unwrap_or_else(|| "Query".to_string());
    let mutation = mutation.or_else(|| has_type("Mutation").then(|| "Mutation".to_string()));
    let subscription =
        subscription.or_else(|| has_type("Subscription").then(|| "Subscription".to_string()));

    let graphs = match join_graph {
        Some(enum_type) => parse_join_graphs(enum_type),
        None => Valid::fail("enumeration `join__Graph` is not defined".to_string()),
    };

    graphs
        .and_then(|(sources, graphs)| {
            Valid::from_iter(type_nodes, |type_node| parse_type(type_node, &graphs))
                .map(|types| Blueprint { query, mutation, subscription, sources, types })
        })
        .to_result()
        .map_err(SchemaError::from)
}

fn is_federation_type(name: &str) -> bool {
    name.starts_with("join__") || name.starts_with("link__") || name.starts_with('_')
}

fn parse_join_graphs(enum_type: Q::EnumType) -> Valid<(Vec<SourceId>, Graphs), String> {
    Valid::from_iter(enum_type.values, |Positioned { node: value, .. }| {
        let enum_value = value.value.node.to_string();
        parse_directives(value.directives)
            .and_then(|directives| find_directive::<JoinGraph>(&directives, "join__graph"))
            .map(|join_graphs| {
                let name = join_graphs
                    .into_iter()
                    .find_map(|graph| graph.name)
                    .unwrap_or_else(|| enum_value.clone());
                (enum_value.clone(), SourceId::new(&name))
            })
            .trace(&enum_value)
    })
    .map(|entries| {
        let sources = entries.iter().map(|(_, source)| source.clone()).collect();
        (sources, entries.into_iter().collect())
    })
    .trace("join__Graph")
}

fn parse_type(type_node: Q::TypeDefinition, graphs: &Graphs) -> Valid<TypeDefinition, String> {
    let name = type_node.name.node.to_string();
    let directives = parse_directives(type_node.directives);
    let field_nodes = match type_node.kind {
        TypeKind::Object(object_type) => object_type.fields,
        TypeKind::Interface(interface_type) => interface_type.fields,
        _ => Vec::new(),
    };

    let join_types = directives
        .and_then(|directives| find_directive::<JoinType>(&directives, "join__type"))
        .and_then(|join_types| {
            Valid::from_iter(join_types, |join_type| {
                resolve_graph(graphs, &join_type.graph).map(|graph| JoinType { graph, ..join_type })
            })
        });

    let fields = Valid::from_iter(field_nodes, |Positioned { node: field_node, .. }| {
        parse_field(field_node, graphs)
    });

    join_types
        .zip(fields)
        .map(|(join_types, fields)| TypeDefinition { name: name.clone(), join_types, fields })
        .trace(&name)
}

fn parse_field(field_node: Q::FieldDefinition, graphs: &Graphs) -> Valid<FieldDefinition, String> {
    let name = field_node.name.node.to_string();
    let of_type = map_type(&field_node.ty.node);
    parse_directives(field_node.directives)
        .and_then(|directives| find_directive::<JoinField>(&directives, "join__field"))
        .and_then(|join_fields| {
            Valid::from_iter(join_fields, |join_field| match join_field.graph.clone() {
                Some(graph) => resolve_graph(graphs, &graph)
                    .map(|graph| JoinField { graph: Some(graph), ..join_field }),
                None => Valid::succeed(join_field),
            })
        })
        .map(|join_fields| FieldDefinition { name: name.clone(), of_type, join_fields })
        .trace(&name)
}

fn resolve_graph(graphs: &Graphs, graph: &SourceId) -> Valid<SourceId, String> {
    Valid::from_option(
        graphs.get(graph.as_str()).cloned(),
        format!("graph `{}` is not a value of `join__Graph`", graph),
    )
}

fn map_type(type_: &Q::Type) -> Type {
    match &type_.base {
        Q::BaseType::Named(name) => Type::Named { name: name.to_string(), required: !type_.nullable },
        Q::BaseType::List(inner_type) => Type::List {
            of_type: Box::new(map_type(inner_type.as_ref())),
            non_null: !type_.nullable,
        },
    }
}

fn parse_directives(directives: Vec<Positioned<Q::ConstDirective>>) -> Valid<Vec<Directive>, String> {
    Valid::from_iter(directives, |Positioned { node: directive_node, .. }| {
        let name = directive_node.name.node.to_string();
        parse_arguments(directive_node.arguments)
            .map(|arguments| Directive { name: name.clone(), arguments })
            .trace(&format!("@{}", name))
    })
}

fn parse_arguments(
    arguments: Vec<(Positioned<Name>, Positioned<ConstValue>)>,
) -> Valid<serde_json::Value, String> {
    Valid::from_iter(arguments, |(name, value)| {
        let name = name.node.to_string();
        match value.node.into_json() {
            Ok(value) => Valid::succeed((name, value)),
            Err(error) => Valid::fail(format!("argument `{}` is not a JSON value: {}", name, error)),
        }
    })
    .map(|entries| serde_json::Value::Object(entries.into_iter().collect()))
}

fn find_directive<Value: DeserializeOwned>(
    directives: &[Directive],
    name: &str,
) -> Valid<Vec<Value>, String> {
    Valid::from_iter(
        directives.iter().filter(|directive| directive.name == name),
        |directive| match serde_json::from_value(directive.arguments.clone()) {
            Ok(value) => Valid::succeed(value),
            Err(error) => Valid::fail(format!("invalid `@{}` arguments: {}", name, error)),
        },
    )
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::error::Error;
    use crate::{Blueprint, JoinField, JoinType, SourceId, Type};

    const SUPERGRAPH: &str = r#"
        schema { query: Query mutation: Mutation }

        enum join__Graph {
            ACCOUNTS @join__graph(name: "accounts", url: "http://accounts")
            REVIEWS @join__graph(name: "reviews", url: "http://reviews")
        }

        type Query @join__type(graph: ACCOUNTS) @join__type(graph: REVIEWS) {
            me: User @join__field(graph: ACCOUNTS)
            topReviews(first: Int): [Review!]! @join__field(graph: REVIEWS)
        }

        type Mutation @join__type(graph: REVIEWS) {
            addReview(body: String): Review
        }

        type User
            @join__type(graph: ACCOUNTS, key: "id")
            @join__type(graph: REVIEWS, key: "id", arguments: {id: "userId"})
        {
            id: ID!
            name: String @join__field(graph: ACCOUNTS)
            reviews: [Review] @join__field(graph: REVIEWS)
        }

        type Review @join__type(graph: REVIEWS, key: "id") {
            id: ID!
            body: String
            author: User @join__field(graph: REVIEWS)
        }
    "#;

    #[test]
    fn test_parse_supergraph() {
        let blueprint = Blueprint::parse_sdl(SUPERGRAPH).unwrap();

        assert_eq!(blueprint.query, "Query");
        assert_eq!(blueprint.mutation.as_deref(), Some("Mutation"));
        assert_eq!(
            blueprint.sources,
            vec![SourceId::new("accounts"), SourceId::new("reviews")]
        );

        let user = blueprint.types.iter().find(|t| t.name == "User").unwrap();
        assert_eq!(
            user.join_types,
            vec![
                JoinType::new(SourceId::new("accounts")).key("id"),
                JoinType::new(SourceId::new("reviews"))
                    .key("id")
                    .argument("id", "userId"),
            ]
        );
        let reviews = user.get_field("reviews").unwrap();
        assert_eq!(
            reviews.join_fields,
            vec![JoinField::new(SourceId::new("reviews"))]
        );
        assert_eq!(reviews.of_type, Type::list(Type::named("Review")));
    }

    #[test]
    fn test_parse_skips_federation_types() {
        let blueprint = Blueprint::parse_sdl(SUPERGRAPH).unwrap();
        let names: Vec<_> = blueprint.types.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Query", "Mutation", "User", "Review"]);
    }

    #[test]
    fn test_parse_unknown_graph() {
        let sdl = r#"
            enum join__Graph { ACCOUNTS @join__graph(name: "accounts") }
            type Query @join__type(graph: PRODUCTS) { name: String }
        "#;
        let error = Blueprint::parse_sdl(sdl).unwrap_err();
        insta::assert_snapshot!(error.to_string().trim_end(), @r"
        Validation Error
        • graph `PRODUCTS` is not a value of `join__Graph` [Query]
        ");
    }

    #[test]
    fn test_parse_without_graph_enum() {
        let sdl = "type Query { name: String }";
        assert!(Blueprint::parse_sdl(sdl).is_err());
    }

    #[test]
    fn test_parse_requires_and_provides() {
        let sdl = r#"
            enum join__Graph { A @join__graph(name: "a") B @join__graph(name: "b") }
            type Query @join__type(graph: A) {
                me: User @join__field(graph: A, provides: "name")
            }
            type User @join__type(graph: A, key: "id") @join__type(graph: B, key: "id") {
                id: ID!
                name: String @join__field(graph: B) @join__field(graph: A, external: true)
                greeting: String @join__field(graph: A, requires: "name")
            }
        "#;
        let blueprint = Blueprint::parse_sdl(sdl).unwrap();
        let a = SourceId::new("a");

        let query = blueprint.types.iter().find(|t| t.name == "Query").unwrap();
        assert_eq!(
            query.get_field("me").unwrap().join_fields,
            vec![JoinField::new(a.clone()).provides("name")]
        );
        let user = blueprint.types.iter().find(|t| t.name == "User").unwrap();
        assert_eq!(
            user.get_field("greeting").unwrap().join_fields,
            vec![JoinField::new(a).requires("name")]
        );
    }

    #[test]
    fn test_malformed_directive_arguments() {
        let sdl = r#"
            enum join__Graph { A @join__graph(name: "a") }
            type Query @join__type(graph: A, key: 3) {
                name: String @join__field(graph: A, external: "yes")
            }
        "#;
        let Error::Schema(error) = Blueprint::parse_sdl(sdl).unwrap_err() else {
            panic!("expected a schema error");
        };
        let messages = error.messages();

        assert_eq!(messages.len(), 2);
        assert!(messages[0].starts_with("Query: invalid `@join__type` arguments"));
        assert!(messages[1].starts_with("Query.name: invalid `@join__field` arguments"));
    }
}
