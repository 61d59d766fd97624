use serde::Serialize;

use crate::decompose::FetchFragment;
use crate::merge::MergeSpec;
use crate::Operation;

const REPRESENTATIONS: &str = "representations";

/// The request a plan node sends to its source.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchOperation {
    /// Operation variables the request refers to, in order of first use.
    /// The executor forwards their values unchanged.
    pub variable_usages: Vec<String>,
    /// Document sent to the source. Entity fetches receive the forwarded
    /// keys as `$representations`.
    pub document: String,
}

impl FetchOperation {
    pub fn new(operation: &Operation, fragment: &FetchFragment, merge_spec: &MergeSpec) -> Self {
        let variable_usages: Vec<String> = fragment
            .selection
            .variables()
            .into_iter()
            .map(str::to_string)
            .collect();
        let mut definitions: Vec<String> = variable_usages
            .iter()
            .filter_map(|name| operation.variable(name))
            .map(|variable| format!("${}: {}", variable.name, variable.of_type))
            .collect();

        let document = match &merge_spec.entry_field {
            None => format!(
                "{}{} {}",
                operation.kind,
                variable_list(&definitions),
                fragment.selection.render(Some(&fragment.on_type))
            ),
            Some(entry_field) => {
                definitions.insert(0, format!("${}: [_Any!]!", REPRESENTATIONS));
                format!(
                    "query{} {{ {}({}: ${}) {} }}",
                    variable_list(&definitions),
                    entry_field,
                    REPRESENTATIONS,
                    REPRESENTATIONS,
                    fragment.selection.render(None)
                )
            }
        };

        FetchOperation { variable_usages, document }
    }
}

fn variable_list(definitions: &[String]) -> String {
    if definitions.is_empty() {
        String::new()
    } else {
        format!("({})", definitions.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use blueprint::{Blueprint, SchemaIndex};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::config::PlannerConfig;
    use crate::decompose::decompose;

    fn index() -> SchemaIndex {
        Blueprint::parse_sdl(include_str!("fixtures/supergraph.graphql"))
            .unwrap()
            .to_index()
            .unwrap()
    }

    fn fetches(query: &str) -> Vec<FetchOperation> {
        let index = index();
        let operation = Operation::parse(query, None, &index).unwrap();
        let decomposition = decompose(&operation, &index, &PlannerConfig::default()).unwrap();
        decomposition
            .fragments
            .iter()
            .map(|fragment| {
                let merge_spec = MergeSpec::emit(&index, fragment).unwrap();
                FetchOperation::new(&operation, fragment, &merge_spec)
            })
            .collect()
    }

    #[test]
    fn test_root_fetch() {
        let fetches = fetches("query($id: ID!) { user(id: $id) { username } }");

        assert_eq!(
            fetches,
            vec![FetchOperation {
                variable_usages: vec!["id".to_string()],
                document: "query($id: ID!) { user(id: $id) { username } }".to_string(),
            }]
        );
    }

    #[test]
    fn test_entity_fetch_forwards_variables() {
        let fetches = fetches(
            "query($id: ID!, $size: Int) { user(id: $id) { profile { avatar(size: $size) } } }",
        );

        assert_eq!(fetches[0].document, "query($id: ID!) { user(id: $id) { id } }");
        assert_eq!(fetches[1].variable_usages, vec!["size"]);
        insta::assert_snapshot!(
            fetches[1].document,
            @"query($representations: [_Any!]!, $size: Int) { _entities(representations: $representations) { ... on User { profile { avatar(size: $size) } } } }"
        );
    }

    #[test]
    fn test_mutation_fetch() {
        let fetches = fetches(r#"mutation { login(username: "ada") { id } }"#);
        assert_eq!(fetches[0].document, r#"mutation { login(username: "ada") { id } }"#);
        assert!(fetches[0].variable_usages.is_empty());
    }
}
