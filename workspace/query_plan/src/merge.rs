use blueprint::SchemaIndex;
use serde::Serialize;

use crate::decompose::FetchFragment;
use crate::error::KeyForwardingError;
use crate::ResponsePath;

/// How the result of one fetch is stitched into the response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeSpec {
    /// Where the result is attached. The root path merges into the top level.
    pub attach_path: ResponsePath,
    /// Key fields read from the parent result and the entry point arguments
    /// receiving them, in key order.
    pub key_forwarding: Vec<KeyForwarding>,
    /// Field used to re-enter the source, absent for root fetches.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_field: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyForwarding {
    pub source_field: String,
    pub argument: String,
}

impl MergeSpec {
    /// Derives the merge instructions of `fragment` from the schema.
    pub fn emit(index: &SchemaIndex, fragment: &FetchFragment) -> Result<MergeSpec, KeyForwardingError> {
        if fragment.is_root() {
            return Ok(MergeSpec {
                attach_path: fragment.provided_path.clone(),
                key_forwarding: Vec::new(),
                entry_field: None,
            });
        }

        let entry_point = index
            .entry_point(&fragment.on_type, &fragment.source)
            .ok_or_else(|| KeyForwardingError {
                type_name: fragment.on_type.clone(),
                target: fragment.source.clone(),
                field: fragment.required_keys.join(" "),
                path: fragment.provided_path.clone(),
            })?;

        let key_forwarding = fragment
            .required_keys
            .iter()
            .map(|key| KeyForwarding {
                source_field: key.clone(),
                argument: entry_point.argument_for(key).to_string(),
            })
            .collect();

        Ok(MergeSpec {
            attach_path: fragment.provided_path.clone(),
            key_forwarding,
            entry_field: Some(entry_point.field.clone()),
        })
    }

    pub fn is_root(&self) -> bool {
        self.key_forwarding.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use blueprint::{Blueprint, SourceId};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{SelectionNode, SelectionSet};

    fn index() -> SchemaIndex {
        Blueprint::parse_sdl(include_str!("fixtures/supergraph.graphql"))
            .unwrap()
            .to_index()
            .unwrap()
    }

    fn entity_fragment(source: &str, type_name: &str, key: &str) -> FetchFragment {
        FetchFragment {
            source: SourceId::new(source),
            on_type: type_name.to_string(),
            selection: SelectionSet::new(vec![SelectionNode::new("name", type_name, "String")]),
            required_keys: vec![key.to_string()],
            provided_path: ResponsePath::root().field("me"),
        }
    }

    #[test]
    fn test_root_fragment() {
        let fragment = FetchFragment {
            required_keys: Vec::new(),
            provided_path: ResponsePath::root(),
            ..entity_fragment("accounts", "Query", "id")
        };
        let merge_spec = MergeSpec::emit(&index(), &fragment).unwrap();

        assert!(merge_spec.is_root());
        assert_eq!(merge_spec.entry_field, None);
        assert!(merge_spec.attach_path.is_root());
    }

    #[test]
    fn test_entity_fragment() {
        let merge_spec = MergeSpec::emit(&index(), &entity_fragment("accounts", "User", "id")).unwrap();

        assert_eq!(
            merge_spec,
            MergeSpec {
                attach_path: ResponsePath::root().field("me"),
                key_forwarding: vec![KeyForwarding {
                    source_field: "id".to_string(),
                    argument: "id".to_string(),
                }],
                entry_field: Some("_entities".to_string()),
            }
        );
    }

    #[test]
    fn test_argument_override() {
        let merge_spec = MergeSpec::emit(&index(), &entity_fragment("reviews", "User", "id")).unwrap();
        assert_eq!(merge_spec.key_forwarding[0].argument, "authorId");
    }

    #[test]
    fn test_missing_entry_point() {
        let error = MergeSpec::emit(&index(), &entity_fragment("profiles", "Profile", "bio"))
            .unwrap_err();
        insta::assert_snapshot!(
            error,
            @"`profiles` declares no entry point for `Profile` receiving `bio` at [me]"
        );
    }

    #[test]
    fn test_serialize() {
        let merge_spec = MergeSpec::emit(&index(), &entity_fragment("reviews", "User", "id")).unwrap();
        insta::assert_snapshot!(
            serde_json::to_string(&merge_spec).unwrap(),
            @r#"{"attachPath":["me"],"keyForwarding":[{"sourceField":"id","argument":"authorId"}],"entryField":"_entities"}"#
        );
    }
}
