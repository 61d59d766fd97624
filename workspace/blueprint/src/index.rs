use std::collections::{BTreeMap, BTreeSet, HashSet};

use valid::{Valid, Validator};

use crate::error::SchemaError;
use crate::{Blueprint, FieldDefinition, OperationKind, SourceId, TypeDefinition};

/// Field used to re-enter an entity when a source does not name one.
pub const DEFAULT_ENTRY_FIELD: &str = "_entities";

const TYPENAME: &str = "__typename";

/// Read-only lookup structure answering "who can resolve this field" and
/// "how is this type re-entered from another source".
///
/// An index is never mutated once built. Reloading a schema means building
/// a new index and swapping the shared reference handed to planners.
#[derive(Clone, Debug)]
pub struct SchemaIndex {
    query: String,
    mutation: Option<String>,
    subscription: Option<String>,
    sources: Vec<SourceId>,
    types: BTreeMap<String, TypeIndex>,
}

#[derive(Clone, Debug)]
struct TypeIndex {
    sources: Vec<SourceId>,
    key: Vec<String>,
    fields: BTreeMap<String, FieldIndex>,
    entry_points: BTreeMap<SourceId, EntryPoint>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldIndex {
    /// Sources able to resolve the field, in preference order.
    pub owners: Vec<SourceId>,
    /// Name of the innermost named output type.
    pub of_type: String,
    pub is_list: bool,
    requires: BTreeMap<SourceId, Vec<String>>,
    provides: BTreeMap<SourceId, Vec<String>>,
}

impl FieldIndex {
    /// Fields of the enclosing type `source` needs next to the key before it
    /// can resolve this field.
    pub fn requires(&self, source: &SourceId) -> &[String] {
        self.requires.get(source).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Fields of the returned type `source` resolves under this field.
    pub fn provides(&self, source: &SourceId) -> &[String] {
        self.provides.get(source).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// How a source lets other sources re-enter one of its entity types.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntryPoint {
    pub source: SourceId,
    pub field: String,
    /// The key this source declares for the type, in declaration order.
    pub key: Vec<String>,
    arguments: BTreeMap<String, String>,
}

impl EntryPoint {
    /// Argument receiving `field`, named after the field unless the schema
    /// overrides it.
    pub fn argument_for<'a>(&'a self, field: &'a str) -> &'a str {
        self.arguments
            .get(field)
            .map(String::as_str)
            .unwrap_or(field)
    }
}

impl SchemaIndex {
    pub fn try_new(blueprint: &Blueprint) -> Result<SchemaIndex, SchemaError> {
        let known_sources: BTreeSet<&SourceId> = blueprint.sources.iter().collect();

        check_duplicates(blueprint)
            .and_then(|_| {
                Valid::from_iter(blueprint.types.iter(), |definition| {
                    index_type(definition, &known_sources)
                        .map(|type_index| (definition.name.clone(), type_index))
                        .trace(&definition.name)
                })
            })
            .map(|types| SchemaIndex {
                query: blueprint.query.clone(),
                mutation: blueprint.mutation.clone(),
                subscription: blueprint.subscription.clone(),
                sources: blueprint.sources.clone(),
                types: types.into_iter().collect(),
            })
            .and_then(|index| {
                index
                    .check_roots()
                    .zip(index.check_provides())
                    .and_then(|_| index.check_reachability())
                    .map(|_| index)
            })
            .to_result()
            .map_err(SchemaError::from)
            .inspect(|index| {
                tracing::debug!(
                    types = index.types.len(),
                    sources = index.sources.len(),
                    "schema index built"
                )
            })
    }

    pub fn has_type(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }

    pub fn root_type(&self, kind: OperationKind) -> Option<&str> {
        match kind {
            OperationKind::Query => Some(self.query.as_str()),
            OperationKind::Mutation => self.mutation.as_deref(),
            OperationKind::Subscription => self.subscription.as_deref(),
        }
    }

    pub fn is_root_type(&self, type_name: &str) -> bool {
        self.query == type_name
            || self.mutation.as_deref() == Some(type_name)
            || self.subscription.as_deref() == Some(type_name)
    }

    /// Sources declaring `type_name`, in declaration order.
    pub fn sources_of(&self, type_name: &str) -> &[SourceId] {
        self.types
            .get(type_name)
            .map(|type_index| type_index.sources.as_slice())
            .unwrap_or(&[])
    }

    /// Sources able to resolve `type_name.field`, most preferred first.
    /// Empty when nobody can.
    pub fn owners_of(&self, type_name: &str, field: &str) -> &[SourceId] {
        if field == TYPENAME {
            return self.sources_of(type_name);
        }
        self.field(type_name, field)
            .map(|field| field.owners.as_slice())
            .unwrap_or(&[])
    }

    /// The first entity key declared for `type_name`, empty for value types.
    /// Sources may declare different keys; [`EntryPoint::key`] holds the one
    /// a given source expects.
    pub fn entity_key_of(&self, type_name: &str) -> &[String] {
        self.types
            .get(type_name)
            .map(|type_index| type_index.key.as_slice())
            .unwrap_or(&[])
    }

    pub fn field(&self, type_name: &str, field: &str) -> Option<&FieldIndex> {
        self.types.get(type_name)?.fields.get(field)
    }

    pub fn entry_point(&self, type_name: &str, source: &SourceId) -> Option<&EntryPoint> {
        self.types.get(type_name)?.entry_points.get(source)
    }

    fn check_roots(&self) -> Valid<(), String> {
        let roots = std::iter::once(Some(&self.query))
            .chain([self.mutation.as_ref(), self.subscription.as_ref()])
            .flatten();
        Valid::from_iter(roots, |root| {
            if self.has_type(root) {
                Valid::succeed(())
            } else {
                Valid::fail(format!("root type `{}` is not defined", root))
            }
        })
        .unit()
    }

    /// Provided fields must exist on the type the providing field returns.
    fn check_provides(&self) -> Valid<(), String> {
        Valid::from_iter(self.types.iter(), |(type_name, type_index)| {
            Valid::from_iter(type_index.fields.iter(), |(field_name, field)| {
                let provided = field.provides.values().flatten().filter(|provided| {
                    self.field(&field.of_type, provided).is_none() && provided.as_str() != TYPENAME
                });
                Valid::from_iter(provided, |provided| {
                    Valid::<(), String>::fail(format!(
                        "provided field `{}` is not defined on `{}`",
                        provided, field.of_type
                    ))
                })
                .trace(field_name)
            })
            .trace(type_name)
        })
        .unit()
    }

    /// A type returned by fields of several sources must be re-enterable,
    /// unless every reaching source resolves all of its fields.
    fn check_reachability(&self) -> Valid<(), String> {
        let mut reached_from: BTreeMap<&str, Vec<&SourceId>> = BTreeMap::new();
        for type_index in self.types.values() {
            for field in type_index.fields.values() {
                let sources = reached_from.entry(field.of_type.as_str()).or_default();
                for owner in field.owners.iter() {
                    if !sources.contains(&owner) {
                        sources.push(owner);
                    }
                }
            }
        }

        Valid::from_iter(reached_from, |(type_name, sources)| {
            let Some(type_index) = self.types.get(type_name) else {
                return Valid::succeed(());
            };
            let is_shared = sources.iter().all(|source| {
                type_index
                    .fields
                    .values()
                    .all(|field| field.owners.contains(source))
            });
            if sources.len() < 2
                || !type_index.key.is_empty()
                || is_shared
                || self.is_root_type(type_name)
            {
                return Valid::succeed(());
            }
            let names: Vec<&str> = sources.iter().map(|source| source.as_str()).collect();
            Valid::fail(format!(
                "type is reachable from sources [{}] but declares no entity key",
                names.join(", ")
            ))
            .trace(type_name)
        })
        .unit()
    }
}

fn check_duplicates(blueprint: &Blueprint) -> Valid<(), String> {
    let mut seen = HashSet::new();
    Valid::from_iter(blueprint.types.iter(), |definition| {
        if seen.insert(definition.name.as_str()) {
            Valid::succeed(())
        } else {
            Valid::fail(format!("type `{}` is defined more than once", definition.name))
        }
    })
    .unit()
}

fn index_type(
    definition: &TypeDefinition,
    known_sources: &BTreeSet<&SourceId>,
) -> Valid<TypeIndex, String> {
    let sources: Vec<SourceId> = definition
        .join_types
        .iter()
        .map(|join_type| join_type.graph.clone())
        .collect();

    let declared = Valid::from_iter(sources.iter(), |source| {
        if known_sources.contains(source) {
            Valid::succeed(())
        } else {
            Valid::fail(format!("source `{}` is not declared by the schema", source))
        }
    });

    let keys = entity_keys(definition);

    let fields = Valid::from_iter(definition.fields.iter(), |field| {
        index_field(definition, field, &sources).map(|index| (field.name.clone(), index))
    });

    declared
        .zip(keys)
        .zip(fields)
        .and_then(|((_, keys), fields)| {
            let fields: BTreeMap<String, FieldIndex> = fields.into_iter().collect();
            let key = keys.first().map(|(_, key)| key.clone()).unwrap_or_default();
            entry_points(definition, &keys).map(|entry_points| TypeIndex {
                sources: sources.clone(),
                key,
                fields,
                entry_points,
            })
        })
}

fn index_field(
    definition: &TypeDefinition,
    field: &FieldDefinition,
    sources: &[SourceId],
) -> Valid<FieldIndex, String> {
    let owners: Vec<SourceId> = if field.join_fields.is_empty() {
        sources.to_vec()
    } else {
        field
            .join_fields
            .iter()
            .filter(|join_field| !join_field.is_external())
            .filter_map(|join_field| join_field.graph.clone())
            .collect()
    };

    let owned = Valid::from_iter(owners.iter(), |owner| {
        if sources.contains(owner) {
            Valid::succeed(())
        } else {
            Valid::fail(format!(
                "field is owned by `{}` which does not declare `{}`",
                owner, definition.name
            ))
        }
    });

    let requires = Valid::from_iter(
        field.join_fields.iter().filter_map(|join_field| {
            Some((join_field.graph.clone()?, join_field.requires.as_deref()?))
        }),
        |(graph, fields)| {
            field_set(fields)
                .and_then(|fields| {
                    Valid::from_iter(fields, |required| {
                        if definition.get_field(&required).is_some() {
                            Valid::succeed(required)
                        } else {
                            Valid::fail(format!(
                                "required field `{}` is not defined on `{}`",
                                required, definition.name
                            ))
                        }
                    })
                })
                .map(|fields| (graph, fields))
        },
    );

    let provides = Valid::from_iter(
        field.join_fields.iter().filter_map(|join_field| {
            Some((join_field.graph.clone()?, join_field.provides.as_deref()?))
        }),
        |(graph, fields)| field_set(fields).map(|fields| (graph, fields)),
    );

    owned
        .zip(requires)
        .zip(provides)
        .map(|((_, requires), provides)| FieldIndex {
            owners,
            of_type: field.of_type.name().to_string(),
            is_list: field.of_type.is_list(),
            requires: requires.into_iter().collect(),
            provides: provides.into_iter().collect(),
        })
        .trace(&field.name)
}

/// Splits a flat field set such as `"id sku"`.
fn field_set(fields: &str) -> Valid<Vec<String>, String> {
    if fields.contains('{') || fields.contains('}') {
        return Valid::fail(format!("nested field set `{}` is not supported", fields));
    }
    Valid::succeed(fields.split_whitespace().map(str::to_string).collect())
}

/// Every non-empty `key` declared for the type, with the source declaring it.
fn entity_keys(definition: &TypeDefinition) -> Valid<Vec<(SourceId, Vec<String>)>, String> {
    let declared = definition.join_types.iter().filter_map(|join_type| {
        join_type
            .key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .map(|key| (join_type.graph.clone(), key))
    });

    Valid::from_iter(declared, |(graph, key)| {
        field_set(key)
            .and_then(|fields| {
                Valid::from_iter(fields, |field| {
                    if definition.get_field(&field).is_some() {
                        Valid::succeed(field)
                    } else {
                        Valid::fail(format!("entity key field `{}` is not defined on the type", field))
                    }
                })
            })
            .trace(graph.as_str())
            .map(|fields| (graph, fields))
    })
}

fn entry_points(
    definition: &TypeDefinition,
    keys: &[(SourceId, Vec<String>)],
) -> Valid<BTreeMap<SourceId, EntryPoint>, String> {
    let re_enterable = definition.join_types.iter().filter_map(|join_type| {
        keys.iter()
            .find(|(graph, _)| *graph == join_type.graph)
            .filter(|_| join_type.resolvable)
            .map(|(_, key)| (join_type, key))
    });

    Valid::from_iter(re_enterable, |(join_type, key)| {
        Valid::from_iter(join_type.arguments.keys(), |field| {
            if key.contains(field) || definition.get_field(field).is_some() {
                Valid::succeed(())
            } else {
                Valid::fail(format!(
                    "argument override for `{}` in `{}` does not name a field",
                    field, join_type.graph
                ))
            }
        })
        .map(|_| {
            let entry_point = EntryPoint {
                source: join_type.graph.clone(),
                field: join_type
                    .entry_field
                    .clone()
                    .unwrap_or_else(|| DEFAULT_ENTRY_FIELD.to_string()),
                key: key.clone(),
                arguments: join_type.arguments.clone(),
            };
            (join_type.graph.clone(), entry_point)
        })
    })
    .map(|entries| entries.into_iter().collect())
}
