use blueprint::{OperationKind, SchemaIndex, SourceId};
use indexmap::IndexMap;
use serde::Serialize;

use crate::config::PlannerConfig;
use crate::error::{PlanError, UngroupableSelectionError, UnresolvableFieldError};
use crate::model::TYPENAME;
use crate::{Operation, ResponsePath, SelectionNode, SelectionSet};

/// Index of a fragment inside a [`Decomposition`]. Parents always come
/// before their children.
pub type FragmentId = usize;

/// A contiguous piece of the operation resolvable by a single source.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchFragment {
    pub source: SourceId,
    /// Root type for root fragments, the re-entered entity type otherwise.
    pub on_type: String,
    pub selection: SelectionSet,
    /// Fields the fragment receives from its parent: the target's entity key
    /// followed by whatever its fields require. Empty at the root.
    pub required_keys: Vec<String>,
    /// Where the fragment's result lands in the response.
    pub provided_path: ResponsePath,
}

impl FetchFragment {
    pub fn is_root(&self) -> bool {
        self.required_keys.is_empty()
    }
}

/// `child` can only run once `parent` has produced `keys`. Empty keys order
/// the two fetches without forwarding anything.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Dependency {
    pub parent: FragmentId,
    pub child: FragmentId,
    pub keys: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Decomposition {
    pub fragments: Vec<FetchFragment>,
    pub dependencies: Vec<Dependency>,
}

impl Decomposition {
    pub fn parents_of(&self, child: FragmentId) -> impl Iterator<Item = &Dependency> {
        self.dependencies
            .iter()
            .filter(move |dependency| dependency.child == child)
    }
}

/// Splits `operation` into fetch fragments, one per maximal run of fields
/// a single source can resolve.
#[tracing::instrument(level = "trace", skip_all, name = "decompose")]
pub fn decompose(
    operation: &Operation,
    index: &SchemaIndex,
    config: &PlannerConfig,
) -> Result<Decomposition, PlanError> {
    let mut decomposer = Decomposer { index, config, drafts: Vec::new(), dependencies: Vec::new() };
    decomposer.split_root(operation)?;

    Ok(Decomposition {
        fragments: decomposer.drafts,
        dependencies: decomposer.dependencies,
    })
}

/// How a selection reaches the source owning it.
enum Hop {
    /// The current source selects `keys` and hands them over.
    Direct { keys: Vec<String> },
    /// The current source cannot supply `keys`; `base` is entered with
    /// `base_keys` first and supplies them instead.
    Bridged { base: SourceId, base_keys: Vec<String>, keys: Vec<String> },
}

struct Bridge<'s> {
    source: SourceId,
    type_name: String,
    fields: Vec<&'s SelectionNode>,
    base: SourceId,
    base_keys: Vec<String>,
    keys: Vec<String>,
}

struct Decomposer<'a> {
    index: &'a SchemaIndex,
    config: &'a PlannerConfig,
    drafts: Vec<FetchFragment>,
    dependencies: Vec<Dependency>,
}

impl Decomposer<'_> {
    fn split_root(&mut self, operation: &Operation) -> Result<(), PlanError> {
        let serial = operation.kind == OperationKind::Mutation;
        let root = ResponsePath::root();

        // Mutation fields keep their order: consecutive fields of one source
        // form a run, runs execute one after the other.
        let mut groups: Vec<(SourceId, Vec<&SelectionNode>)> = Vec::new();
        for field in operation.selection.iter() {
            if field.is_typename() {
                continue;
            }
            let owner = self.choose_owner(field, None, &root)?;
            let group = if serial {
                groups.last_mut().filter(|(source, _)| *source == owner)
            } else {
                groups.iter_mut().find(|(source, _)| *source == owner)
            };
            match group {
                Some((_, fields)) => fields.push(field),
                None => groups.push((owner, vec![field])),
            }
        }

        let mut previous_run = None;
        for (source, fields) in groups {
            let id = self.allocate(source, &operation.root_type, root.clone(), Vec::new());
            // A run waits for the previous run and every fetch completing it.
            if let Some(start) = previous_run.filter(|_| serial) {
                self.dependencies.extend(
                    (start..id).map(|parent| Dependency { parent, child: id, keys: Vec::new() }),
                );
            }
            previous_run = Some(id);
            self.fill(id, fields, &root)?;
        }
        Ok(())
    }

    /// Completes `fields` inside the freshly allocated fragment `id`.
    fn fill(
        &mut self,
        id: FragmentId,
        fields: Vec<&SelectionNode>,
        path: &ResponsePath,
    ) -> Result<(), PlanError> {
        let selection = fields
            .into_iter()
            .map(|field| self.complete(field, id, path))
            .collect::<Result<Vec<_>, _>>()?;
        self.drafts[id].selection = SelectionSet::new(selection);
        Ok(())
    }

    /// Copies `field` into fragment `current`, splitting off whatever part of
    /// its sub-selection another source has to resolve.
    fn complete(
        &mut self,
        field: &SelectionNode,
        current: FragmentId,
        path: &ResponsePath,
    ) -> Result<SelectionNode, PlanError> {
        let index = self.index;
        let definition = index.field(&field.on_type, &field.name);
        let mut path = path.field(field.response_key());
        if definition.is_some_and(|definition| definition.is_list) {
            path = path.each();
        }

        let children = if field.children.is_empty() {
            SelectionSet::default()
        } else {
            let provided = definition
                .map(|definition| definition.provides(&self.drafts[current].source))
                .unwrap_or(&[]);
            self.split(&field.children, current, &path, &field.of_type, provided)?
        };
        Ok(SelectionNode { children, ..field.clone() })
    }

    /// Splits the sub-selection of a field returning `enclosing_type`.
    /// `provided` lists the children the current source resolves at this
    /// path without owning them.
    fn split(
        &mut self,
        children: &SelectionSet,
        current: FragmentId,
        path: &ResponsePath,
        enclosing_type: &str,
        provided: &[String],
    ) -> Result<SelectionSet, PlanError> {
        let current_source = self.drafts[current].source.clone();
        let parent_keys = children
            .first()
            .and_then(|child| child.response_path.split_last())
            .map(|(_, parent)| parent.to_vec())
            .unwrap_or_default();
        let mut local = Vec::new();
        let mut remote: IndexMap<(SourceId, String), Vec<&SelectionNode>> = IndexMap::new();

        for child in children.iter() {
            if child.is_typename() {
                local.push(child.clone());
                continue;
            }
            let owner = if provided.contains(&child.name) {
                current_source.clone()
            } else {
                self.choose_owner(child, Some(&current_source), path)?
            };
            if owner == current_source {
                local.push(self.complete(child, current, path)?);
            } else {
                tracing::trace!(
                    field = %child.name,
                    from = %current_source,
                    to = %owner,
                    path = %path,
                    "field leaves the current source"
                );
                remote
                    .entry((owner, child.on_type.clone()))
                    .or_default()
                    .push(child);
            }
        }

        let mut entered: IndexMap<(SourceId, String), FragmentId> = IndexMap::new();
        let mut bridges = Vec::new();
        for ((source, type_name), fields) in remote {
            match self.hop(&type_name, &current_source, &source, &fields, path)? {
                Hop::Direct { keys } => {
                    self.inject_keys(&mut local, &parent_keys, &type_name, enclosing_type, &keys);
                    let child = self.allocate(source.clone(), &type_name, path.clone(), keys.clone());
                    self.dependencies.push(Dependency { parent: current, child, keys });
                    entered.insert((source, type_name), child);
                    self.fill(child, fields, path)?;
                }
                Hop::Bridged { base, base_keys, keys } => bridges.push(Bridge {
                    source,
                    type_name,
                    fields,
                    base,
                    base_keys,
                    keys,
                }),
            }
        }

        for bridge in bridges {
            let Bridge { source, type_name, fields, base, base_keys, keys } = bridge;
            tracing::trace!(
                on_type = %type_name,
                from = %current_source,
                through = %base,
                to = %source,
                path = %path,
                "hop goes through the base source"
            );
            let base_id = match entered.get(&(base.clone(), type_name.clone())) {
                Some(id) => *id,
                None => {
                    self.inject_keys(&mut local, &parent_keys, &type_name, enclosing_type, &base_keys);
                    let id = self.allocate(base.clone(), &type_name, path.clone(), base_keys.clone());
                    self.dependencies.push(Dependency { parent: current, child: id, keys: base_keys });
                    entered.insert((base, type_name.clone()), id);
                    id
                }
            };

            let mut base_selection = std::mem::take(&mut self.drafts[base_id].selection);
            self.inject_keys(&mut base_selection, &parent_keys, &type_name, &type_name, &keys);
            self.drafts[base_id].selection = base_selection;

            let child = self.allocate(source, &type_name, path.clone(), keys.clone());
            self.dependencies.push(Dependency { parent: base_id, child, keys });
            self.fill(child, fields, path)?;
        }

        Ok(SelectionSet::new(local))
    }

    /// Stays with `current` whenever it owns the field, otherwise takes the
    /// most preferred owner.
    fn choose_owner(
        &self,
        field: &SelectionNode,
        current: Option<&SourceId>,
        path: &ResponsePath,
    ) -> Result<SourceId, PlanError> {
        let owners = self.index.owners_of(&field.on_type, &field.name);
        match (current, owners.first()) {
            (_, None) => Err(UnresolvableFieldError {
                type_name: field.on_type.clone(),
                field: field.name.clone(),
                path: path.field(field.response_key()),
            }
            .into()),
            (Some(current), Some(_)) if owners.contains(current) => Ok(current.clone()),
            (_, Some(first)) => Ok(first.clone()),
        }
    }

    /// Works out what `from` hands to `to` so that `to` can resolve `fields`
    /// of `type_name`: the key `to` declares plus every field they require.
    /// When `from` cannot supply all of it, the hop goes through another
    /// source declaring the type that can.
    fn hop(
        &self,
        type_name: &str,
        from: &SourceId,
        to: &SourceId,
        fields: &[&SelectionNode],
        path: &ResponsePath,
    ) -> Result<Hop, PlanError> {
        let index = self.index;
        let ungroupable = |reason: String| UngroupableSelectionError {
            type_name: type_name.to_string(),
            path: path.clone(),
            from: from.clone(),
            to: to.clone(),
            reason,
        };

        let mut keys = match index.entry_point(type_name, to) {
            Some(entry_point) => entry_point.key.clone(),
            None => index.entity_key_of(type_name).to_vec(),
        };
        if keys.is_empty() {
            return Err(ungroupable("the type declares no entity key".to_string()).into());
        }
        for field in fields {
            let required = index
                .field(type_name, &field.name)
                .map(|definition| definition.requires(to))
                .unwrap_or(&[]);
            for name in required {
                if !keys.contains(name) {
                    keys.push(name.clone());
                }
            }
        }

        let resolves = |source: &SourceId, fields: &[String]| {
            fields
                .iter()
                .all(|field| index.owners_of(type_name, field).contains(source))
        };
        if resolves(from, &keys) {
            return Ok(Hop::Direct { keys });
        }

        let bridge = index
            .sources_of(type_name)
            .iter()
            .filter(|base| *base != from && *base != to)
            .find_map(|base| {
                let entry_point = index.entry_point(type_name, base)?;
                (resolves(from, &entry_point.key) && resolves(base, &keys))
                    .then(|| (base.clone(), entry_point.key.clone()))
            });

        match bridge {
            Some((base, base_keys)) => Ok(Hop::Bridged { base, base_keys, keys }),
            None => {
                let missing: Vec<&str> = keys
                    .iter()
                    .filter(|key| !index.owners_of(type_name, key).contains(from))
                    .map(String::as_str)
                    .collect();
                Err(ungroupable(format!(
                    "`{}` cannot resolve [{}] and no other source supplies them",
                    from,
                    missing.join(", ")
                ))
                .into())
            }
        }
    }

    /// Makes sure `selection` holds every key field, adding hidden ones when
    /// the operation did not ask for them. Fields selected on
    /// `enclosing_type` apply to `type_name` as well.
    fn inject_keys(
        &self,
        selection: &mut Vec<SelectionNode>,
        parent_keys: &[String],
        type_name: &str,
        enclosing_type: &str,
        keys: &[String],
    ) {
        let typename = self
            .config
            .typename_in_representations
            .then_some(TYPENAME);
        let wanted = typename.into_iter().chain(keys.iter().map(String::as_str));

        for key in wanted {
            let present = selection.iter().any(|node| {
                node.name == key
                    && node.alias.is_none()
                    && (node.on_type == type_name || node.on_type == enclosing_type)
            });
            if present {
                continue;
            }
            let of_type = self
                .index
                .field(type_name, key)
                .map(|field| field.of_type.as_str())
                .unwrap_or("String");
            let mut response_path = parent_keys.to_vec();
            response_path.push(key.to_string());
            selection.push(
                SelectionNode::new(key, type_name, of_type)
                    .response_path(response_path)
                    .is_hidden(true),
            );
        }
    }

    fn allocate(
        &mut self,
        source: SourceId,
        on_type: &str,
        provided_path: ResponsePath,
        required_keys: Vec<String>,
    ) -> FragmentId {
        let id = self.drafts.len();
        tracing::debug!(
            fragment = id,
            source = %source,
            on_type,
            path = %provided_path,
            "fetch fragment discovered"
        );
        self.drafts.push(FetchFragment {
            source,
            on_type: on_type.to_string(),
            selection: SelectionSet::default(),
            required_keys,
            provided_path,
        });
        id
    }
}
