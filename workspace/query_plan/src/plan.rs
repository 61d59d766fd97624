use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

use blueprint::{OperationKind, SourceId};
use serde::Serialize;
use valid::{Valid, Validator};

use crate::decompose::FetchFragment;
use crate::fetch::FetchOperation;
use crate::merge::MergeSpec;
use crate::tree::QueryPlan;
use crate::ResponsePath;

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, derive_more::Display,
)]
#[serde(transparent)]
pub struct NodeId(usize);

impl NodeId {
    pub fn new(id: usize) -> Self {
        NodeId(id)
    }

    pub fn as_usize(&self) -> usize {
        self.0
    }
}

/// A single fetch against one source.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanNode {
    pub id: NodeId,
    pub source: SourceId,
    pub fragment: FetchFragment,
    pub fetch: FetchOperation,
    /// Nodes whose results must be merged before this one may start.
    pub depends_on: BTreeSet<NodeId>,
    /// Nodes going to the same source after the same parents.
    pub batch_siblings: BTreeSet<NodeId>,
}

/// The output of planning: fetch nodes in topological order and, at the
/// same positions, the instructions for merging their results.
///
/// Plans are immutable values; they can be cached and shared between
/// executors.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    operation_kind: OperationKind,
    root_path: ResponsePath,
    nodes: Vec<PlanNode>,
    merge_specs: Vec<MergeSpec>,
}

impl Plan {
    pub(crate) fn new(
        operation_kind: OperationKind,
        nodes: Vec<PlanNode>,
        merge_specs: Vec<MergeSpec>,
    ) -> Self {
        Plan { operation_kind, root_path: ResponsePath::root(), nodes, merge_specs }
    }

    pub fn operation_kind(&self) -> OperationKind {
        self.operation_kind
    }

    pub fn root_path(&self) -> &ResponsePath {
        &self.root_path
    }

    pub fn nodes(&self) -> &[PlanNode] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> Option<&PlanNode> {
        self.nodes.get(id.0)
    }

    pub fn merge_specs(&self) -> &[MergeSpec] {
        &self.merge_specs
    }

    pub fn merge_spec(&self, id: NodeId) -> Option<&MergeSpec> {
        self.merge_specs.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Groups nodes into waves: every node runs in the wave after the last
    /// of its parents, so the nodes of one wave can run concurrently.
    pub fn waves(&self) -> Vec<Vec<NodeId>> {
        let mut wave_of: Vec<usize> = Vec::with_capacity(self.nodes.len());
        let mut waves: Vec<Vec<NodeId>> = Vec::new();
        for node in self.nodes.iter() {
            let wave = node
                .depends_on
                .iter()
                .filter_map(|parent| wave_of.get(parent.0))
                .map(|wave| wave + 1)
                .max()
                .unwrap_or(0);
            wave_of.push(wave);
            if waves.len() <= wave {
                waves.resize_with(wave + 1, Vec::new);
            }
            waves[wave].push(node.id);
        }
        waves
    }

    /// The plan as a tree of parallel and sequential fetches.
    pub fn to_tree(&self) -> Valid<Option<QueryPlan>, String> {
        QueryPlan::try_from_plan(self)
    }

    /// Checks the structural guarantees of a plan: ids match positions,
    /// parents precede children, every forwarded key is selected by each
    /// parent and batch siblings share source and parents.
    pub fn validate(&self) -> Valid<(), String> {
        let merge_specs = if self.merge_specs.len() == self.nodes.len() {
            Valid::succeed(())
        } else {
            Valid::fail(format!(
                "{} merge specs for {} nodes",
                self.merge_specs.len(),
                self.nodes.len()
            ))
        };

        let nodes = Valid::from_iter(self.nodes.iter().enumerate(), |(position, node)| {
            self.validate_node(position, node)
                .trace(&format!("node {}", node.id))
        });

        merge_specs.zip(nodes).unit()
    }

    fn validate_node(&self, position: usize, node: &PlanNode) -> Valid<(), String> {
        let id = if node.id.0 == position {
            Valid::succeed(())
        } else {
            Valid::fail(format!("sits at position {}", position))
        };

        let parents = Valid::from_iter(node.depends_on.iter(), |parent| {
            if *parent < node.id {
                self.validate_keys(node, *parent)
            } else {
                Valid::fail(format!("depends on node {} which does not precede it", parent))
            }
        });

        let siblings = Valid::from_iter(node.batch_siblings.iter(), |sibling| {
            match self.node(*sibling) {
                Some(other)
                    if other.id != node.id
                        && other.source == node.source
                        && other.depends_on == node.depends_on =>
                {
                    Valid::succeed(())
                }
                _ => Valid::fail(format!("node {} cannot be batched with it", sibling)),
            }
        });

        id.zip(parents).zip(siblings).unit()
    }

    fn validate_keys(&self, node: &PlanNode, parent: NodeId) -> Valid<(), String> {
        let Some(merge_spec) = self.merge_spec(node.id) else {
            return Valid::succeed(());
        };
        if merge_spec.key_forwarding.is_empty() {
            return Valid::succeed(());
        }
        let Some(parent) = self.node(parent) else {
            return Valid::fail(format!("depends on missing node {}", parent));
        };

        // Keys may also be selected on the declared type of the field
        // leading to the entity, such as an interface it implements.
        let keys = node
            .fragment
            .provided_path
            .keys_below(&parent.fragment.provided_path);
        let scope = keys.as_deref().and_then(|keys| match keys.split_last() {
            Some((last, init)) => parent
                .fragment
                .selection
                .find_path(init)?
                .find(last)
                .map(|field| (&field.children, Some(field.of_type.as_str()))),
            None => Some((&parent.fragment.selection, None)),
        });

        Valid::from_iter(merge_spec.key_forwarding.iter(), |forwarding| {
            let selected = scope.is_some_and(|(selection, enclosing)| {
                selection.iter().any(|field| {
                    field.name == forwarding.source_field
                        && field.alias.is_none()
                        && (field.on_type == node.fragment.on_type
                            || enclosing == Some(field.on_type.as_str()))
                })
            });
            if selected {
                Valid::succeed(())
            } else {
                Valid::fail(format!(
                    "key field `{}` is not selected by node {} at {}",
                    forwarding.source_field, parent.id, node.fragment.provided_path
                ))
            }
        })
        .unit()
    }
}

impl Display for Plan {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Plan({}) {{", self.operation_kind)?;
        for (node, merge_spec) in self.nodes.iter().zip(self.merge_specs.iter()) {
            write!(f, "  [{}] {}", node.id, node.source)?;
            if !merge_spec.attach_path.is_root() {
                write!(f, " at {}", merge_spec.attach_path)?;
            }
            if !node.depends_on.is_empty() {
                let parents: Vec<String> = node.depends_on.iter().map(ToString::to_string).collect();
                write!(f, " after [{}]", parents.join(", "))?;
            }
            if !merge_spec.key_forwarding.is_empty() {
                let keys: Vec<String> = merge_spec
                    .key_forwarding
                    .iter()
                    .map(|forwarding| format!("{} -> {}", forwarding.source_field, forwarding.argument))
                    .collect();
                write!(f, " keys [{}]", keys.join(", "))?;
            }
            if !node.batch_siblings.is_empty() {
                let siblings: Vec<String> =
                    node.batch_siblings.iter().map(ToString::to_string).collect();
                write!(f, " batched [{}]", siblings.join(", "))?;
            }
            let enclosing = node.fragment.is_root().then_some(node.fragment.on_type.as_str());
            writeln!(f, " {}", node.fragment.selection.render(enclosing))?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::merge::KeyForwarding;
    use crate::{SelectionNode, SelectionSet};

    fn fragment(source: &str, on_type: &str, path: ResponsePath, keys: &[&str]) -> FetchFragment {
        FetchFragment {
            source: SourceId::new(source),
            on_type: on_type.to_string(),
            selection: SelectionSet::default(),
            required_keys: keys.iter().map(ToString::to_string).collect(),
            provided_path: path,
        }
    }

    fn node(id: usize, fragment: FetchFragment, depends_on: &[usize]) -> PlanNode {
        PlanNode {
            id: NodeId::new(id),
            source: fragment.source.clone(),
            fragment,
            fetch: FetchOperation::default(),
            depends_on: depends_on.iter().copied().map(NodeId::new).collect(),
            batch_siblings: BTreeSet::new(),
        }
    }

    fn entity_merge(path: ResponsePath) -> MergeSpec {
        MergeSpec {
            attach_path: path,
            key_forwarding: vec![KeyForwarding {
                source_field: "id".to_string(),
                argument: "id".to_string(),
            }],
            entry_field: Some("_entities".to_string()),
        }
    }

    fn root_merge() -> MergeSpec {
        MergeSpec { attach_path: ResponsePath::root(), key_forwarding: vec![], entry_field: None }
    }

    /// `me { <me_selection> }` from accounts, then `profile` from profiles.
    fn two_node_plan(me_selection: Vec<SelectionNode>) -> Plan {
        let me = SelectionNode::new("me", "Query", "User").children(SelectionSet::new(me_selection));
        let mut root = fragment("accounts", "Query", ResponsePath::root(), &[]);
        root.selection = SelectionSet::new(vec![me]);

        let me_path = ResponsePath::root().field("me");
        let mut child = fragment("profiles", "User", me_path.clone(), &["id"]);
        child.selection =
            SelectionSet::new(vec![SelectionNode::new("profile", "User", "Profile")]);

        Plan::new(
            OperationKind::Query,
            vec![node(0, root, &[]), node(1, child, &[0])],
            vec![root_merge(), entity_merge(me_path)],
        )
    }

    #[test]
    fn test_valid_plan() {
        let plan = two_node_plan(vec![SelectionNode::new("id", "User", "ID").is_hidden(true)]);
        assert!(plan.validate().is_succeed());
        assert_eq!(plan.waves(), vec![vec![NodeId::new(0)], vec![NodeId::new(1)]]);
    }

    #[test]
    fn test_missing_key_field() {
        let plan = two_node_plan(vec![SelectionNode::new("username", "User", "String")]);
        let error = plan.validate().to_result().unwrap_err();

        insta::assert_snapshot!(error.to_string().trim_end(), @r"
        Validation Error
        • key field `id` is not selected by node 0 at [me] [node 1]
        ");
    }

    #[test]
    fn test_forward_dependency() {
        let plan = Plan::new(
            OperationKind::Query,
            vec![
                node(0, fragment("accounts", "Query", ResponsePath::root(), &[]), &[1]),
                node(1, fragment("reviews", "Query", ResponsePath::root(), &[]), &[]),
            ],
            vec![root_merge(), root_merge()],
        );
        let error = plan.validate().to_result().unwrap_err();

        assert_eq!(
            error.as_vec()[0].message,
            "depends on node 1 which does not precede it"
        );
    }

    #[test]
    fn test_bad_batch_siblings() {
        let mut plan = two_node_plan(vec![SelectionNode::new("id", "User", "ID")]);
        plan.nodes[1].batch_siblings.insert(NodeId::new(0));

        assert!(!plan.validate().is_succeed());
    }

    #[test]
    fn test_waves() {
        let plan = Plan::new(
            OperationKind::Query,
            vec![
                node(0, fragment("accounts", "Query", ResponsePath::root(), &[]), &[]),
                node(1, fragment("products", "Query", ResponsePath::root(), &[]), &[]),
                node(2, fragment("reviews", "User", ResponsePath::root(), &[]), &[0]),
                node(3, fragment("reviews", "Product", ResponsePath::root(), &[]), &[1, 2]),
            ],
            vec![root_merge(), root_merge(), root_merge(), root_merge()],
        );

        let waves: Vec<Vec<usize>> = plan
            .waves()
            .into_iter()
            .map(|wave| wave.into_iter().map(|id| id.as_usize()).collect())
            .collect();
        assert_eq!(waves, vec![vec![0, 1], vec![2], vec![3]]);
    }

    #[test]
    fn test_display() {
        let plan = two_node_plan(vec![SelectionNode::new("id", "User", "ID").is_hidden(true)]);
        insta::assert_snapshot!(plan.to_string(), @r"
        Plan(query) {
          [0] accounts { me { id } }
          [1] profiles at [me] after [0] keys [id -> id] { ... on User { profile } }
        }
        ");
    }
}
