use std::collections::BTreeSet;

use blueprint::{OperationKind, SchemaIndex, SourceId};
use indexmap::IndexMap;

use crate::config::PlannerConfig;
use crate::decompose::Decomposition;
use crate::error::PlanError;
use crate::fetch::FetchOperation;
use crate::merge::MergeSpec;
use crate::{NodeId, Operation, Plan, PlanNode};

/// Turns fetch fragments into plan nodes and their merge specs.
pub struct PlanBuilder<'a> {
    index: &'a SchemaIndex,
    config: &'a PlannerConfig,
}

impl<'a> PlanBuilder<'a> {
    pub fn new(index: &'a SchemaIndex, config: &'a PlannerConfig) -> Self {
        PlanBuilder { index, config }
    }

    #[tracing::instrument(level = "trace", skip_all, name = "build_plan")]
    pub fn build(
        &self,
        operation: &Operation,
        decomposition: Decomposition,
    ) -> Result<Plan, PlanError> {
        let parents: Vec<BTreeSet<NodeId>> = (0..decomposition.fragments.len())
            .map(|child| {
                decomposition
                    .parents_of(child)
                    .map(|dependency| NodeId::new(dependency.parent))
                    .collect()
            })
            .collect();

        let mut nodes = Vec::with_capacity(parents.len());
        let mut merge_specs = Vec::with_capacity(parents.len());
        for ((position, fragment), depends_on) in
            decomposition.fragments.into_iter().enumerate().zip(parents)
        {
            let merge_spec = MergeSpec::emit(self.index, &fragment)?;
            nodes.push(PlanNode {
                id: NodeId::new(position),
                source: fragment.source.clone(),
                fetch: FetchOperation::new(operation, &fragment, &merge_spec),
                fragment,
                depends_on,
                batch_siblings: BTreeSet::new(),
            });
            merge_specs.push(merge_spec);
        }

        if self.config.batch_siblings {
            assign_batches(operation.kind, &mut nodes);
        }

        Ok(Plan::new(operation.kind, nodes, merge_specs))
    }
}

/// Nodes going to one source after the same parents may share a request.
/// Root mutation fetches never do: each runs on its own.
fn assign_batches(operation_kind: OperationKind, nodes: &mut [PlanNode]) {
    let mut groups: IndexMap<(SourceId, BTreeSet<NodeId>), Vec<NodeId>> = IndexMap::new();
    let batchable = nodes.iter().filter(|node| {
        operation_kind != OperationKind::Mutation || !node.fragment.is_root()
    });
    for node in batchable {
        groups
            .entry((node.source.clone(), node.depends_on.clone()))
            .or_default()
            .push(node.id);
    }

    for members in groups.into_values().filter(|members| members.len() > 1) {
        for id in members.iter() {
            nodes[id.as_usize()].batch_siblings =
                members.iter().filter(|member| *member != id).copied().collect();
        }
    }
}
