use std::fmt::{Display, Formatter};

use blueprint::SourceId;
use serde::Serialize;
use valid::{Transform, Valid, Validator};

use crate::transform::Minify;
use crate::{NodeId, Plan, ResponsePath};

/// Execution order of a [`Plan`] as nested parallel and sequential steps.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum QueryPlan {
    Parallel(Vec<QueryPlan>),
    Sequence(Vec<QueryPlan>),
    Fetch { node: NodeId, service: SourceId },
    Flatten { path: ResponsePath, plan: Box<QueryPlan> },
}

impl QueryPlan {
    pub fn fetch(node: NodeId, service: SourceId) -> Self {
        QueryPlan::Fetch { node, service }
    }

    /// One step per wave of the plan, minified. `None` for an empty plan.
    pub fn try_from_plan(plan: &Plan) -> Valid<Option<QueryPlan>, String> {
        if plan.is_empty() {
            return Valid::succeed(None);
        }

        let waves = plan
            .waves()
            .into_iter()
            .map(|wave| {
                let fetches = wave
                    .into_iter()
                    .filter_map(|id| plan.node(id).zip(plan.merge_spec(id)))
                    .map(|(node, merge_spec)| {
                        let fetch = QueryPlan::fetch(node.id, node.source.clone());
                        if merge_spec.attach_path.is_root() {
                            fetch
                        } else {
                            QueryPlan::Flatten {
                                path: merge_spec.attach_path.clone(),
                                plan: Box::new(fetch),
                            }
                        }
                    })
                    .collect();
                QueryPlan::Parallel(fetches)
            })
            .collect();

        Minify.transform(QueryPlan::Sequence(waves)).map(Some)
    }

    /// Fetches in execution order.
    pub fn fetches(&self) -> Vec<NodeId> {
        match self {
            QueryPlan::Parallel(items) | QueryPlan::Sequence(items) => {
                items.iter().flat_map(QueryPlan::fetches).collect()
            }
            QueryPlan::Fetch { node, .. } => vec![*node],
            QueryPlan::Flatten { plan, .. } => plan.fetches(),
        }
    }

    fn write(&self, f: &mut Formatter<'_>, depth: usize) -> std::fmt::Result {
        let indent = "  ".repeat(depth);
        match self {
            QueryPlan::Parallel(items) | QueryPlan::Sequence(items) => {
                let name = if matches!(self, QueryPlan::Parallel(_)) { "Parallel" } else { "Sequence" };
                writeln!(f, "{}{} {{", indent, name)?;
                for item in items {
                    item.write(f, depth + 1)?;
                    writeln!(f, ",")?;
                }
                write!(f, "{}}}", indent)
            }
            QueryPlan::Fetch { node, service } => write!(f, "{}Fetch({}#{})", indent, service, node),
            QueryPlan::Flatten { path, plan } => {
                writeln!(f, "{}Flatten({}) {{", indent, path)?;
                plan.write(f, depth + 1)?;
                write!(f, "\n{}}}", indent)
            }
        }
    }
}

impl Display for QueryPlan {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.write(f, 0)
    }
}
