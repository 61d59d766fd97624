use valid::{Transform, Valid, Validator};

use crate::QueryPlan;

/// Drops redundant nesting: single-item steps are replaced by their item and
/// a step of the same kind is spliced into its parent.
#[derive(Clone, Copy, Debug, Default)]
pub struct Minify;

impl Minify {
    fn wrap(&self, items: Vec<QueryPlan>, parallel: bool) -> Valid<QueryPlan, String> {
        if items.is_empty() {
            let name = if parallel { "Parallel" } else { "Sequence" };
            return Valid::fail(format!("Empty {}", name));
        }

        Valid::from_iter(items, |item| self.transform(item)).map(|items| {
            let mut flat = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    QueryPlan::Parallel(inner) if parallel => flat.extend(inner),
                    QueryPlan::Sequence(inner) if !parallel => flat.extend(inner),
                    item => flat.push(item),
                }
            }
            if flat.len() == 1 {
                if let Some(item) = flat.pop() {
                    return item;
                }
            }
            if parallel {
                QueryPlan::Parallel(flat)
            } else {
                QueryPlan::Sequence(flat)
            }
        })
    }
}

impl Transform for Minify {
    type Value = QueryPlan;
    type Error = String;

    fn transform(&self, input: Self::Value) -> Valid<Self::Value, Self::Error> {
        match input {
            QueryPlan::Parallel(items) => self.wrap(items, true),
            QueryPlan::Sequence(items) => self.wrap(items, false),
            QueryPlan::Fetch { .. } => Valid::succeed(input),
            QueryPlan::Flatten { path, plan } => self
                .transform(*plan)
                .map(|plan| QueryPlan::Flatten { path, plan: Box::new(plan) }),
        }
    }
}
