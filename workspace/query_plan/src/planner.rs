use std::sync::Arc;

use blueprint::{Blueprint, OperationKind, SchemaIndex};
use blueprint::error::SchemaError;
use valid::Validator;

use crate::config::PlannerConfig;
use crate::decompose::decompose;
use crate::error::{PlanError, UnsupportedOperationError};
use crate::{Operation, Plan, PlanBuilder};

/// Plans operations against a shared schema index.
///
/// A planner holds no per-operation state: one instance can serve any
/// number of threads, and the same operation always yields the same plan.
#[derive(Clone, Debug)]
pub struct Planner {
    index: Arc<SchemaIndex>,
    config: PlannerConfig,
}

impl Planner {
    pub fn new(index: Arc<SchemaIndex>) -> Self {
        Planner { index, config: PlannerConfig::default() }
    }

    pub fn try_from_blueprint(blueprint: &Blueprint) -> Result<Self, SchemaError> {
        Ok(Planner::new(Arc::new(SchemaIndex::try_new(blueprint)?)))
    }

    pub fn config(mut self, config: PlannerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn index(&self) -> &Arc<SchemaIndex> {
        &self.index
    }

    #[tracing::instrument(level = "debug", skip_all, fields(kind = %operation.kind))]
    pub fn plan(&self, operation: &Operation) -> Result<Plan, PlanError> {
        if operation.kind == OperationKind::Subscription {
            return Err(UnsupportedOperationError { kind: operation.kind }.into());
        }

        let decomposition = decompose(operation, &self.index, &self.config)?;
        let plan = PlanBuilder::new(&self.index, &self.config).build(operation, decomposition)?;

        debug_assert!(plan.validate().is_succeed(), "planner produced an unsound plan");
        tracing::debug!(nodes = plan.len(), "query plan built");
        Ok(plan)
    }

    /// Parses `query` against the planner's schema and plans it.
    pub fn plan_query(&self, query: &str, operation_name: Option<&str>) -> Result<Plan, PlanError> {
        let operation = Operation::parse(query, operation_name, &self.index)?;
        self.plan(&operation)
    }
}
