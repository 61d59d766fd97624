use derive_setters::Setters;
use serde::{Deserialize, Serialize};

/// Knobs that change the shape of produced plans, never their meaning.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Setters)]
#[serde(default, rename_all = "camelCase")]
pub struct PlannerConfig {
    /// Record fetches that go to the same source after the same parents so
    /// an executor may send them as one request.
    pub batch_siblings: bool,
    /// Carry `__typename` next to the key fields handed to another source.
    pub typename_in_representations: bool,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        PlannerConfig { batch_siblings: true, typename_in_representations: false }
    }
}
