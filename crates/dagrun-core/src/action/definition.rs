//! Action trait definition.
//!
//! Business logic implements [`Action`]; the graph captures its identity at
//! registration and the runner invokes [`Action::run`] with a fresh
//! [`Tracker`], which is the only handle the action gets on artifacts and
//! metrics.

use serde::{Deserialize, Serialize};

use crate::artifact::tracker::Tracker;

/// Default job group for actions that do not override it.
pub const DEFAULT_JOB_GROUP: &str = "default";

/// Default code version folded into the cache key.
pub const DEFAULT_CODE_VERSION: &str = "1";

/// A named unit of work in an action graph.
///
/// Uses RPITIT (return-position `impl Trait` in traits) for `run`. Graphs
/// store actions as `Arc<dyn ActionDyn>`; see [`super::ActionDyn`].
pub trait Action: Send + Sync + 'static {
    /// Stable, graph-unique name. Defaults to the implementing type's name.
    fn name(&self) -> &str {
        short_type_name::<Self>()
    }

    /// Category label, e.g. "ingest-dataset".
    fn job_type(&self) -> &str;

    /// Logical grouping for related jobs.
    fn job_group(&self) -> &str {
        DEFAULT_JOB_GROUP
    }

    /// Artifact names this action produces. Must be pure and stable.
    fn outputs(&self) -> Vec<String>;

    /// Identity of the action's logic. Bump it when the logic changes so
    /// cached outputs are not reused.
    fn code_version(&self) -> &str {
        DEFAULT_CODE_VERSION
    }

    /// Extra artifact names consumed from non-parent ancestors.
    fn requires(&self) -> Vec<String> {
        Vec::new()
    }

    /// Execute the action's business logic.
    fn run(
        &self,
        tracker: &mut Tracker,
    ) -> impl std::future::Future<Output = anyhow::Result<()>> + Send;
}

/// Permitted inputs and outputs of one action, resolved at registration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionIo {
    /// Flattened parent outputs (parent order, then output order), followed
    /// by `requires` names not already present.
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
}

impl ActionIo {
    /// Compute io from the parents' outputs and the action's own declarations.
    pub fn resolve<'a>(
        parent_outputs: impl IntoIterator<Item = &'a [String]>,
        requires: &[String],
        outputs: Vec<String>,
    ) -> Self {
        let mut inputs: Vec<String> = Vec::new();
        for produced in parent_outputs {
            inputs.extend(produced.iter().cloned());
        }
        for name in requires {
            if !inputs.contains(name) {
                inputs.push(name.clone());
            }
        }
        Self { inputs, outputs }
    }

    pub fn permits_input(&self, name: &str) -> bool {
        self.inputs.iter().any(|n| n == name)
    }

    pub fn permits_output(&self, name: &str) -> bool {
        self.outputs.iter().any(|n| n == name)
    }
}

/// Last path segment of a type name, without generic arguments.
///
/// `my_crate::pipeline::TrainModel<f64>` becomes `TrainModel`.
pub fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
