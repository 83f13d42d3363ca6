//! ActionBuilder: assembles the action graph for one pipeline configuration.

use dagrun_types::config::PipelineConfig;

use crate::run::context::RunContext;
use crate::run::runner::{ActionRunner, RunnerError};

use super::dag::{ActionGraph, GraphError};

/// Pipeline definition.
///
/// Implementors only provide [`build_actions`](Self::build_actions); it must
/// be pure graph construction with no I/O. Validation and runner wiring come
/// for free.
pub trait ActionBuilder {
    /// Organizational label stamped on run reports.
    fn project_name(&self) -> &str;

    /// Register the pipeline's actions for the given options.
    fn build_actions(&self, config: &PipelineConfig) -> Result<ActionGraph, GraphError>;

    /// Build and validate the graph. Construction errors surface here,
    /// before anything executes.
    fn to_graph(&self, config: &PipelineConfig) -> Result<ActionGraph, GraphError> {
        let graph = self.build_actions(config)?;
        graph.validate()?;
        tracing::debug!(
            project = self.project_name(),
            actions = graph.len(),
            "built action graph"
        );
        Ok(graph)
    }

    /// Build a runner for the validated graph.
    fn to_runner(
        &self,
        config: &PipelineConfig,
        context: RunContext,
    ) -> Result<ActionRunner, RunnerError> {
        let graph = self.to_graph(config)?;
        Ok(ActionRunner::new(graph, context)?.with_project(self.project_name()))
    }
}
