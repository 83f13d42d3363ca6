//! Action graph: registration, cycle detection, stable topological order,
//! dependency waves and artifact binding validation.
//!
//! Actions live as nodes of a `petgraph::DiGraph` with edges pointing from
//! parent to child. Node indices follow registration order (nodes are never
//! removed), which is what the stable tie-break in [`ActionGraph::toposort`]
//! relies on.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use dagrun_types::action::ActionMeta;
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::action::{Action, ActionDyn, ActionIo};
use crate::artifact::keys::is_safe_name;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Graph-unique action identifier (the action's name).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(String);

impl ActionId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ActionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ActionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

// ---------------------------------------------------------------------------
// GraphError
// ---------------------------------------------------------------------------

/// Errors raised while assembling or validating an action graph.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("cycle detected: {}", .path.join(" -> "))]
    Cycle { path: Vec<String> },

    #[error("action '{0}' is already registered")]
    DuplicateAction(String),

    #[error("action '{action}' depends on unregistered action '{parent}'")]
    DanglingDependency { action: String, parent: String },

    #[error("action '{action}' consumes '{artifact}' but no ancestor produces it")]
    UnresolvedArtifact { action: String, artifact: String },

    #[error(
        "action '{action}' consumes '{artifact}' which several ancestors produce: {}",
        .producers.join(", ")
    )]
    AmbiguousArtifact {
        action: String,
        artifact: String,
        producers: Vec<String>,
    },

    #[error("artifact '{artifact}' is produced more than once: {}", .producers.join(", "))]
    DuplicateOutput {
        artifact: String,
        producers: Vec<String>,
    },

    #[error("{kind} name '{name}' is not a valid path segment")]
    InvalidName { kind: &'static str, name: String },

    #[error("unknown action '{0}'")]
    UnknownAction(String),

    #[error("invalid pipeline config: {0}")]
    InvalidConfig(String),
}

// ---------------------------------------------------------------------------
// ActionNode
// ---------------------------------------------------------------------------

/// One registered action with its identity and resolved io.
pub struct ActionNode {
    id: ActionId,
    meta: ActionMeta,
    code_version: String,
    parents: Vec<ActionId>,
    io: ActionIo,
    action: Arc<dyn ActionDyn>,
}

impl ActionNode {
    pub fn id(&self) -> &ActionId {
        &self.id
    }

    pub fn meta(&self) -> &ActionMeta {
        &self.meta
    }

    pub fn code_version(&self) -> &str {
        &self.code_version
    }

    /// Declared parents, in declaration order.
    pub fn parents(&self) -> &[ActionId] {
        &self.parents
    }

    pub fn io(&self) -> &ActionIo {
        &self.io
    }

    pub fn action(&self) -> Arc<dyn ActionDyn> {
        Arc::clone(&self.action)
    }
}

impl fmt::Debug for ActionNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionNode")
            .field("id", &self.id)
            .field("meta", &self.meta)
            .field("code_version", &self.code_version)
            .field("parents", &self.parents)
            .field("io", &self.io)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// ActionGraph
// ---------------------------------------------------------------------------

/// Actions plus parent/child edges.
#[derive(Debug, Default)]
pub struct ActionGraph {
    graph: DiGraph<ActionNode, ()>,
    index: HashMap<ActionId, NodeIndex>,
}

impl ActionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an action after all of its parents.
    ///
    /// Fails with `DuplicateAction` when the name is taken and with
    /// `DanglingDependency` when a parent is not registered yet. Repeated
    /// parents are ignored.
    pub fn add<A: Action>(&mut self, action: A, parents: &[ActionId]) -> Result<ActionId, GraphError> {
        self.add_shared(Arc::new(action), parents)
    }

    /// Register an already type-erased action.
    pub fn add_shared(
        &mut self,
        action: Arc<dyn ActionDyn>,
        parents: &[ActionId],
    ) -> Result<ActionId, GraphError> {
        let id = ActionId::new(action.name());
        if self.index.contains_key(&id) {
            return Err(GraphError::DuplicateAction(id.to_string()));
        }
        // Names become scratch and store path segments.
        if !is_safe_name(id.as_str()) {
            return Err(GraphError::InvalidName {
                kind: "action",
                name: id.to_string(),
            });
        }
        if let Some(name) = action
            .outputs()
            .into_iter()
            .chain(action.requires())
            .find(|name| !is_safe_name(name))
        {
            return Err(GraphError::InvalidName {
                kind: "artifact",
                name,
            });
        }

        let mut declared: Vec<ActionId> = Vec::with_capacity(parents.len());
        for parent in parents {
            if !self.index.contains_key(parent) {
                return Err(GraphError::DanglingDependency {
                    action: id.to_string(),
                    parent: parent.to_string(),
                });
            }
            if !declared.contains(parent) {
                declared.push(parent.clone());
            }
        }

        let io = self.resolve_io(&declared, action.as_ref());
        let node = ActionNode {
            id: id.clone(),
            meta: ActionMeta::new(action.name(), action.job_type(), action.job_group()),
            code_version: action.code_version().to_string(),
            parents: declared,
            io,
            action,
        };

        let idx = self.graph.add_node(node);
        let parent_indices: Vec<NodeIndex> = self.graph[idx]
            .parents
            .iter()
            .filter_map(|p| self.index.get(p).copied())
            .collect();
        for parent_idx in parent_indices {
            self.graph.add_edge(parent_idx, idx, ());
        }
        self.index.insert(id.clone(), idx);

        tracing::debug!(
            action = %id,
            parents = self.graph[idx].parents.len(),
            inputs = self.graph[idx].io.inputs.len(),
            "registered action"
        );
        Ok(id)
    }

    /// Add an edge between two registered actions.
    ///
    /// Recomputes the child's io. The edge may close a cycle; that is
    /// reported by [`toposort`](Self::toposort), not here.
    pub fn add_dependency(&mut self, child: &ActionId, parent: &ActionId) -> Result<(), GraphError> {
        let child_idx = self.node_index(child)?;
        let parent_idx = self.node_index(parent)?;
        if self.graph[child_idx].parents.contains(parent) {
            return Ok(());
        }

        self.graph.add_edge(parent_idx, child_idx, ());
        let mut parents = self.graph[child_idx].parents.clone();
        parents.push(parent.clone());
        let io = self.resolve_io(&parents, self.graph[child_idx].action.as_ref());

        let node = &mut self.graph[child_idx];
        node.parents = parents;
        node.io = io;
        Ok(())
    }

    fn resolve_io(&self, parents: &[ActionId], action: &dyn ActionDyn) -> ActionIo {
        let parent_outputs = parents
            .iter()
            .filter_map(|p| self.index.get(p))
            .map(|&idx| self.graph[idx].io.outputs.as_slice());
        ActionIo::resolve(parent_outputs, &action.requires(), action.outputs())
    }

    fn node_index(&self, id: &ActionId) -> Result<NodeIndex, GraphError> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| GraphError::UnknownAction(id.to_string()))
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn contains(&self, id: &ActionId) -> bool {
        self.index.contains_key(id)
    }

    pub fn get(&self, id: &ActionId) -> Option<&ActionNode> {
        self.index.get(id).map(|&idx| &self.graph[idx])
    }

    /// Resolved io of an action, computed at registration.
    pub fn io(&self, id: &ActionId) -> Option<&ActionIo> {
        self.get(id).map(ActionNode::io)
    }

    /// All action ids in registration order.
    pub fn ids(&self) -> Vec<ActionId> {
        self.graph
            .node_indices()
            .map(|idx| self.graph[idx].id.clone())
            .collect()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &ActionNode> {
        self.graph.node_indices().map(move |idx| &self.graph[idx])
    }

    pub fn parents(&self, id: &ActionId) -> Result<&[ActionId], GraphError> {
        let idx = self.node_index(id)?;
        Ok(&self.graph[idx].parents)
    }

    /// Direct children in registration order.
    pub fn children(&self, id: &ActionId) -> Result<Vec<ActionId>, GraphError> {
        let idx = self.node_index(id)?;
        let mut children: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(idx, Direction::Outgoing)
            .collect();
        children.sort_unstable();
        children.dedup();
        Ok(self.ids_of(children))
    }

    /// Transitive children in registration order.
    pub fn descendants(&self, id: &ActionId) -> Result<Vec<ActionId>, GraphError> {
        let idx = self.node_index(id)?;
        let mut found: Vec<NodeIndex> = self
            .reachable(idx, Direction::Outgoing)
            .into_iter()
            .collect();
        found.sort_unstable();
        Ok(self.ids_of(found))
    }

    fn ids_of(&self, indices: Vec<NodeIndex>) -> Vec<ActionId> {
        indices
            .into_iter()
            .map(|idx| self.graph[idx].id.clone())
            .collect()
    }

    fn reachable(&self, start: NodeIndex, direction: Direction) -> HashSet<NodeIndex> {
        let mut visited = HashSet::new();
        let mut stack = vec![start];
        while let Some(current) = stack.pop() {
            for next in self.graph.neighbors_directed(current, direction) {
                if visited.insert(next) {
                    stack.push(next);
                }
            }
        }
        visited
    }

    // -----------------------------------------------------------------------
    // Ordering
    // -----------------------------------------------------------------------

    /// Order actions so every parent precedes every child.
    ///
    /// Among ready actions the earliest registered goes first, so identical
    /// construction code always yields an identical order. Fails with
    /// `Cycle` naming one concrete cycle.
    pub fn toposort(&self) -> Result<Vec<ActionId>, GraphError> {
        Ok(self.ids_of(self.sorted_indices()?))
    }

    fn sorted_indices(&self) -> Result<Vec<NodeIndex>, GraphError> {
        let mut in_degree: Vec<usize> = self
            .graph
            .node_indices()
            .map(|idx| {
                self.graph
                    .neighbors_directed(idx, Direction::Incoming)
                    .count()
            })
            .collect();

        let mut ready: BTreeSet<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|idx| in_degree[idx.index()] == 0)
            .collect();

        let mut order = Vec::with_capacity(self.graph.node_count());
        while let Some(idx) = ready.pop_first() {
            order.push(idx);
            for child in self.graph.neighbors_directed(idx, Direction::Outgoing) {
                let degree = &mut in_degree[child.index()];
                *degree = degree.saturating_sub(1);
                if *degree == 0 {
                    ready.insert(child);
                }
            }
        }

        if order.len() < self.graph.node_count() {
            let path = self.find_cycle(&order);
            tracing::debug!(cycle = ?path, "action graph has a cycle");
            return Err(GraphError::Cycle { path });
        }
        Ok(order)
    }

    /// Extract one cycle among the actions left over by Kahn's algorithm.
    ///
    /// Every leftover action still has a leftover parent, so walking parents
    /// from any of them must revisit a node.
    fn find_cycle(&self, sorted: &[NodeIndex]) -> Vec<String> {
        let done: HashSet<NodeIndex> = sorted.iter().copied().collect();
        let Some(start) = self.graph.node_indices().find(|idx| !done.contains(idx)) else {
            return Vec::new();
        };

        let mut path = vec![start];
        let mut position: HashMap<NodeIndex, usize> = HashMap::from([(start, 0)]);
        let mut current = start;
        loop {
            let next = self.graph[current]
                .parents
                .iter()
                .filter_map(|p| self.index.get(p).copied())
                .find(|p| !done.contains(p));
            let Some(parent) = next else {
                return Vec::new();
            };

            if let Some(&pos) = position.get(&parent) {
                // path runs child -> parent; report it parent -> child.
                let mut cycle: Vec<String> = path[pos..]
                    .iter()
                    .rev()
                    .map(|&idx| self.graph[idx].id.to_string())
                    .collect();
                if let Some(first) = cycle.first().cloned() {
                    cycle.push(first);
                }
                return cycle;
            }

            position.insert(parent, path.len());
            path.push(parent);
            current = parent;
        }
    }

    /// Group the topological order into dependency waves.
    ///
    /// Depth is 0 for roots and 1 + the maximum parent depth otherwise. All
    /// actions in one wave are independent of each other.
    pub fn layers(&self) -> Result<Vec<Vec<ActionId>>, GraphError> {
        let order = self.sorted_indices()?;
        let mut depths: HashMap<NodeIndex, usize> = HashMap::new();
        let mut layers: Vec<Vec<ActionId>> = Vec::new();

        for idx in order {
            let depth = self
                .graph
                .neighbors_directed(idx, Direction::Incoming)
                .map(|parent| depths.get(&parent).copied().unwrap_or(0) + 1)
                .max()
                .unwrap_or(0);
            depths.insert(idx, depth);
            if layers.len() <= depth {
                layers.resize_with(depth + 1, Vec::new);
            }
            layers[depth].push(self.graph[idx].id.clone());
        }
        Ok(layers)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    /// Check that every consumed artifact has exactly one ancestor producer
    /// and that no artifact name is produced twice anywhere in the graph.
    pub fn validate_artifact_bindings(&self) -> Result<(), GraphError> {
        let mut producers: HashMap<&str, Vec<NodeIndex>> = HashMap::new();
        for idx in self.graph.node_indices() {
            for output in &self.graph[idx].io.outputs {
                producers.entry(output.as_str()).or_default().push(idx);
            }
        }

        for idx in self.graph.node_indices() {
            let node = &self.graph[idx];
            if node.io.inputs.is_empty() {
                continue;
            }
            let ancestors = self.reachable(idx, Direction::Incoming);
            for artifact in &node.io.inputs {
                let mut found: Vec<NodeIndex> = producers
                    .get(artifact.as_str())
                    .map(|all| {
                        all.iter()
                            .copied()
                            .filter(|p| *p != idx && ancestors.contains(p))
                            .collect()
                    })
                    .unwrap_or_default();
                found.dedup();

                match found.len() {
                    0 => {
                        return Err(GraphError::UnresolvedArtifact {
                            action: node.id.to_string(),
                            artifact: artifact.clone(),
                        });
                    }
                    1 => {}
                    _ => {
                        return Err(GraphError::AmbiguousArtifact {
                            action: node.id.to_string(),
                            artifact: artifact.clone(),
                            producers: self.names_of(&found),
                        });
                    }
                }
            }
        }

        for idx in self.graph.node_indices() {
            for output in &self.graph[idx].io.outputs {
                if let Some(all) = producers.get(output.as_str()) {
                    if all.len() > 1 {
                        return Err(GraphError::DuplicateOutput {
                            artifact: output.clone(),
                            producers: self.names_of(all),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    fn names_of(&self, indices: &[NodeIndex]) -> Vec<String> {
        indices
            .iter()
            .map(|&idx| self.graph[idx].id.to_string())
            .collect()
    }

    /// Full structural validation: acyclic plus artifact bindings.
    pub fn validate(&self) -> Result<(), GraphError> {
        self.sorted_indices()?;
        self.validate_artifact_bindings()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
