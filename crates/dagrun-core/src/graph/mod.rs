//! Action graph assembly and validation.
//!
//! - `dag` -- `ActionGraph`: registration, toposort, waves, binding checks
//! - `builder` -- `ActionBuilder`: pipeline-specific graph construction

pub mod builder;
pub mod dag;

pub use builder::ActionBuilder;
pub use dag::{ActionGraph, ActionId, ActionNode, GraphError};
