//! Artifact persistence and the per-action tracker session.
//!
//! - `store` -- `ArtifactStore` port (RPITIT), implemented in dagrun-infra
//! - `box_store` -- object-safe `BoxArtifactStore` for runtime backend selection
//! - `memory` -- in-process store for tests and embedding
//! - `keys` -- relative object keys from local paths
//! - `tracker` -- `Tracker`, the only artifact surface an action sees

pub mod box_store;
pub mod keys;
pub mod memory;
pub mod store;
pub mod tracker;

pub use box_store::{ArtifactStoreDyn, BoxArtifactStore};
pub use store::ArtifactStore;
pub use tracker::{ArtifactError, OutputSpec, Tracker};
