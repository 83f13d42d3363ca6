//! Actions: named units of work with declared parents and outputs.
//!
//! - `definition` -- the `Action` trait (RPITIT) and its resolved `ActionIo`
//! - `box_action` -- object-safe `ActionDyn` used by the graph for storage

pub mod box_action;
pub mod definition;

pub use box_action::ActionDyn;
pub use definition::{Action, ActionIo, short_type_name};
