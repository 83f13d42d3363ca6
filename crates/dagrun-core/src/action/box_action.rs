//! ActionDyn -- object-safe dynamic dispatch for Action.
//!
//! 1. Define an object-safe `ActionDyn` trait with a boxed `run` future
//! 2. Blanket-impl `ActionDyn` for all `T: Action`
//! 3. Graphs hold `Arc<dyn ActionDyn>` so heterogeneous actions share a node type

use std::future::Future;
use std::pin::Pin;

use crate::artifact::tracker::Tracker;

use super::definition::Action;

/// Object-safe version of [`Action`] with a boxed `run` future.
pub trait ActionDyn: Send + Sync {
    fn name(&self) -> &str;

    fn job_type(&self) -> &str;

    fn job_group(&self) -> &str;

    fn outputs(&self) -> Vec<String>;

    fn code_version(&self) -> &str;

    fn requires(&self) -> Vec<String>;

    fn run_boxed<'a>(
        &'a self,
        tracker: &'a mut Tracker,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>>;
}

/// Blanket implementation: any `Action` automatically implements `ActionDyn`.
impl<T: Action> ActionDyn for T {
    fn name(&self) -> &str {
        Action::name(self)
    }

    fn job_type(&self) -> &str {
        Action::job_type(self)
    }

    fn job_group(&self) -> &str {
        Action::job_group(self)
    }

    fn outputs(&self) -> Vec<String> {
        Action::outputs(self)
    }

    fn code_version(&self) -> &str {
        Action::code_version(self)
    }

    fn requires(&self) -> Vec<String> {
        Action::requires(self)
    }

    fn run_boxed<'a>(
        &'a self,
        tracker: &'a mut Tracker,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>> {
        Box::pin(self.run(tracker))
    }
}
