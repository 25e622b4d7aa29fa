//! Dispatching requested tests to runner sessions, and keeping their results.

pub mod config;
mod dispatcher;
mod pre_launch;
pub mod store;

pub use config::{
    select_run_config, ConfigError, ConfigSelection, RunConfigSet, StaticConfigResolver,
};
pub use dispatcher::{DispatchError, Dispatcher, RunOutcome};
pub use store::ResultStore;
