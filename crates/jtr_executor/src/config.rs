//! Picking the run configuration a dispatch uses.

use std::path::PathBuf;

use async_trait::async_trait;
use jtr_protocol::TestItem;
use jtr_runner::{BoxError, Notifier, RunConfig, RunConfigResolver};
use serde_derive::{Deserialize, Serialize};

/// The run configurations declared under one project root, separately for running and for
/// debugging tests.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(default)]
pub struct RunConfigSet {
    pub root: Option<PathBuf>,
    pub run: Vec<RunConfig>,
    pub debug: Vec<RunConfig>,
}

impl RunConfigSet {
    pub fn for_mode(&self, is_debug: bool) -> &[RunConfig] {
        if is_debug {
            &self.debug
        } else {
            &self.run
        }
    }
}

const MULTI_ROOT_WARNING: &str =
    "configuration selection not supported across multiple project roots";

/// Which configuration the caller asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSelection {
    /// The one marked `default`.
    Default,
    Named(String),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no run configuration named {0:?}")]
    NotFound(String),
}

/// Selects a configuration out of every root's declarations for the mode the tests run in.
///
/// Default selection is only supported with a single project root; with several, or with none
/// marked `default`, there is no configuration and runs use the built-in defaults. Named
/// selection searches all roots.
pub fn select_run_config(
    sets: &[RunConfigSet],
    selection: &ConfigSelection,
    is_debug: bool,
    notifier: &dyn Notifier,
) -> Result<Option<RunConfig>, ConfigError> {
    match selection {
        ConfigSelection::Default => {
            let [set] = sets else {
                if sets.len() > 1 {
                    notifier.warn(MULTI_ROOT_WARNING);
                }
                return Ok(None);
            };
            let mut candidates = set.for_mode(is_debug).iter().filter(|config| config.default);
            let Some(first) = candidates.next() else {
                return Ok(None);
            };
            if candidates.next().is_some() {
                notifier.warn(&format!(
                    "ambiguous default run configuration; using {:?}",
                    first.name
                ));
            }
            Ok(Some(first.clone()))
        }
        ConfigSelection::Named(name) => {
            if sets.len() > 1 {
                notifier.warn(MULTI_ROOT_WARNING);
            }
            sets.iter()
                .flat_map(|set| set.for_mode(is_debug))
                .find(|config| &config.name == name)
                .cloned()
                .map(Some)
                .ok_or_else(|| ConfigError::NotFound(name.clone()))
        }
    }
}

/// Hands every group the same configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticConfigResolver(pub RunConfig);

#[async_trait]
impl RunConfigResolver for StaticConfigResolver {
    async fn resolve(&self, _project: &str, _tests: &[TestItem]) -> Result<RunConfig, BoxError> {
        Ok(self.0.clone())
    }
}
