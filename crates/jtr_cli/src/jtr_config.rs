use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use etcetera::{app_strategy, AppStrategy, AppStrategyArgs};
use jtr_executor::RunConfigSet;
use jtr_runner::RunConfig;
use serde_derive::{Deserialize, Serialize};

#[derive(Deserialize, Serialize, Debug, PartialEq, Eq, Default)]
#[serde(default, deny_unknown_fields)]
pub struct JtrConfig {
    /// JDK to run tests with. Defaults to `$JAVA_HOME`.
    pub java_home: Option<PathBuf>,
    /// The test runner artifact.
    pub runner_jar: PathBuf,
    /// Where sessions keep their scratch files. Defaults to jtr's cache directory.
    pub storage_root: Option<PathBuf>,
    /// Classpath of projects without their own.
    pub classpath: Vec<PathBuf>,
    pub projects: BTreeMap<String, ProjectConfig>,
    /// Run configurations of the project root the configuration file belongs to.
    pub run_configs: Vec<RunConfig>,
    /// Configurations used instead of `run_configs` when runs are debugged.
    pub debug_configs: Vec<RunConfig>,
    /// Run configurations of further project roots.
    pub roots: Vec<RunConfigSet>,
}

#[derive(Deserialize, Serialize, Debug, PartialEq, Eq, Default, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct ProjectConfig {
    pub classpath: Vec<PathBuf>,
}

impl JtrConfig {
    pub fn java_home(&self) -> anyhow::Result<PathBuf> {
        match &self.java_home {
            Some(java_home) => Ok(java_home.clone()),
            None => std::env::var_os("JAVA_HOME")
                .map(PathBuf::from)
                .ok_or_else(|| anyhow!("no java_home configured, and JAVA_HOME is not set")),
        }
    }

    pub fn storage_root(&self) -> anyhow::Result<PathBuf> {
        match &self.storage_root {
            Some(root) => Ok(root.clone()),
            None => Ok(jtr_strategy()?.cache_dir().join("storage")),
        }
    }

    pub fn run_config_sets(&self) -> Vec<RunConfigSet> {
        let mut sets = vec![];
        if !self.run_configs.is_empty() || !self.debug_configs.is_empty() {
            sets.push(RunConfigSet {
                root: None,
                run: self.run_configs.clone(),
                debug: self.debug_configs.clone(),
            });
        }
        sets.extend(self.roots.iter().cloned());
        sets
    }

    /// The classpath of each configured project.
    pub fn project_classpaths(&self) -> BTreeMap<String, Vec<PathBuf>> {
        self.projects
            .iter()
            .map(|(name, project)| (name.clone(), project.classpath.clone()))
            .collect()
    }
}

fn jtr_strategy() -> anyhow::Result<app_strategy::Xdg> {
    Ok(app_strategy::Xdg::new(AppStrategyArgs {
        top_level_domain: "io".to_string(),
        author: "jtr".to_string(),
        app_name: "jtr".to_string(),
    })?)
}

/// `config.toml` in jtr's configuration directory.
pub fn jtr_config_filepath() -> anyhow::Result<PathBuf> {
    Ok(jtr_strategy()?.config_dir().join("config.toml"))
}

pub fn read_jtr_config(path: &Path) -> anyhow::Result<JtrConfig> {
    let toml_str = fs::read_to_string(path)
        .with_context(|| format!("failed to read configuration file {}", path.display()))?;
    let config = toml::from_str(&toml_str)
        .with_context(|| format!("invalid configuration file {}", path.display()))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::path::PathBuf;

    use indoc::indoc;
    use jtr_runner::LaunchMode;
    use tempfile::NamedTempFile;

    use super::read_jtr_config;

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("Failed to create temporary file");
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn reads_full_config() {
        let file = write_config(indoc! {r#"
            java_home = "/jdk"
            runner_jar = "/opt/jtr/runner.jar"
            classpath = ["/app/classes"]

            [projects.lib]
            classpath = ["/lib/classes", "/lib/deps.jar"]

            [[run_configs]]
            name = "unit"
            default = true
            vm_args = ["-Xmx1g"]
            env = { APP_ENV = "test" }

            [[run_configs]]
            name = "launched"
            launch_mode = "launch"

            [[debug_configs]]
            name = "suspended"
            default = true

            [[roots]]
            root = "/other"

            [[roots.run]]
            name = "other"

            [[roots.debug]]
            name = "other-debug"
        "#});

        let config = read_jtr_config(file.path()).unwrap();
        assert_eq!(config.java_home().unwrap(), PathBuf::from("/jdk"));
        assert_eq!(config.runner_jar, PathBuf::from("/opt/jtr/runner.jar"));
        assert_eq!(
            config.project_classpaths()["lib"],
            vec![PathBuf::from("/lib/classes"), PathBuf::from("/lib/deps.jar")]
        );

        let sets = config.run_config_sets();
        assert_eq!(sets.len(), 2);
        assert_eq!(sets[0].run[0].name, "unit");
        assert!(sets[0].run[0].default);
        assert_eq!(sets[0].run[0].env["APP_ENV"], "test");
        assert_eq!(sets[0].run[1].launch_mode, LaunchMode::Launch);
        assert_eq!(sets[0].for_mode(true)[0].name, "suspended");
        assert_eq!(sets[1].root, Some(PathBuf::from("/other")));
        assert_eq!(sets[1].run[0].name, "other");
        assert_eq!(sets[1].debug[0].name, "other-debug");
    }

    #[test]
    fn explicit_storage_root() {
        let file = write_config("runner_jar = \"/r.jar\"\nstorage_root = \"/scratch\"\n");
        let config = read_jtr_config(file.path()).unwrap();
        assert_eq!(config.storage_root().unwrap(), PathBuf::from("/scratch"));
        assert!(config.run_config_sets().is_empty());
    }

    #[test]
    fn debug_configs_alone_make_a_set() {
        let file = write_config(indoc! {r#"
            runner_jar = "/r.jar"

            [[debug_configs]]
            name = "attach"
        "#});
        let sets = read_jtr_config(file.path()).unwrap().run_config_sets();
        assert_eq!(sets.len(), 1);
        assert!(sets[0].run.is_empty());
        assert_eq!(sets[0].debug[0].name, "attach");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let file = write_config("runner_jar = \"/r.jar\"\nrunner_jars = []\n");
        let error = read_jtr_config(file.path()).unwrap_err();
        assert!(format!("{error:#}").contains("runner_jars"), "{error:#}");
    }

    #[test]
    fn missing_file() {
        let error = read_jtr_config("/no/such/jtr.toml".as_ref()).unwrap_err();
        assert!(error.to_string().contains("/no/such/jtr.toml"));
    }
}
