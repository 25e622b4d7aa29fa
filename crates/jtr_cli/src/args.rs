use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Runs JUnit and TestNG tests through out-of-process test runners.
#[derive(Parser)]
#[clap(version)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Runs the tests listed in a JSON file.
    ///
    /// The file holds an array of test items, as produced by test discovery:
    /// `[{"project": "app", "container": "com.acme.FooTest", "method": "bar", "kind": "junit5"}]`.
    Run {
        /// The JSON file listing the tests to run.
        #[clap(long)]
        tests: PathBuf,

        /// Path to the jtr configuration file.
        /// Defaults to `config.toml` in jtr's configuration directory.
        #[clap(long, env = "JTR_CONFIG")]
        config: Option<PathBuf>,

        /// Name of the run configuration to use. When not given, the configuration marked
        /// `default` is used, if there is exactly one project root.
        #[clap(long)]
        config_name: Option<String>,

        /// Starts runners suspended, waiting for a debugger.
        #[clap(long)]
        debug: bool,

        #[clap(long, value_enum, default_value_t = ColorChoice::Auto)]
        color: ColorChoice,
    },
    /// Checks that the configuration file parses and points at a usable JDK and runner.
    CheckConfig {
        /// Path to the jtr configuration file.
        #[clap(long, env = "JTR_CONFIG")]
        config: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, ValueEnum)]
pub enum ColorChoice {
    /// Colors when stdout is a terminal.
    Auto,
    Always,
    Never,
}
