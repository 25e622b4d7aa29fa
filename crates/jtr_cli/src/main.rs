mod args;
mod collaborators;
mod jtr_config;
mod run;

use clap::Parser;
use jtr_utils::exit::ExitCode;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use args::{Cli, Command};
use run::RunArgs;

fn init_tracing() {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_env("JTR_LOG"))
        .init();
}

#[tokio::main]
async fn main() {
    init_tracing();

    let args = Cli::parse();

    let result = match args.command {
        Command::Run {
            tests,
            config,
            config_name,
            debug,
            color,
        } => {
            run::run_tests(RunArgs {
                tests,
                config,
                config_name,
                debug,
                color,
            })
            .await
        }
        Command::CheckConfig { config } => run::check_config(config),
    };

    let exit_code = match result {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::JTR_ERROR
        }
    };
    std::process::exit(exit_code.get());
}
