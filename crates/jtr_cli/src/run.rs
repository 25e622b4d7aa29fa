use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use jtr_executor::{select_run_config, ConfigSelection, Dispatcher, ResultStore, RunOutcome};
use jtr_output::{format_failure, format_result_line, format_summary, ColorProvider, RunSummary};
use jtr_protocol::{ProgressEvent, ResultDetail, TestIdentity, TestItem, TestResult};
use jtr_runner::{Notifier, SessionEnv};
use jtr_utils::exit::ExitCode;
use tokio::sync::mpsc;

use crate::args::ColorChoice;
use crate::collaborators::{ConfiguredClasspath, LocalDebugger, StderrNotifier};
use crate::jtr_config::{jtr_config_filepath, read_jtr_config, JtrConfig};

pub struct RunArgs {
    pub tests: PathBuf,
    pub config: Option<PathBuf>,
    pub config_name: Option<String>,
    pub debug: bool,
    pub color: ColorChoice,
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<JtrConfig> {
    let path = match path {
        Some(path) => path,
        None => jtr_config_filepath()?,
    };
    tracing::debug!(path = %path.display(), "reading configuration");
    read_jtr_config(&path)
}

fn read_tests(path: &Path) -> anyhow::Result<Vec<TestItem>> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read tests from {}", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("invalid tests file {}", path.display()))
}

fn colors(choice: ColorChoice) -> &'static ColorProvider {
    let use_color = match choice {
        ColorChoice::Auto => std::io::stdout().is_terminal(),
        ColorChoice::Always => true,
        ColorChoice::Never => false,
    };
    ColorProvider::new(use_color)
}

pub async fn run_tests(args: RunArgs) -> anyhow::Result<ExitCode> {
    let config = load_config(args.config)?;
    let tests = read_tests(&args.tests)?;
    let colors = colors(args.color);
    let notifier = Arc::new(StderrNotifier);

    let selection = match args.config_name {
        Some(name) => ConfigSelection::Named(name),
        None => ConfigSelection::Default,
    };
    let run_config = select_run_config(
        &config.run_config_sets(),
        &selection,
        args.debug,
        notifier.as_ref(),
    )?;

    let classpath = ConfiguredClasspath {
        default: config.classpath.clone(),
        projects: config.project_classpaths(),
    };
    let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
    let env = SessionEnv::new(
        config.java_home()?,
        &config.runner_jar,
        config.storage_root()?,
        Arc::new(classpath),
    )
    .with_debugger(Arc::new(LocalDebugger))
    .with_progress(progress_tx);
    let dispatcher = Dispatcher::new(env, ResultStore::new()).with_notifier(notifier.clone());

    let start = Instant::now();
    let run = dispatcher.run(&tests, args.debug, run_config.as_ref());
    tokio::pin!(run);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;
    let mut finished = vec![];

    let outcome = loop {
        tokio::select! {
            outcome = &mut run => break outcome,
            Some(event) = progress_rx.recv() => finished.extend(print_progress(event, colors)),
            _ = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                notifier.info("Cancelling the test run...");
                dispatcher.cancel();
            }
        }
    };
    while let Ok(event) = progress_rx.try_recv() {
        finished.extend(print_progress(event, colors));
    }

    let results = match outcome {
        Ok(RunOutcome::Completed(results)) => results,
        Ok(RunOutcome::Rejected) => anyhow::bail!("another test run is in progress"),
        Err(error) => {
            // Groups before the failing one, and whatever the failing runner reported.
            let partial: Vec<_> = finished
                .into_iter()
                .filter_map(|identity| {
                    let detail = dispatcher.store().get(&identity.source_uri, &identity)?;
                    Some(TestResult { identity, detail })
                })
                .collect();
            print_report(&partial, start.elapsed(), colors);
            eprintln!("error: {:#}", anyhow::Error::new(error));
            return Ok(ExitCode::JTR_ERROR);
        }
    };

    let summary = print_report(&results, start.elapsed(), colors);
    if interrupted {
        return Ok(ExitCode::FAILURE);
    }
    Ok(summary.exit_code())
}

/// Prints the failures of `results` in full, then the summary line.
fn print_report(results: &[TestResult], elapsed: Duration, colors: &ColorProvider) -> RunSummary {
    let failures: Vec<_> = results
        .iter()
        .filter_map(|result| format_failure(result, colors))
        .collect();
    if !failures.is_empty() {
        println!();
        for failure in failures {
            print!("{failure}");
        }
    }

    let summary = RunSummary::new(results);
    println!();
    print!("{}", format_summary(&summary, elapsed, colors));
    summary
}

/// Returns the identity of a test that finished.
fn print_progress(event: ProgressEvent, colors: &ColorProvider) -> Option<TestIdentity> {
    match event {
        ProgressEvent::Finished(identity, status) => {
            let result = TestResult {
                identity,
                detail: ResultDetail::with_status(status),
            };
            println!("{}", format_result_line(&result, colors));
            Some(result.identity)
        }
        ProgressEvent::Started(identity) => {
            tracing::debug!(test = %identity.full_name(), "test started");
            None
        }
        ProgressEvent::Failure { .. } => None,
    }
}

/// Reports every problem with the configuration file at once.
pub fn check_config(path: Option<PathBuf>) -> anyhow::Result<ExitCode> {
    let config = load_config(path)?;
    let mut problems = vec![];

    match config.java_home() {
        Ok(java_home) => {
            let java = java_home.join("bin").join("java");
            if !java.exists() {
                problems.push(format!("no java executable at {}", java.display()));
            }
        }
        Err(error) => problems.push(error.to_string()),
    }
    if !config.runner_jar.is_file() {
        problems.push(format!(
            "test runner {} does not exist",
            config.runner_jar.display()
        ));
    }

    let sets = config.run_config_sets();
    for set in &sets {
        let root = set
            .root
            .as_deref()
            .map_or_else(|| "(this project)".to_owned(), |root| root.display().to_string());
        for (mode, configs) in [("run", &set.run), ("debug", &set.debug)] {
            if configs.is_empty() {
                continue;
            }
            println!("{mode} configurations of {root}:");
            for run_config in configs {
                let marker = if run_config.default { " (default)" } else { "" };
                println!("    {}{marker}", run_config.name);
            }
        }
    }
    let notifier = StderrNotifier;
    for is_debug in [false, true] {
        let selected = select_run_config(&sets, &ConfigSelection::Default, is_debug, &notifier);
        if let Err(error) = selected {
            problems.push(error.to_string());
        }
    }

    if problems.is_empty() {
        println!("configuration is valid");
        return Ok(ExitCode::SUCCESS);
    }
    for problem in problems {
        notifier.warn(&problem);
    }
    Ok(ExitCode::JTR_ERROR)
}
