use super::CliError;
use super::helpers::*;
use clap::ArgAction;
use regtest_core::domain::RegtestError;
use regtest_core::modules::execution::DEFAULT_TIMEOUT;
use regtest_core::modules::suite::{PUBLISH_DIR_ENV, SIMULATOR_PATH_ENV};
use regtest_core::modules::{
    CommandRevisionProbe, DisabledPlotRenderer, GnuplotRenderer, LocalProcessBackend,
    PlotRenderer, Report, SuiteConfig, SuiteError, SuiteRunner, discover_tests, select_tests,
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

#[derive(clap::Args)]
pub(super) struct RunArgs {
    /// Regression tests to run (default: every test below the base directory)
    #[arg(value_name = "tests")]
    tests: Vec<String>,

    /// Base directory with regression tests
    #[arg(long)]
    base_dir: Option<PathBuf>,

    /// Publish directory for plots, results and the index page
    #[arg(long, env = PUBLISH_DIR_ENV)]
    publish_dir: Option<PathBuf>,

    /// Directory where the opalx binary is stored
    #[arg(long, env = SIMULATOR_PATH_ENV)]
    opalx_exe_path: Option<PathBuf>,

    /// Argument passed to OPAL-X, one per flag: repeat the flag for several
    /// (`--opalx-args --info --opalx-args 0`)
    #[arg(long, value_name = "ARG", action = ArgAction::Append, allow_hyphen_values = true)]
    opalx_args: Vec<String>,

    /// Timestamp used in published file names (default: today)
    #[arg(long)]
    timestamp: Option<String>,

    /// Directory holding index.html, results.xslt and the page assets
    /// (default: `html` next to the executable)
    #[arg(long)]
    html_dir: Option<PathBuf>,

    /// Wall-clock limit for one case, in seconds
    #[arg(long, default_value_t = DEFAULT_TIMEOUT.as_secs())]
    timeout_secs: u64,

    /// Write a JSON summary of the run to this path
    #[arg(long)]
    summary_json: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(short, long)]
    verbose: bool,
}

pub(super) fn run_suite_command(args: RunArgs) -> Result<i32, CliError> {
    init_tracing(args.verbose);

    let working_dir = current_working_dir()?;
    let base_dir = args
        .base_dir
        .as_deref()
        .map_or_else(|| working_dir.clone(), |dir| resolve_cli_path(&working_dir, dir));
    let discovered = discover_tests(&base_dir).map_err(SuiteError::from)?;
    let publish_dir = args
        .publish_dir
        .as_deref()
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(|dir| resolve_cli_path(&working_dir, dir));
    if let Some(publish_dir) = &publish_dir {
        ensure_publish_dir(publish_dir)?;
    }
    let simulator_dir = resolve_simulator_dir(args.opalx_exe_path.as_deref(), &working_dir)?;

    let tests = select_tests(discovered, &args.tests).map_err(SuiteError::from)?;
    let html_dir = match args.html_dir.as_deref() {
        Some(dir) => resolve_cli_path(&working_dir, dir),
        None => default_html_dir()?,
    };
    if let Some(publish_dir) = &publish_dir {
        ensure_index_template(publish_dir, &html_dir)?;
    }

    println!("Running the following regression tests:");
    for test in &tests {
        println!("    {}", test);
    }
    let config = SuiteConfig {
        base_dir: base_dir.clone(),
        tests,
        simulator_args: args.opalx_args,
        simulator_dir: Some(simulator_dir.clone()),
        publish_dir,
        html_dir,
        timestamp: args.timestamp,
        timeout: Duration::from_secs(args.timeout_secs),
    };
    info!(
        base_dir = %config.base_dir.display(),
        simulator_dir = %simulator_dir.display(),
        publishing = config.publish_dir.is_some(),
        "starting regression suite"
    );

    let backend = LocalProcessBackend::default();
    let gnuplot = GnuplotRenderer::default();
    let plotter: &dyn PlotRenderer = if config.publish_dir.is_some() {
        &gnuplot
    } else {
        &DisabledPlotRenderer
    };
    let probe = CommandRevisionProbe::new(Some(&simulator_dir), &base_dir);

    let mut report = Report::new();
    let outcome = SuiteRunner::new(&config, &backend, plotter, &probe).run(&mut report);
    print!("{}", report.log());
    let summary = outcome?;

    if let Some(path) = args.summary_json.as_deref() {
        summary.write_json(&resolve_cli_path(&working_dir, path))?;
    }

    if summary.all_passed() { Ok(0) } else { Ok(1) }
}

fn ensure_publish_dir(publish_dir: &Path) -> Result<(), RegtestError> {
    std::fs::create_dir_all(publish_dir).map_err(|source| {
        RegtestError::io_system(
            "IO.PUBLISH_DIR",
            format!(
                "cannot create publish directory '{}': {}",
                publish_dir.display(),
                source
            ),
        )
    })
}
