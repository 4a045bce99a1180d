//! Suite-level orchestration: runs every selected case against one shared
//! [`Report`], then stamps revisions and publishes the results.

use super::discovery::DiscoveryError;
use super::execution::{DEFAULT_TIMEOUT, ExecutionBackend};
use super::plot::PlotRenderer;
use super::publish::{
    IndexEntry, PublishError, copy_static_assets, plots_dir_name, publish_case_plots,
    reset_plots_dir, results_page_name, results_xml_name, update_index,
};
use super::regression::{CaseContext, CaseState, RegressionCase};
use super::report::{DateNode, Report, ReportError, ReportNode, RevisionNode, TestTally};
use crate::domain::RegtestError;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tracing::{info, warn};

pub const SIMULATOR_BINARY: &str = "opalx";
pub const SIMULATOR_PATH_ENV: &str = "OPALX_EXE_PATH";
pub const PUBLISH_DIR_ENV: &str = "REGTEST_WWW";

const SEPARATOR: &str = "==========================================================";
const ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";
const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq)]
pub struct SuiteConfig {
    pub base_dir: PathBuf,
    pub tests: Vec<String>,
    pub simulator_args: Vec<String>,
    /// Directory holding the simulator binary; exported to each case.
    pub simulator_dir: Option<PathBuf>,
    pub publish_dir: Option<PathBuf>,
    pub html_dir: PathBuf,
    pub timestamp: Option<String>,
    pub timeout: Duration,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            tests: Vec::new(),
            simulator_args: Vec::new(),
            simulator_dir: None,
            publish_dir: None,
            html_dir: PathBuf::from("html"),
            timestamp: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl SuiteConfig {
    fn case_env(&self) -> Vec<(String, String)> {
        self.simulator_dir
            .iter()
            .map(|dir| (SIMULATOR_PATH_ENV.to_string(), dir.display().to_string()))
            .collect()
    }
}

/// Source of the revision strings stamped into the `Revisions` node.
pub trait RevisionProbe {
    fn code_revision(&self) -> String;
    fn tests_revision(&self) -> String;
}

/// Asks `<simulator> --git-revision` and `git rev-parse HEAD`.
#[derive(Debug, Clone)]
pub struct CommandRevisionProbe {
    simulator: Option<PathBuf>,
    tests_dir: PathBuf,
}

impl CommandRevisionProbe {
    pub fn new(simulator_dir: Option<&Path>, tests_dir: impl Into<PathBuf>) -> Self {
        Self {
            simulator: simulator_dir.map(|dir| dir.join(SIMULATOR_BINARY)),
            tests_dir: tests_dir.into(),
        }
    }
}

impl RevisionProbe for CommandRevisionProbe {
    fn code_revision(&self) -> String {
        match &self.simulator {
            Some(simulator) => {
                command_output(Command::new(simulator).arg("--git-revision"), "code revision")
            }
            None => String::new(),
        }
    }

    fn tests_revision(&self) -> String {
        command_output(
            Command::new("git")
                .args(["rev-parse", "HEAD"])
                .current_dir(&self.tests_dir),
            "tests revision",
        )
    }
}

/// Stdout and stderr of a short command with the trailing newline removed.
fn command_output(command: &mut Command, what: &str) -> String {
    match command.output() {
        Ok(output) => {
            let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
            text.push_str(&String::from_utf8_lossy(&output.stderr));
            text.trim_end_matches(['\n', '\r']).to_string()
        }
        Err(error) => {
            warn!(%error, "cannot query {}", what);
            String::new()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaseResult {
    pub name: String,
    pub state: CaseState,
    pub total_tests: usize,
    pub total_passed: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuiteSummary {
    pub started: String,
    pub timestamp: String,
    pub cases: Vec<CaseResult>,
    pub total_tests: usize,
    pub total_passed: usize,
    /// Occurrences of `broken` in the log.
    pub broken: usize,
    /// Occurrences of `failed` in the log.
    pub failed: usize,
    pub tally: TestTally,
    pub results_file: Option<PathBuf>,
}

impl SuiteSummary {
    pub fn all_passed(&self) -> bool {
        self.total_passed == self.total_tests
    }

    pub fn write_json(&self, path: &Path) -> Result<(), SuiteError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, format!("{}\n", json)).map_err(|source| SuiteError::Summary {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SuiteError {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
    #[error(transparent)]
    Report(#[from] ReportError),
    #[error(transparent)]
    Publish(#[from] PublishError),
    #[error("cannot encode suite summary: {0}")]
    SummaryJson(#[from] serde_json::Error),
    #[error("cannot write suite summary '{}': {source}", path.display())]
    Summary {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl From<&SuiteError> for RegtestError {
    fn from(error: &SuiteError) -> Self {
        let message = error.to_string();
        match error {
            SuiteError::Discovery(DiscoveryError::UnknownTest(_)) => {
                RegtestError::input_validation("INPUT.UNKNOWN_TEST", message)
            }
            SuiteError::Discovery(_) => RegtestError::io_system("IO.SUITE_BASE_DIR", message),
            SuiteError::Report(_) => RegtestError::io_system("IO.REPORT_WRITE", message),
            SuiteError::Publish(_) => RegtestError::io_system("IO.PUBLISH", message),
            SuiteError::SummaryJson(_) => RegtestError::internal("SYS.SUMMARY_ENCODE", message),
            SuiteError::Summary { .. } => RegtestError::io_system("IO.SUMMARY_WRITE", message),
        }
    }
}

pub struct SuiteRunner<'a> {
    config: &'a SuiteConfig,
    backend: &'a dyn ExecutionBackend,
    plotter: &'a dyn PlotRenderer,
    probe: &'a dyn RevisionProbe,
}

impl<'a> SuiteRunner<'a> {
    pub fn new(
        config: &'a SuiteConfig,
        backend: &'a dyn ExecutionBackend,
        plotter: &'a dyn PlotRenderer,
        probe: &'a dyn RevisionProbe,
    ) -> Self {
        Self {
            config,
            backend,
            plotter,
            probe,
        }
    }

    pub fn run(&self, report: &mut Report) -> Result<SuiteSummary, SuiteError> {
        self.run_at(Local::now(), report)
    }

    /// Same as [`SuiteRunner::run`] with a fixed start time.
    pub fn run_at(
        &self,
        started: DateTime<Local>,
        report: &mut Report,
    ) -> Result<SuiteSummary, SuiteError> {
        let started_iso = started.format(ISO_FORMAT).to_string();
        report.append_log(format!("Start Regression Test on {} \n", started_iso));
        report.append_log(format!("{}\n", SEPARATOR));

        let timestamp = self
            .config
            .timestamp
            .clone()
            .unwrap_or_else(|| started.format(DATE_FORMAT).to_string());
        let plots_name = plots_dir_name(&timestamp);
        let plots_dir = self
            .config
            .publish_dir
            .as_ref()
            .map(|publish_dir| publish_dir.join(&plots_name));
        if let Some(plots_dir) = &plots_dir {
            reset_plots_dir(plots_dir)?;
        }

        report.append_result(ReportNode::Date(DateNode {
            start: started_iso.clone(),
        }));

        let env = self.config.case_env();
        let context = CaseContext {
            simulator_args: &self.config.simulator_args,
            env: &env,
            timeout: self.config.timeout,
            backend: self.backend,
            plotter: self.plotter,
            date: started.format(DATE_FORMAT).to_string(),
        };

        let mut cases = Vec::with_capacity(self.config.tests.len());
        let (mut total_tests, mut total_passed) = (0, 0);
        for name in &self.config.tests {
            let mut case = RegressionCase::new(&self.config.base_dir, name.clone());
            let summary = case.run(&context, report);
            info!(
                case = %name,
                tests = summary.total_tests,
                passed = summary.total_passed,
                "case finished"
            );
            total_tests += summary.total_tests;
            total_passed += summary.total_passed;

            if let Some(plots_dir) = &plots_dir {
                if let Err(error) = publish_case_plots(case.dir(), plots_dir) {
                    warn!(case = %name, %error, "plots not published");
                }
            }
            cases.push(CaseResult {
                name: name.clone(),
                state: case.state(),
                total_tests: summary.total_tests,
                total_passed: summary.total_passed,
            });
        }

        report.append_result(ReportNode::Revisions(RevisionNode::from_full(
            self.probe.code_revision(),
            self.probe.tests_revision(),
        )));

        // Framing ends before publishing; a publish error leaves the log whole.
        report.append_log(format!(
            "\nSummary: {} / {} tests passed \n",
            total_passed, total_tests
        ));
        report.append_log(format!("\n{}\n", SEPARATOR));
        report.append_log(format!(
            "Finished Regression Test on {} \n",
            Local::now().format(ISO_FORMAT)
        ));

        let mut results_file = None;
        if let Some(publish_dir) = &self.config.publish_dir {
            let path = publish_dir.join(results_xml_name(&timestamp));
            if report.serialize(&path, &plots_name)? {
                results_file = Some(path);
            }
            update_index(
                publish_dir,
                &self.config.html_dir,
                &IndexEntry {
                    page: results_page_name(&timestamp),
                    started,
                    passed: total_passed,
                    broken: report.count_broken(),
                    failed: report.count_failed(),
                    total: total_tests,
                },
            )?;
            copy_static_assets(&self.config.html_dir, publish_dir)?;
        }

        Ok(SuiteSummary {
            started: started_iso,
            timestamp,
            cases,
            total_tests,
            total_passed,
            broken: report.count_broken(),
            failed: report.count_failed(),
            tally: report.tally(),
            results_file,
        })
    }
}
