//! Runner for a single regression case.
//!
//! A case moves through `Pending -> Cleaned -> ReferenceValidated -> Executed
//! -> Compared -> Recorded`. Anything that stops a case early (a directory that
//! cannot be cleaned, an unreadable assertion list) moves it to `Broken`
//! instead; the rest of the suite is unaffected.

use super::assertions::{
    ASSERTION_SUFFIX, Assertion, AssertionEntry, AssertionList, parse_assertion_list,
    quoted_variable,
};
use super::checksum::validate_reference_files;
use super::cleanup::clean_case_directory;
use super::comparator::{REFERENCE_DIR, STAT_SUFFIX, StatComparator};
use super::execution::{ExecutionBackend, ExecutionError, ExecutionRequest};
use super::plot::PlotRenderer;
use super::report::{Report, ReportNode, SimulationNode};
use crate::domain::TestOutcome;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const RUN_SCRIPT_SUFFIX: &str = "local";
pub const RUN_OUTPUT_SUFFIX: &str = "-RT.o";
pub const OUTPUT_SUFFIX: &str = "out";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseState {
    Pending,
    Cleaned,
    ReferenceValidated,
    Executed,
    Compared,
    Recorded,
    Broken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CaseSummary {
    pub total_tests: usize,
    pub total_passed: usize,
}

impl CaseSummary {
    fn record(&mut self, passed: bool) {
        self.total_tests += 1;
        if passed {
            self.total_passed += 1;
        }
    }
}

/// Collaborators and settings shared by every case of a suite run.
pub struct CaseContext<'a> {
    pub simulator_args: &'a [String],
    pub env: &'a [(String, String)],
    pub timeout: Duration,
    pub backend: &'a dyn ExecutionBackend,
    pub plotter: &'a dyn PlotRenderer,
    /// `YYYY-MM-DD`, stamped on the `Simulation` node.
    pub date: String,
}

#[derive(Debug, thiserror::Error)]
enum CaseAbort {
    #[error("cannot clean case directory: {0}")]
    Cleanup(#[from] super::cleanup::CleanupError),
    #[error("cannot read '{}': {source}", path.display())]
    AssertionList {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug)]
pub struct RegressionCase {
    name: String,
    dir: PathBuf,
    state: CaseState,
}

impl RegressionCase {
    pub fn new(base_dir: &Path, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            dir: base_dir.join(&name),
            name,
            state: CaseState::Pending,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn state(&self) -> CaseState {
        self.state
    }

    fn case_file(&self, suffix: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", self.name, suffix))
    }

    /// Runs the case to completion and records it in `report`.
    pub fn run(&mut self, context: &CaseContext<'_>, report: &mut Report) -> CaseSummary {
        info!(case = %self.name, "running regression case");
        match self.advance(context, report) {
            Ok(summary) => {
                self.state = CaseState::Recorded;
                summary
            }
            Err(abort) => {
                warn!(case = %self.name, %abort, "case aborted");
                report.append_log(format!("Test broken: {} aborted, {}\n", self.name, abort));
                report.append_result(ReportNode::Simulation(SimulationNode::new(
                    self.name.clone(),
                    context.date.clone(),
                    format!("Case aborted: {}", abort),
                )));
                self.state = CaseState::Broken;
                CaseSummary {
                    total_tests: 1,
                    total_passed: 0,
                }
            }
        }
    }

    fn advance(
        &mut self,
        context: &CaseContext<'_>,
        report: &mut Report,
    ) -> Result<CaseSummary, CaseAbort> {
        clean_case_directory(&self.name, &self.dir)?;
        self.state = CaseState::Cleaned;

        validate_reference_files(&self.name, &self.dir, report);
        self.state = CaseState::ReferenceValidated;

        report.append_log(format!("Run regression test {}\n", self.name));
        let executed = self.execute(context, report);
        self.state = CaseState::Executed;

        let assertions = self.read_assertions()?;
        let missing_outputs = self.missing_outputs();
        if !missing_outputs.is_empty() {
            report.append_log(format!(
                "\t ERROR: Reference output file {} FAILED \n",
                quoted_list(&missing_outputs)
            ));
            let description = match &assertions {
                Some(list) => list.description.clone(),
                None => self.name.clone(),
            };
            report.append_result(ReportNode::Simulation(SimulationNode::new(
                self.name.clone(),
                context.date.clone(),
                format!("{}. Output files missing. Test failed.", description),
            )));
            return Ok(CaseSummary {
                total_tests: 1,
                total_passed: 0,
            });
        }
        report.append_log("Reference output files OK\n");

        let mut summary = CaseSummary::default();
        let simulation = match assertions {
            Some(list) => {
                let mut description = list.description.clone();
                if !executed {
                    description.push_str(". Test failed.");
                }
                let mut simulation =
                    SimulationNode::new(self.name.clone(), context.date.clone(), description);
                let comparator = StatComparator::new(&self.name, &self.dir, context.plotter);
                for entry in &list.entries {
                    if let Some(outcome) = self.evaluate(entry, &comparator, report) {
                        summary.record(outcome.passed());
                        simulation.tests.push(outcome);
                    }
                }
                simulation
            }
            None => {
                let outcome = if executed {
                    ". Test execution successful (no result validation)."
                } else {
                    ". Test failed (execution error or output missing)."
                };
                summary.record(executed);
                SimulationNode::new(
                    self.name.clone(),
                    context.date.clone(),
                    format!("No definition file (.{}) found{}", ASSERTION_SUFFIX, outcome),
                )
            }
        };
        self.state = CaseState::Compared;

        report.append_result(ReportNode::Simulation(simulation));
        Ok(summary)
    }

    fn evaluate(
        &self,
        entry: &AssertionEntry,
        comparator: &StatComparator<'_>,
        report: &mut Report,
    ) -> Option<TestOutcome> {
        match &entry.parsed {
            Ok(Assertion::Stat(spec)) => Some(comparator.check(spec, report)),
            Ok(Assertion::Unsupported(kind)) => {
                debug!(case = %self.name, line = entry.line_number, kind = %kind, "skipping unsupported assertion");
                None
            }
            Err(error) => {
                report.append_log(format!(
                    "Test broken: didn't succeed to parse {}.{} file line {}\n{}\nreason: {}\n\n",
                    self.name, ASSERTION_SUFFIX, entry.line_number, entry.text, error
                ));
                let variable = quoted_variable(&entry.text).unwrap_or(entry.text.trim());
                Some(TestOutcome::unparsed(variable))
            }
        }
    }

    /// Returns whether the run script finished in time with exit code 0.
    fn execute(&self, context: &CaseContext<'_>, report: &mut Report) -> bool {
        let script = self.case_file(RUN_SCRIPT_SUFFIX);
        if !is_executable(&script) {
            report.append_log(format!(
                "Error: {}.{} file could not be executed\n",
                self.name, RUN_SCRIPT_SUFFIX
            ));
        }

        let request = ExecutionRequest {
            program: script,
            args: context.simulator_args.to_vec(),
            working_dir: self.dir.clone(),
            env: context.env.to_vec(),
            timeout: context.timeout,
        };
        let command = request.display_command();

        let (output, executed) = match context.backend.execute(&request) {
            Ok(output) => {
                let success = output.success();
                if !success {
                    let message = match output.exit_code {
                        Some(code) => format!("{} exited with code {}", command, code),
                        None => format!("{} was terminated by a signal", command),
                    };
                    report.append_log(format!("{}\n", message));
                }
                (Some(output), success)
            }
            Err(error) => {
                report.append_log(match &error {
                    ExecutionError::Timeout { .. } => format!("{}\n", error),
                    _ => format!("Error: {}\n", error),
                });
                (error.partial_output().cloned(), false)
            }
        };

        if let Some(output) = output {
            debug!(case = %self.name, stdout = %String::from_utf8_lossy(&output.stdout), "case stdout");
            debug!(case = %self.name, stderr = %String::from_utf8_lossy(&output.stderr), "case stderr");
            let run_output = self.dir.join(format!("{}{}", self.name, RUN_OUTPUT_SUFFIX));
            let copied = fs::write(&run_output, output.combined())
                .and_then(|()| fs::copy(&run_output, self.case_file(OUTPUT_SUFFIX)).map(|_| ()));
            if let Err(error) = copied {
                report.append_log(format!(
                    "Error: cannot store output of {}: {}\n",
                    self.name, error
                ));
            }
        }
        executed
    }

    fn read_assertions(&self) -> Result<Option<AssertionList>, CaseAbort> {
        let path = self.case_file(ASSERTION_SUFFIX);
        if !path.is_file() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)
            .map_err(|source| CaseAbort::AssertionList { path, source })?;
        Ok(Some(parse_assertion_list(&content)))
    }

    /// Reference `.stat` files whose run counterpart never appeared.
    fn missing_outputs(&self) -> Vec<String> {
        let references = files_with_suffix(&self.dir.join(REFERENCE_DIR), STAT_SUFFIX);
        if references.is_empty() || !files_with_suffix(&self.dir, STAT_SUFFIX).is_empty() {
            return Vec::new();
        }
        references
    }
}

fn files_with_suffix(dir: &Path, suffix: &str) -> Vec<String> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.path().is_file())
        .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
        .filter(|name| {
            Path::new(name)
                .extension()
                .is_some_and(|extension| extension == suffix)
        })
        .collect();
    names.sort();
    names
}

fn quoted_list(names: &[String]) -> String {
    let quoted: Vec<String> = names.iter().map(|name| format!("'{}'", name)).collect();
    format!("[{}]", quoted.join(", "))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path)
        .map(|metadata| metadata.is_file() && metadata.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
