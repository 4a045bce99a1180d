//! Run-vs-reference comparison of one statistics variable.

use super::plot::{PlotError, PlotRenderer, PlotRequest};
use super::report::Report;
use crate::domain::{ComparisonMode, ComparisonSpec, TestOutcome, format_number};
use crate::stat::{Series, StatError, StatFile};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const REFERENCE_DIR: &str = "reference";
pub const STAT_SUFFIX: &str = "stat";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ComparisonError {
    #[error("series have no data rows")]
    EmptySeries,
    #[error("size reference: {reference}, size simulation: {run}")]
    SizeMismatch { reference: usize, run: usize },
    #[error("comparison mode '{0}' is not implemented")]
    NotImplemented(ComparisonMode),
}

/// Discrepancy between two equally long series under `mode`.
pub fn compute_delta(
    mode: ComparisonMode,
    run: &[f64],
    reference: &[f64],
) -> Result<f64, ComparisonError> {
    if run.len() != reference.len() {
        return Err(ComparisonError::SizeMismatch {
            reference: reference.len(),
            run: run.len(),
        });
    }

    match mode {
        ComparisonMode::Last => match (run.last(), reference.last()) {
            (Some(run), Some(reference)) => Ok((run - reference).abs()),
            _ => Err(ComparisonError::EmptySeries),
        },
        ComparisonMode::Avg => {
            if run.is_empty() {
                return Err(ComparisonError::EmptySeries);
            }
            let sum_of_squares: f64 = run
                .iter()
                .zip(reference)
                .map(|(run, reference)| (run - reference).powi(2))
                .sum();
            Ok(sum_of_squares.sqrt() / run.len() as f64)
        }
        ComparisonMode::Error | ComparisonMode::All => Err(ComparisonError::NotImplemented(mode)),
    }
}

/// Compares `<case_dir>/<case>.stat` with `<case_dir>/reference/<case>.stat`.
pub struct StatComparator<'a> {
    case_name: &'a str,
    case_dir: &'a Path,
    plotter: &'a dyn PlotRenderer,
}

impl<'a> StatComparator<'a> {
    pub fn new(case_name: &'a str, case_dir: &'a Path, plotter: &'a dyn PlotRenderer) -> Self {
        Self {
            case_name,
            case_dir,
            plotter,
        }
    }

    pub fn run_stat_path(&self) -> PathBuf {
        self.case_dir
            .join(format!("{}.{}", self.case_name, STAT_SUFFIX))
    }

    pub fn reference_stat_path(&self) -> PathBuf {
        self.case_dir
            .join(REFERENCE_DIR)
            .join(format!("{}.{}", self.case_name, STAT_SUFFIX))
    }

    /// Evaluates one assertion, logging its verdict into `report`.
    pub fn check(&self, spec: &ComparisonSpec, report: &mut Report) -> TestOutcome {
        let run_path = self.run_stat_path();
        if !run_path.is_file() {
            report.append_log(format!("ERROR: no statfile {} \n", self.case_name));
            report.append_log(format!(
                "\t Test {}({}) broken \n",
                spec.variable, spec.mode
            ));
            return broken(spec);
        }

        let (run, reference) = match self.load_series(&run_path, &spec.variable) {
            Ok(pair) => pair,
            Err(error) if error.is_unknown_variable() => {
                report.append_log(format!(
                    "Error: unknown variable ({}) selected for stat test\n",
                    spec.variable
                ));
                log_broken_with_eps(spec, report);
                return broken(spec);
            }
            Err(error) => {
                report.append_log(format!("Error: {}\n", error));
                log_broken_with_eps(spec, report);
                return broken(spec);
            }
        };

        let delta = match compute_delta(spec.mode, &run.values, &reference.values) {
            Ok(delta) => delta,
            Err(ComparisonError::SizeMismatch {
                reference: reference_len,
                run: run_len,
            }) => {
                report.append_log(format!(
                    "Error: size of stat variables ({}) dont agree!\n",
                    spec.variable
                ));
                report.append_log(format!(
                    "       size reference: {}, size simulation: {}\n",
                    reference_len, run_len
                ));
                log_broken_with_eps(spec, report);
                return broken(spec);
            }
            Err(ComparisonError::EmptySeries) => {
                report.append_log(format!(
                    "Error: stat variable ({}) has no data rows\n",
                    spec.variable
                ));
                log_broken_with_eps(spec, report);
                return broken(spec);
            }
            Err(error @ ComparisonError::NotImplemented(_)) => {
                report.append_log(format!("Note: {}\n", error));
                log_broken_with_eps(spec, report);
                return broken(spec);
            }
        };

        let outcome = TestOutcome::evaluated(spec, delta, self.render_plot(spec, &run, &reference));
        report.append_log(format!(
            "Test {}({}) {}: {} (eps={}) \n",
            spec.variable,
            spec.mode,
            outcome.state,
            format_number(delta),
            format_number(spec.epsilon)
        ));
        outcome
    }

    fn load_series(&self, run_path: &Path, variable: &str) -> Result<(Series, Series), StatError> {
        let run = StatFile::open(run_path)?.series(variable)?;
        let reference = StatFile::open(self.reference_stat_path())?.series(variable)?;
        Ok((run, reference))
    }

    fn render_plot(&self, spec: &ComparisonSpec, run: &Series, reference: &Series) -> Option<String> {
        let request = PlotRequest {
            case_name: self.case_name,
            case_dir: self.case_dir,
            variable: &spec.variable,
            run,
            reference,
        };
        match self.plotter.render(&request) {
            Ok(path) => {
                debug!(plot = %path.display(), "rendered comparison chart");
                path.file_name()
                    .map(|name| name.to_string_lossy().into_owned())
            }
            Err(PlotError::Disabled) => None,
            Err(error) => {
                warn!(case = self.case_name, variable = %spec.variable, %error, "no comparison chart");
                None
            }
        }
    }
}

fn broken(spec: &ComparisonSpec) -> TestOutcome {
    TestOutcome::broken(spec.variable.clone(), spec.mode.as_str(), spec.epsilon)
}

fn log_broken_with_eps(spec: &ComparisonSpec, report: &mut Report) {
    report.append_log(format!(
        "\t Test {}({}) broken: - (eps={}) \n",
        spec.variable,
        spec.mode,
        format_number(spec.epsilon)
    ));
}
