mod commands;
mod helpers;

use clap::Parser;
use regtest_core::domain::RegtestError;
use regtest_core::modules::SuiteError;

pub const PROGRAM_NAME: &str = "run-reg-tests";

pub fn run_from_env() -> i32 {
    let args: Vec<String> = std::env::args().skip(1).collect();

    match run(args) {
        Ok(code) => code,
        Err(error) => {
            let error = error.as_regtest_error();
            eprintln!("{}", error.diagnostic_line());
            eprintln!("{}", error.fatal_exit_line());
            error.exit_code()
        }
    }
}

pub fn run<I, S>(args: I) -> Result<i32, CliError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let full_args = std::iter::once(PROGRAM_NAME.to_string())
        .chain(args.into_iter().map(Into::into))
        .collect::<Vec<_>>();
    parse_and_dispatch(full_args)
}

fn parse_and_dispatch(args: Vec<String>) -> Result<i32, CliError> {
    match Cli::try_parse_from(&args) {
        Ok(cli) => commands::run_suite_command(cli.run),
        Err(err) => match err.kind() {
            clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                print!("{}", err);
                Ok(0)
            }
            _ => Err(CliError::Usage(err.to_string())),
        },
    }
}

#[derive(Parser)]
#[command(name = PROGRAM_NAME, about = "Run OPAL-X regression tests", version)]
struct Cli {
    #[command(flatten)]
    run: commands::RunArgs,
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),
    #[error("{0}")]
    Suite(RegtestError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<RegtestError> for CliError {
    fn from(error: RegtestError) -> Self {
        Self::Suite(error)
    }
}

impl From<SuiteError> for CliError {
    fn from(error: SuiteError) -> Self {
        Self::Suite(RegtestError::from(&error))
    }
}

impl CliError {
    fn as_regtest_error(&self) -> RegtestError {
        match self {
            Self::Usage(message) => {
                RegtestError::input_validation("INPUT.CLI_USAGE", message.trim_end())
            }
            Self::Suite(error) => error.clone(),
            Self::Internal(error) => RegtestError::internal("SYS.CLI", format!("{error:#}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{CliError, run};
    use regtest_core::domain::RegtestErrorCategory;

    #[test]
    fn unknown_flag_is_a_usage_error() {
        let error = run(["--no-such-flag"]).expect_err("unknown flag should be rejected");
        assert!(matches!(error, CliError::Usage(_)));
        assert_eq!(
            error.as_regtest_error().category(),
            RegtestErrorCategory::InputValidationError
        );
        assert_eq!(error.as_regtest_error().exit_code(), 2);
    }

    #[test]
    fn help_exits_cleanly() {
        assert_eq!(run(["--help"]).expect("help should render"), 0);
    }

    #[test]
    fn internal_errors_keep_context() {
        let error = CliError::from(anyhow::anyhow!("inner").context("outer"));
        let rendered = error.as_regtest_error();
        assert_eq!(rendered.placeholder(), "SYS.CLI");
        assert_eq!(rendered.message(), "outer: inner");
        assert_eq!(rendered.exit_code(), 5);
    }
}
