//! Parser for the per-case assertion list `<case>.rt`.
//!
//! ```text
//! "Gaussian distribution in a drift"
//! stat "rms_x" last 1e-5
//! stat "energy" avg 1e-3
//! ```

use crate::domain::{ComparisonMode, ComparisonSpec};

pub const ASSERTION_SUFFIX: &str = "rt";
pub const STAT_ASSERTION: &str = "stat";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AssertionParseError {
    #[error("variable name is not enclosed in double quotes")]
    UnquotedVariable,
    #[error("variable name is empty")]
    EmptyVariable,
    #[error("no comparison mode given")]
    MissingMode,
    #[error("{0}")]
    UnknownMode(String),
    #[error("no tolerance given")]
    MissingEpsilon,
    #[error("tolerance '{0}' is not a non-negative number")]
    InvalidEpsilon(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Assertion {
    Stat(ComparisonSpec),
    /// A type this harness does not evaluate; skipped without counting.
    Unsupported(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssertionEntry {
    /// 1-based line number in the `.rt` file.
    pub line_number: usize,
    pub text: String,
    pub parsed: Result<Assertion, AssertionParseError>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssertionList {
    pub description: String,
    pub entries: Vec<AssertionEntry>,
}

pub fn parse_assertion_list(content: &str) -> AssertionList {
    let mut lines = content.lines();
    let description = lines
        .next()
        .map(|line| line.trim_end().trim_start_matches('"').trim_end_matches('"'))
        .unwrap_or_default()
        .to_string();

    let entries = lines
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| AssertionEntry {
            line_number: index + 2,
            text: line.trim_end().to_string(),
            parsed: parse_assertion_line(line),
        })
        .collect();

    AssertionList {
        description,
        entries,
    }
}

/// `[type] "<variable>" <mode> <epsilon>`; a missing type means `stat`.
pub fn parse_assertion_line(line: &str) -> Result<Assertion, AssertionParseError> {
    let (kind, rest) = line
        .split_once('"')
        .ok_or(AssertionParseError::UnquotedVariable)?;
    let kind = kind.trim();
    if !kind.is_empty() && kind != STAT_ASSERTION {
        return Ok(Assertion::Unsupported(kind.to_string()));
    }

    let (variable, rest) = rest
        .split_once('"')
        .ok_or(AssertionParseError::UnquotedVariable)?;
    let variable = variable.trim();
    if variable.is_empty() {
        return Err(AssertionParseError::EmptyVariable);
    }

    let mut params = rest.split_whitespace();
    let mode = params
        .next()
        .ok_or(AssertionParseError::MissingMode)?
        .parse::<ComparisonMode>()
        .map_err(AssertionParseError::UnknownMode)?;
    let epsilon_token = params.next().ok_or(AssertionParseError::MissingEpsilon)?;
    let epsilon = epsilon_token
        .parse::<f64>()
        .ok()
        .filter(|epsilon| epsilon.is_finite() && *epsilon >= 0.0)
        .ok_or_else(|| AssertionParseError::InvalidEpsilon(epsilon_token.to_string()))?;

    Ok(Assertion::Stat(ComparisonSpec::new(variable, mode, epsilon)))
}

/// The quoted variable name of a line, if one can be read off it.
pub fn quoted_variable(line: &str) -> Option<&str> {
    let (_, rest) = line.split_once('"')?;
    let (variable, _) = rest.split_once('"')?;
    let variable = variable.trim();
    (!variable.is_empty()).then_some(variable)
}
