use super::{StatError, StatFileHeader};
use regex::Regex;
use std::sync::LazyLock;

/// Column every series is plotted against.
pub const INDEPENDENT_COLUMN: &str = "s";
pub const REVISION_PARAMETER: &str = "revision";

static REVISION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(.* git rev\. )#([A-Za-z0-9]{7})[A-Za-z0-9]*")
        .expect("revision pattern should compile")
});

#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub revision: String,
    pub units: String,
    pub independent: Vec<f64>,
    pub values: Vec<f64>,
}

impl Series {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// `(s, value)` pairs, as handed to the plotting backend.
    pub fn points(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.independent
            .iter()
            .copied()
            .zip(self.values.iter().copied())
    }
}

/// Shortens a `... git rev. #<hash>` line to the 7-character abbreviated hash.
pub fn extract_revision(line: &str) -> String {
    match REVISION_PATTERN.captures(line) {
        Some(captures) => format!("{}#{}", &captures[1], &captures[2]),
        None => line.to_string(),
    }
}

pub fn extract_series<S: AsRef<str>>(
    header: &StatFileHeader,
    lines: &[S],
    variable: &str,
) -> Result<Series, StatError> {
    let revision_row = header
        .parameter(REVISION_PARAMETER)
        .ok_or(StatError::MissingParameter(REVISION_PARAMETER))?
        .row;
    let revision_line = header.header_line_count + revision_row;
    let revision = lines
        .get(revision_line)
        .map(|line| extract_revision(line.as_ref()))
        .ok_or(StatError::MissingLine {
            line: revision_line + 1,
            line_count: lines.len(),
        })?;

    let s_column = header
        .column(INDEPENDENT_COLUMN)
        .ok_or(StatError::MissingColumn(INDEPENDENT_COLUMN))?
        .index;
    let variable_info = header
        .column(variable)
        .ok_or_else(|| StatError::UnknownVariable(variable.to_string()))?;

    let mut independent = Vec::new();
    let mut values = Vec::new();
    for (offset, line) in lines.iter().enumerate().skip(header.data_start_line()) {
        let line = line.as_ref();
        if line.trim().is_empty() {
            continue;
        }

        let tokens: Vec<&str> = line.split_whitespace().collect();
        independent.push(parse_cell(&tokens, s_column, offset + 1)?);
        values.push(parse_cell(&tokens, variable_info.index, offset + 1)?);
    }

    Ok(Series {
        revision,
        units: variable_info.units.clone(),
        independent,
        values,
    })
}

fn parse_cell(tokens: &[&str], column: usize, line: usize) -> Result<f64, StatError> {
    let token = tokens
        .get(column)
        .ok_or(StatError::MissingValue { line, column })?;
    token.parse::<f64>().map_err(|_| StatError::InvalidNumber {
        line,
        column,
        token: (*token).to_string(),
    })
}
