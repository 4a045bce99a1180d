//! Reading of SDDS-like `.stat` statistics files.

pub mod header;
pub mod series;

pub use header::{ColumnInfo, ParameterInfo, StatFileHeader, parse_header};
pub use series::{
    INDEPENDENT_COLUMN, REVISION_PARAMETER, Series, extract_revision, extract_series,
};

use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum StatError {
    #[error("cannot read statistics file '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{directive} directive starting at line {line} is never closed by &end")]
    UnterminatedDirective { directive: &'static str, line: usize },
    #[error("{directive} directive starting at line {line} spans more than {limit} lines")]
    DirectiveTooLong {
        directive: &'static str,
        line: usize,
        limit: usize,
    },
    #[error("{directive} directive at line {line} has no '{field}=' field")]
    MissingField {
        directive: &'static str,
        field: &'static str,
        line: usize,
    },
    #[error("{directive} name '{name}' at line {line} is declared twice")]
    DuplicateName {
        directive: &'static str,
        name: String,
        line: usize,
    },
    #[error("header has no &data directive")]
    MissingDataDirective,
    #[error("header declares no '{0}' parameter")]
    MissingParameter(&'static str),
    #[error("header declares no '{0}' column")]
    MissingColumn(&'static str),
    #[error("line {line} is missing (file has {line_count} lines)")]
    MissingLine { line: usize, line_count: usize },
    #[error("line {line} has no value in column {column}")]
    MissingValue { line: usize, column: usize },
    #[error("line {line}, column {column} ('{token}') is not a valid number")]
    InvalidNumber {
        line: usize,
        column: usize,
        token: String,
    },
    #[error("unknown variable ({0})")]
    UnknownVariable(String),
}

impl StatError {
    pub fn is_unknown_variable(&self) -> bool {
        matches!(self, Self::UnknownVariable(_))
    }
}

/// A statistics file held in memory together with its parsed header.
#[derive(Debug, Clone)]
pub struct StatFile {
    path: PathBuf,
    lines: Vec<String>,
    header: StatFileHeader,
}

impl StatFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StatError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| StatError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_text(path, &content)
    }

    pub fn from_text(path: impl Into<PathBuf>, content: &str) -> Result<Self, StatError> {
        let lines: Vec<String> = content.lines().map(str::to_string).collect();
        let header = parse_header(&lines)?;
        Ok(Self {
            path: path.into(),
            lines,
            header,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &StatFileHeader {
        &self.header
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn series(&self, variable: &str) -> Result<Series, StatError> {
        extract_series(&self.header, &self.lines, variable)
    }
}
