use std::error::Error;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegtestErrorCategory {
    InputValidationError,
    IoSystemError,
    InternalError,
}

impl RegtestErrorCategory {
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::InputValidationError => 2,
            Self::IoSystemError => 3,
            Self::InternalError => 5,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InputValidationError => "InputValidationError",
            Self::IoSystemError => "IoSystemError",
            Self::InternalError => "InternalError",
        }
    }
}

/// Top-level error carried out of the suite runner and rendered by the CLI.
///
/// Per-assertion and per-case failures never reach this type; they are turned
/// into `broken`/`failed` outcomes in the report instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegtestError {
    category: RegtestErrorCategory,
    placeholder: &'static str,
    message: String,
}

impl RegtestError {
    pub fn new(
        category: RegtestErrorCategory,
        placeholder: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            placeholder,
            message: message.into(),
        }
    }

    pub fn input_validation(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(
            RegtestErrorCategory::InputValidationError,
            placeholder,
            message,
        )
    }

    pub fn io_system(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(RegtestErrorCategory::IoSystemError, placeholder, message)
    }

    pub fn internal(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(RegtestErrorCategory::InternalError, placeholder, message)
    }

    pub const fn category(&self) -> RegtestErrorCategory {
        self.category
    }

    pub const fn placeholder(&self) -> &'static str {
        self.placeholder
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn exit_code(&self) -> i32 {
        self.category.exit_code()
    }

    pub fn diagnostic_line(&self) -> String {
        format!("ERROR: [{}] {}", self.placeholder, self.message)
    }

    pub fn fatal_exit_line(&self) -> String {
        format!("FATAL EXIT CODE: {}", self.exit_code())
    }
}

impl Display for RegtestError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}] {}",
            self.category.as_str(),
            self.placeholder,
            self.message
        )
    }
}

impl Error for RegtestError {}

#[cfg(test)]
mod tests {
    use super::{RegtestError, RegtestErrorCategory};

    #[test]
    fn exit_codes_are_stable_per_category() {
        let cases = [
            (RegtestErrorCategory::InputValidationError, 2),
            (RegtestErrorCategory::IoSystemError, 3),
            (RegtestErrorCategory::InternalError, 5),
        ];

        for (category, exit_code) in cases {
            assert_eq!(category.exit_code(), exit_code);
        }
    }

    #[test]
    fn fatal_error_renders_diagnostic_lines() {
        let error = RegtestError::io_system(
            "IO.SUITE_BASE_DIR",
            "/tmp/missing - regression tests base directory does not exist!",
        );

        assert_eq!(error.exit_code(), 3);
        assert_eq!(
            error.diagnostic_line(),
            "ERROR: [IO.SUITE_BASE_DIR] /tmp/missing - regression tests base directory does not exist!"
        );
        assert_eq!(error.fatal_exit_line(), "FATAL EXIT CODE: 3");
        assert_eq!(
            error.to_string(),
            "IoSystemError [IO.SUITE_BASE_DIR] /tmp/missing - regression tests base directory does not exist!"
        );
    }
}
