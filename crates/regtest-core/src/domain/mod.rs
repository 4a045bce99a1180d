pub mod errors;

pub use errors::{RegtestError, RegtestErrorCategory};

use serde::Serialize;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// How a run series is reduced against its reference series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonMode {
    Last,
    Avg,
    Error,
    All,
}

impl ComparisonMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Last => "last",
            Self::Avg => "avg",
            Self::Error => "error",
            Self::All => "all",
        }
    }
}

impl Display for ComparisonMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str((*self).as_str())
    }
}

impl FromStr for ComparisonMode {
    type Err = String;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        match token {
            "last" => Ok(Self::Last),
            "avg" => Ok(Self::Avg),
            "error" => Ok(Self::Error),
            "all" => Ok(Self::All),
            other => Err(format!("unknown quantity '{}'", other)),
        }
    }
}

/// One declared assertion of a case.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonSpec {
    pub variable: String,
    pub mode: ComparisonMode,
    pub epsilon: f64,
}

impl ComparisonSpec {
    pub fn new(variable: impl Into<String>, mode: ComparisonMode, epsilon: f64) -> Self {
        Self {
            variable: variable.into(),
            mode,
            epsilon,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TestState {
    Passed,
    Failed,
    Broken,
}

impl TestState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Broken => "broken",
        }
    }
}

impl Display for TestState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str((*self).as_str())
    }
}

/// Discrepancy metric of an assertion; `NotComputed` renders as `-`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Delta {
    NotComputed,
    Value(f64),
}

impl Display for Delta {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotComputed => f.write_str("-"),
            Self::Value(value) => f.write_str(&format_number(*value)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestOutcome {
    pub variable: String,
    pub mode: String,
    /// `None` when the assertion line never yielded a tolerance.
    pub epsilon: Option<f64>,
    pub state: TestState,
    pub delta: Delta,
    pub plot: Option<String>,
}

impl TestOutcome {
    pub fn broken(variable: impl Into<String>, mode: impl Into<String>, epsilon: f64) -> Self {
        Self {
            variable: variable.into(),
            mode: mode.into(),
            epsilon: Some(epsilon),
            state: TestState::Broken,
            delta: Delta::NotComputed,
            plot: None,
        }
    }

    /// Broken outcome for an assertion line that did not parse.
    pub fn unparsed(variable: impl Into<String>) -> Self {
        Self {
            variable: variable.into(),
            mode: "-".to_string(),
            epsilon: None,
            state: TestState::Broken,
            delta: Delta::NotComputed,
            plot: None,
        }
    }

    pub fn evaluated(spec: &ComparisonSpec, delta: f64, plot: Option<String>) -> Self {
        let state = if delta < spec.epsilon {
            TestState::Passed
        } else {
            TestState::Failed
        };
        Self {
            variable: spec.variable.clone(),
            mode: spec.mode.as_str().to_string(),
            epsilon: Some(spec.epsilon),
            state,
            delta: Delta::Value(delta),
            plot,
        }
    }

    pub fn passed(&self) -> bool {
        self.state == TestState::Passed
    }
}

/// Renders a float the way the report and log have always shown numbers:
/// shortest round-trip digits, a trailing `.0` for integral values and a
/// two-digit signed exponent outside `1e-4 <= |x| < 1e16`.
pub fn format_number(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if value == 0.0 {
        return if value.is_sign_negative() { "-0.0" } else { "0.0" }.to_string();
    }

    let scientific = format!("{:e}", value);
    let (mantissa, exponent) = match scientific.split_once('e') {
        Some((mantissa, exponent)) => (mantissa, exponent.parse::<i32>().unwrap_or(0)),
        None => (scientific.as_str(), 0),
    };

    if !(-4..16).contains(&exponent) {
        let sign = if exponent < 0 { '-' } else { '+' };
        return format!("{}e{}{:02}", mantissa, sign, exponent.abs());
    }

    let plain = format!("{}", value);
    if plain.contains('.') {
        plain
    } else {
        format!("{}.0", plain)
    }
}

#[cfg(test)]
mod tests {
    use super::{ComparisonMode, ComparisonSpec, Delta, TestOutcome, TestState, format_number};

    #[test]
    fn comparison_mode_parses_known_tokens_only() {
        assert_eq!("last".parse::<ComparisonMode>(), Ok(ComparisonMode::Last));
        assert_eq!("avg".parse::<ComparisonMode>(), Ok(ComparisonMode::Avg));
        assert_eq!("error".parse::<ComparisonMode>(), Ok(ComparisonMode::Error));
        assert_eq!("all".parse::<ComparisonMode>(), Ok(ComparisonMode::All));
        assert!("mean".parse::<ComparisonMode>().is_err());
        assert!("LAST".parse::<ComparisonMode>().is_err());
    }

    #[test]
    fn outcome_passes_only_strictly_below_epsilon() {
        let spec = ComparisonSpec::new("rms_x", ComparisonMode::Last, 2.0);

        assert_eq!(TestOutcome::evaluated(&spec, 1.999, None).state, TestState::Passed);
        assert_eq!(TestOutcome::evaluated(&spec, 2.0, None).state, TestState::Failed);
        assert_eq!(TestOutcome::evaluated(&spec, 3.0, None).state, TestState::Failed);
    }

    #[test]
    fn broken_outcome_has_sentinel_delta() {
        let outcome = TestOutcome::broken("rms_x", "avg", 1e-3);
        assert_eq!(outcome.delta, Delta::NotComputed);
        assert_eq!(outcome.delta.to_string(), "-");
        assert!(!outcome.passed());

        let unparsed = TestOutcome::unparsed("rms_x");
        assert_eq!(unparsed.state, TestState::Broken);
        assert_eq!(unparsed.epsilon, None);
        assert_eq!(unparsed.mode, "-");
    }

    #[test]
    fn numbers_render_with_shortest_round_trip_text() {
        assert_eq!(format_number(2.0), "2.0");
        assert_eq!(format_number(1.5), "1.5");
        assert_eq!(format_number(0.0), "0.0");
        assert_eq!(format_number(2.0 / 3.0), "0.6666666666666666");
        assert_eq!(format_number(1e-5), "1e-05");
        assert_eq!(format_number(2.5e-10), "2.5e-10");
        assert_eq!(format_number(1e16), "1e+16");
        assert_eq!(format_number(0.0001), "0.0001");
        assert_eq!(format_number(-12.0), "-12.0");
    }
}
