//! Header parser for the ASCII SDDS statistics files written by the simulation.
//!
//! A header is a sequence of `&column`, `&parameter` and `&data` directives,
//! each closed by `&end`. Directives may span several lines. The first `&data`
//! directive ends the header; the scalar parameter rows follow it, one per
//! declared parameter, and then one row per data point.

use super::StatError;
use std::collections::HashMap;

/// Upper bound on the number of lines a single directive may span.
pub const MAX_DIRECTIVE_LINES: usize = 64;

const COLUMN_TOKEN: &str = "&column";
const PARAMETER_TOKEN: &str = "&parameter";
const DATA_TOKEN: &str = "&data";
const END_TOKEN: &str = "&end";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub units: String,
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterInfo {
    pub row: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatFileHeader {
    pub columns: HashMap<String, ColumnInfo>,
    pub parameters: HashMap<String, ParameterInfo>,
    pub header_line_count: usize,
}

impl StatFileHeader {
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.get(name)
    }

    pub fn parameter(&self, name: &str) -> Option<&ParameterInfo> {
        self.parameters.get(name)
    }

    pub fn parameter_count(&self) -> usize {
        self.parameters.len()
    }

    /// Line offset of the first data row, right after the scalar parameter rows.
    pub fn data_start_line(&self) -> usize {
        self.header_line_count + self.parameters.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveKind {
    Column,
    Parameter,
    Data,
}

impl DirectiveKind {
    fn detect(line: &str) -> Option<Self> {
        if line.contains(COLUMN_TOKEN) {
            Some(Self::Column)
        } else if line.contains(PARAMETER_TOKEN) {
            Some(Self::Parameter)
        } else if line.contains(DATA_TOKEN) {
            Some(Self::Data)
        } else {
            None
        }
    }

    pub const fn token(self) -> &'static str {
        match self {
            Self::Column => COLUMN_TOKEN,
            Self::Parameter => PARAMETER_TOKEN,
            Self::Data => DATA_TOKEN,
        }
    }
}

enum ScanState {
    Outside,
    InDirective {
        kind: DirectiveKind,
        start_line: usize,
        lines_seen: usize,
        body: String,
    },
}

/// Parses the header block at the start of `lines`.
pub fn parse_header<S: AsRef<str>>(lines: &[S]) -> Result<StatFileHeader, StatError> {
    let mut header = StatFileHeader::default();
    let mut state = ScanState::Outside;

    for (index, line) in lines.iter().enumerate() {
        let line = line.as_ref();
        let line_number = index + 1;

        state = match state {
            ScanState::Outside => match DirectiveKind::detect(line) {
                Some(kind) => ScanState::InDirective {
                    kind,
                    start_line: line_number,
                    lines_seen: 1,
                    body: line.to_string(),
                },
                None => ScanState::Outside,
            },
            ScanState::InDirective {
                kind,
                start_line,
                lines_seen,
                mut body,
            } => {
                if lines_seen >= MAX_DIRECTIVE_LINES {
                    return Err(StatError::DirectiveTooLong {
                        directive: kind.token(),
                        line: start_line,
                        limit: MAX_DIRECTIVE_LINES,
                    });
                }
                body.push(' ');
                body.push_str(line);
                ScanState::InDirective {
                    kind,
                    start_line,
                    lines_seen: lines_seen + 1,
                    body,
                }
            }
        };

        if let ScanState::InDirective {
            kind,
            start_line,
            body,
            ..
        } = &state
        {
            if !line.contains(END_TOKEN) {
                continue;
            }

            match kind {
                DirectiveKind::Column => {
                    let name = directive_field(body, "name=").ok_or(StatError::MissingField {
                        directive: COLUMN_TOKEN,
                        field: "name",
                        line: *start_line,
                    })?;
                    let units = directive_field(body, "units=").ok_or(StatError::MissingField {
                        directive: COLUMN_TOKEN,
                        field: "units",
                        line: *start_line,
                    })?;
                    if header.columns.contains_key(&name) {
                        return Err(StatError::DuplicateName {
                            directive: COLUMN_TOKEN,
                            name,
                            line: *start_line,
                        });
                    }
                    let index = header.columns.len();
                    header.columns.insert(name, ColumnInfo { units, index });
                }
                DirectiveKind::Parameter => {
                    let name = directive_field(body, "name=").ok_or(StatError::MissingField {
                        directive: PARAMETER_TOKEN,
                        field: "name",
                        line: *start_line,
                    })?;
                    if header.parameters.contains_key(&name) {
                        return Err(StatError::DuplicateName {
                            directive: PARAMETER_TOKEN,
                            name,
                            line: *start_line,
                        });
                    }
                    let row = header.parameters.len();
                    header.parameters.insert(name, ParameterInfo { row });
                }
                DirectiveKind::Data => {
                    header.header_line_count = line_number;
                    return Ok(header);
                }
            }
            state = ScanState::Outside;
        }
    }

    match state {
        ScanState::InDirective {
            kind, start_line, ..
        } => Err(StatError::UnterminatedDirective {
            directive: kind.token(),
            line: start_line,
        }),
        ScanState::Outside => Err(StatError::MissingDataDirective),
    }
}

/// Value of a `key=value` fragment, up to the next comma.
fn directive_field(body: &str, key: &str) -> Option<String> {
    let (_, rest) = body.split_once(key)?;
    let value = rest.split(',').next().unwrap_or_default();
    let value = value.trim();
    let value = value.strip_suffix(END_TOKEN).unwrap_or(value).trim_end();
    Some(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::{MAX_DIRECTIVE_LINES, parse_header};
    use crate::stat::StatError;

    const HEADER: &str = "SDDS1
&description text=\"Statistics data\", contents=\"stat parameters\" &end
&parameter name=processors, type=long, description=\"Number of Cores used\" &end
&parameter name=revision, type=string,
    description=\"git revision of opal\" &end
&column name=t, type=double, units=ns, description=\"1 Time\" &end
&column name=s, type=double, units=m, description=\"2 Path length\" &end
&column
    name=rms_x, type=double, units=m,
    description=\"3 RMS Beamsize in x\"
&end
&data mode=ascii, no_row_counts=1 &end
8
OPAL-X 2.0.0 git rev. #a1b2c3d4e5f6
0.0 0.0 1.0e-3
";

    fn lines(text: &str) -> Vec<&str> {
        text.lines().collect()
    }

    #[test]
    fn assigns_indices_in_encounter_order() {
        let header = parse_header(&lines(HEADER)).expect("header should parse");

        assert_eq!(header.columns.len(), 3);
        assert_eq!(header.column("t").map(|column| column.index), Some(0));
        assert_eq!(header.column("s").map(|column| column.index), Some(1));
        assert_eq!(header.column("rms_x").map(|column| column.index), Some(2));
        assert_eq!(header.column("s").map(|column| column.units.as_str()), Some("m"));
        assert_eq!(header.parameter("processors").map(|p| p.row), Some(0));
        assert_eq!(header.parameter("revision").map(|p| p.row), Some(1));
    }

    #[test]
    fn header_line_count_points_at_first_parameter_row() {
        let all_lines = lines(HEADER);
        let header = parse_header(&all_lines).expect("header should parse");

        assert_eq!(header.header_line_count, 12);
        assert_eq!(all_lines[header.header_line_count], "8");
        assert_eq!(header.data_start_line(), 14);
        assert_eq!(all_lines[header.data_start_line()], "0.0 0.0 1.0e-3");
    }

    #[test]
    fn multi_line_data_directive_body_is_skipped() {
        let text = "&column name=s, units=m &end
&data mode=ascii,
   column_major_order=0,
   name=ignored, units=ignored
&end
1.0
";
        let header = parse_header(&lines(text)).expect("header should parse");
        assert_eq!(header.columns.len(), 1);
        assert_eq!(header.header_line_count, 5);
    }

    #[test]
    fn directives_interleaved_keep_separate_counters() {
        let text = "&parameter name=a &end
&column name=x, units=1 &end
&parameter name=b &end
&column name=s, units=m &end
&data &end
";
        let header = parse_header(&lines(text)).expect("header should parse");
        assert_eq!(header.parameter("b").map(|p| p.row), Some(1));
        assert_eq!(header.column("s").map(|c| c.index), Some(1));
        assert_eq!(header.column("x").map(|c| c.units.as_str()), Some("1"));
    }

    #[test]
    fn unterminated_directive_is_fatal() {
        let text = "&parameter name=revision
&column name=s, units=m
";
        let error = parse_header(&lines(text)).expect_err("unterminated directive must fail");
        assert!(matches!(
            error,
            StatError::UnterminatedDirective {
                directive: "&parameter",
                line: 1
            }
        ));
    }

    #[test]
    fn directive_exceeding_lookahead_is_rejected() {
        let mut text = String::from("&column name=s,\n");
        for _ in 0..MAX_DIRECTIVE_LINES {
            text.push_str("  description=\"padding\",\n");
        }
        text.push_str("units=m &end\n&data &end\n");

        let error = parse_header(&lines(&text)).expect_err("runaway directive must fail");
        assert!(matches!(error, StatError::DirectiveTooLong { line: 1, .. }));
    }

    #[test]
    fn column_without_units_is_fatal() {
        let text = "&column name=s, type=double &end\n&data &end\n";
        let error = parse_header(&lines(text)).expect_err("missing units must fail");
        assert!(matches!(
            error,
            StatError::MissingField {
                field: "units",
                ..
            }
        ));
    }

    #[test]
    fn duplicate_column_name_is_fatal() {
        let text = "&column name=s, units=m &end\n&column name=s, units=m &end\n&data &end\n";
        let error = parse_header(&lines(text)).expect_err("duplicate column must fail");
        assert!(matches!(error, StatError::DuplicateName { line: 2, .. }));
    }

    #[test]
    fn input_without_data_directive_is_fatal() {
        let text = "&column name=s, units=m &end\n";
        let error = parse_header(&lines(text)).expect_err("missing data marker must fail");
        assert!(matches!(error, StatError::MissingDataDirective));
    }
}
