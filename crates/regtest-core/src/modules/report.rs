//! Result aggregation for one suite run.
//!
//! A [`Report`] is created by the suite runner and handed by `&mut` reference
//! to every step that records an outcome. It keeps the human-readable log and
//! the result tree side by side. The `broken`/`failed` counts published on the
//! index page are derived from the log wording, so log lines written here are
//! part of the counting contract.

use crate::domain::{TestOutcome, TestState, format_number};
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesPI, BytesStart, BytesText, Event};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const ROOT_ELEMENT: &str = "Tests";
pub const STYLESHEET_INSTRUCTION: &str = r#"xml-stylesheet type="text/xsl" href="results.xslt""#;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DateNode {
    pub start: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationNode {
    pub name: String,
    pub date: String,
    pub description: String,
    pub tests: Vec<TestOutcome>,
}

impl SimulationNode {
    pub fn new(
        name: impl Into<String>,
        date: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            date: date.into(),
            description: description.into(),
            tests: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RevisionNode {
    pub code: String,
    pub code_full: String,
    pub tests: String,
    pub tests_full: String,
}

impl RevisionNode {
    pub fn from_full(code_full: impl Into<String>, tests_full: impl Into<String>) -> Self {
        let code_full = code_full.into();
        let tests_full = tests_full.into();
        Self {
            code: code_full.chars().take(7).collect(),
            code_full,
            tests: tests_full.chars().take(7).collect(),
            tests_full,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ReportNode {
    Date(DateNode),
    Simulation(SimulationNode),
    Revisions(RevisionNode),
}

/// Counts taken from the result tree rather than from the log text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct TestTally {
    pub tests: usize,
    pub passed: usize,
    pub failed: usize,
    pub broken: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("cannot render XML report: {0}")]
    Render(String),
    #[error("cannot create report directory '{}': {source}", path.display())]
    Directory {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot write report '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Default)]
pub struct Report {
    log: String,
    tree: Option<Vec<ReportNode>>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_log(&mut self, text: impl AsRef<str>) {
        self.log.push_str(text.as_ref());
    }

    pub fn log(&self) -> &str {
        &self.log
    }

    /// Attaches a node under the `Tests` root, creating the root on first use.
    pub fn append_result(&mut self, node: ReportNode) {
        self.tree.get_or_insert_with(Vec::new).push(node);
    }

    pub fn nodes(&self) -> &[ReportNode] {
        self.tree.as_deref().unwrap_or_default()
    }

    pub fn has_tree(&self) -> bool {
        self.tree.is_some()
    }

    pub fn simulations(&self) -> impl Iterator<Item = &SimulationNode> {
        self.nodes().iter().filter_map(|node| match node {
            ReportNode::Simulation(simulation) => Some(simulation),
            _ => None,
        })
    }

    pub fn count_broken(&self) -> usize {
        self.log.matches("broken").count()
    }

    pub fn count_failed(&self) -> usize {
        self.log.matches("failed").count()
    }

    pub fn tally(&self) -> TestTally {
        let mut tally = TestTally::default();
        for outcome in self.simulations().flat_map(|simulation| simulation.tests.iter()) {
            tally.tests += 1;
            match outcome.state {
                TestState::Passed => tally.passed += 1,
                TestState::Failed => tally.failed += 1,
                TestState::Broken => tally.broken += 1,
            }
        }
        tally
    }

    /// Renders the result tree; `None` when nothing was ever recorded.
    pub fn render_xml(&self, plots_dir: &str) -> Result<Option<String>, ReportError> {
        let Some(nodes) = self.tree.as_ref() else {
            return Ok(None);
        };

        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        write_event(&mut writer, Event::Decl(BytesDecl::new("1.0", None, None)))?;
        write_event(&mut writer, Event::PI(BytesPI::new(STYLESHEET_INSTRUCTION)))?;
        write_event(&mut writer, Event::Start(BytesStart::new(ROOT_ELEMENT)))?;
        for node in nodes {
            write_node(&mut writer, node, plots_dir)?;
        }
        write_event(&mut writer, Event::End(BytesEnd::new(ROOT_ELEMENT)))?;

        let mut content = String::from_utf8(writer.into_inner())
            .map_err(|source| ReportError::Render(source.to_string()))?;
        content.push('\n');
        Ok(Some(content))
    }

    /// Writes the XML report to `path`. Returns `false` when there was nothing
    /// to write.
    pub fn serialize(&self, path: impl AsRef<Path>, plots_dir: &str) -> Result<bool, ReportError> {
        let path = path.as_ref();
        let Some(content) = self.render_xml(plots_dir)? else {
            return Ok(false);
        };

        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| ReportError::Directory {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(path, content).map_err(|source| ReportError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(true)
    }
}

fn write_node(
    writer: &mut Writer<Vec<u8>>,
    node: &ReportNode,
    plots_dir: &str,
) -> Result<(), ReportError> {
    match node {
        ReportNode::Date(date) => {
            write_event(writer, Event::Start(BytesStart::new("Date")))?;
            write_text_element(writer, "start", &date.start)?;
            write_event(writer, Event::End(BytesEnd::new("Date")))
        }
        ReportNode::Simulation(simulation) => {
            let mut start = BytesStart::new("Simulation");
            start.push_attribute(("name", simulation.name.as_str()));
            start.push_attribute(("date", simulation.date.as_str()));
            start.push_attribute(("description", simulation.description.as_str()));
            if simulation.tests.is_empty() {
                return write_event(writer, Event::Empty(start));
            }
            write_event(writer, Event::Start(start))?;
            for outcome in &simulation.tests {
                write_outcome(writer, outcome, plots_dir)?;
            }
            write_event(writer, Event::End(BytesEnd::new("Simulation")))
        }
        ReportNode::Revisions(revisions) => {
            write_event(writer, Event::Start(BytesStart::new("Revisions")))?;
            write_text_element(writer, "code", &revisions.code)?;
            write_text_element(writer, "code_full", &revisions.code_full)?;
            write_text_element(writer, "tests", &revisions.tests)?;
            write_text_element(writer, "tests_full", &revisions.tests_full)?;
            write_event(writer, Event::End(BytesEnd::new("Revisions")))
        }
    }
}

fn write_outcome(
    writer: &mut Writer<Vec<u8>>,
    outcome: &TestOutcome,
    plots_dir: &str,
) -> Result<(), ReportError> {
    let mut start = BytesStart::new("Test");
    start.push_attribute(("type", "stat"));
    start.push_attribute(("var", outcome.variable.as_str()));
    start.push_attribute(("mode", outcome.mode.as_str()));
    write_event(writer, Event::Start(start))?;
    write_text_element(writer, "state", outcome.state.as_str())?;
    let epsilon = outcome
        .epsilon
        .map_or_else(|| "-".to_string(), format_number);
    write_text_element(writer, "eps", &epsilon)?;
    write_text_element(writer, "delta", &outcome.delta.to_string())?;
    if let Some(plot) = &outcome.plot {
        write_text_element(writer, "plot", &format!("{}/{}", plots_dir, plot))?;
    }
    write_event(writer, Event::End(BytesEnd::new("Test")))
}

fn write_text_element(
    writer: &mut Writer<Vec<u8>>,
    name: &str,
    text: &str,
) -> Result<(), ReportError> {
    if text.is_empty() {
        return write_event(writer, Event::Empty(BytesStart::new(name)));
    }
    write_event(writer, Event::Start(BytesStart::new(name)))?;
    write_event(writer, Event::Text(BytesText::new(text)))?;
    write_event(writer, Event::End(BytesEnd::new(name)))
}

fn write_event(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<(), ReportError> {
    writer
        .write_event(event)
        .map_err(|source| ReportError::Render(source.to_string()))
}

#[cfg(test)]
mod tests {
    use super::{DateNode, Report, ReportNode, RevisionNode, SimulationNode, TestTally};
    use crate::domain::{ComparisonMode, ComparisonSpec, TestOutcome};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn counts_literal_words_in_log_regardless_of_order() {
        let mut report = Report::new();
        report.append_log("Test a(last) failed: 2.0 (eps=1.5) \n");
        report.append_log("\t Test b(avg) broken \n");
        report.append_log("Test c(last) failed: 3.0 (eps=1.5) \n");

        assert_eq!(report.count_failed(), 2);
        assert_eq!(report.count_broken(), 1);

        let mut reordered = Report::new();
        reordered.append_log("\t Test b(avg) broken \n");
        reordered.append_log("failed failed");
        assert_eq!(reordered.count_failed(), 2);
        assert_eq!(reordered.count_broken(), 1);
    }

    #[test]
    fn log_is_append_only_and_ordered() {
        let mut report = Report::new();
        report.append_log("first ");
        report.append_log(String::from("second"));
        assert_eq!(report.log(), "first second");
    }

    #[test]
    fn root_is_created_lazily() {
        let mut report = Report::new();
        assert!(!report.has_tree());
        assert_eq!(report.render_xml("plots").expect("render should succeed"), None);

        report.append_result(ReportNode::Date(DateNode {
            start: "2026-10-18T09:00:00.000000".to_string(),
        }));
        assert!(report.has_tree());
        assert_eq!(report.nodes().len(), 1);
    }

    #[test]
    fn renders_tree_with_stylesheet_and_plot_directory() {
        let mut report = Report::new();
        let mut simulation = SimulationNode::new("Gauss", "2026-10-18", "Gaussian <beam>");
        let spec = ComparisonSpec::new("rms_x", ComparisonMode::Last, 1e-5);
        simulation.tests.push(TestOutcome::evaluated(
            &spec,
            0.0,
            Some("Gauss_rms_x.png".to_string()),
        ));
        simulation
            .tests
            .push(TestOutcome::broken("energy", "avg", 0.5));
        simulation.tests.push(TestOutcome::unparsed("emit_x"));
        report.append_result(ReportNode::Simulation(simulation));
        report.append_result(ReportNode::Revisions(RevisionNode::from_full(
            "0123456789abcdef",
            "",
        )));

        let xml = report
            .render_xml("plots_2026-10-18")
            .expect("render should succeed")
            .expect("tree should exist");

        assert!(xml.starts_with("<?xml version=\"1.0\"?>"));
        assert!(xml.contains(r#"<?xml-stylesheet type="text/xsl" href="results.xslt"?>"#));
        assert!(xml.contains(
            r#"<Simulation name="Gauss" date="2026-10-18" description="Gaussian &lt;beam&gt;">"#
        ));
        assert!(xml.contains(r#"<Test type="stat" var="rms_x" mode="last">"#));
        assert!(xml.contains("<state>passed</state>"));
        assert!(xml.contains("<eps>1e-05</eps>"));
        assert!(xml.contains("<delta>0.0</delta>"));
        assert!(xml.contains("<plot>plots_2026-10-18/Gauss_rms_x.png</plot>"));
        assert!(xml.contains("<state>broken</state>"));
        assert!(xml.contains("<delta>-</delta>"));
        assert!(xml.contains(r#"<Test type="stat" var="emit_x" mode="-">"#));
        assert!(xml.contains("<eps>-</eps>"));
        assert!(!xml.contains("<eps>0.0</eps>"));
        assert!(xml.contains("<code>0123456</code>"));
        assert!(xml.contains("<code_full>0123456789abcdef</code_full>"));
        assert!(xml.contains("<tests/>"));
    }

    #[test]
    fn tally_counts_outcomes_from_tree() {
        let mut report = Report::new();
        let spec = ComparisonSpec::new("x", ComparisonMode::Avg, 1.0);
        let mut simulation = SimulationNode::new("A", "2026-10-18", "a");
        simulation.tests.push(TestOutcome::evaluated(&spec, 0.5, None));
        simulation.tests.push(TestOutcome::evaluated(&spec, 1.5, None));
        simulation.tests.push(TestOutcome::broken("y", "last", 1.0));
        report.append_result(ReportNode::Simulation(simulation));

        assert_eq!(
            report.tally(),
            TestTally {
                tests: 3,
                passed: 1,
                failed: 1,
                broken: 1,
            }
        );
    }

    #[test]
    fn serialize_writes_file_only_when_tree_exists() {
        let temp = TempDir::new().expect("tempdir should be created");
        let path = temp.path().join("www/results_2026-10-18.xml");

        let empty = Report::new();
        assert!(!empty.serialize(&path, "plots").expect("serialize should succeed"));
        assert!(!path.exists());

        let mut report = Report::new();
        report.append_result(ReportNode::Simulation(SimulationNode::new(
            "A",
            "2026-10-18",
            "no tests",
        )));
        assert!(report.serialize(&path, "plots").expect("serialize should succeed"));
        let content = fs::read_to_string(&path).expect("report should be readable");
        assert!(content.contains("<Tests>"));
        assert!(content.contains(r#"<Simulation name="A" date="2026-10-18" description="no tests"/>"#));
    }
}
