pub mod assertions;
pub mod checksum;
pub mod cleanup;
pub mod comparator;
pub mod discovery;
pub mod execution;
pub mod plot;
pub mod publish;
pub mod regression;
pub mod report;
pub mod suite;

pub use assertions::{Assertion, AssertionList, AssertionParseError, parse_assertion_list};
pub use comparator::{ComparisonError, StatComparator, compute_delta};
pub use discovery::{DiscoveryError, discover_tests, select_tests};
pub use execution::{
    ExecutionBackend, ExecutionError, ExecutionOutput, ExecutionRequest, LocalProcessBackend,
};
pub use plot::{DisabledPlotRenderer, GnuplotRenderer, PlotError, PlotRenderer, PlotRequest};
pub use regression::{CaseContext, CaseState, CaseSummary, RegressionCase};
pub use report::{Report, ReportError, ReportNode, TestTally};
pub use suite::{
    CommandRevisionProbe, RevisionProbe, SuiteConfig, SuiteError, SuiteRunner, SuiteSummary,
};
