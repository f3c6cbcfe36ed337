pub mod dependencies;
pub mod locator;
pub mod matchers;
pub mod reader;
pub mod workspace;

pub use dependencies::DependencyAnalyzer;
pub use locator::SourceLocator;
pub use matchers::{LineMatcher, StrategyTable};
pub use reader::{FsSourceReader, SourceReader};
pub use workspace::{collect_candidate_files, collect_dependencies, collect_workspace_structure};
