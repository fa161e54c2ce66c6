pub mod analyzer;
pub mod config;
pub mod corpus;
pub mod error;
pub mod graph;
pub mod isolate;
pub mod layer;
pub mod metrics;
pub mod pipeline;
pub mod run;
pub mod tree;
pub mod types;

pub use analyzer::{Analyzer, ParseCancelled, SourceParser};
pub use config::Config;
pub use error::PipelineError;
pub use pipeline::{AbortHandle, AnalysisPipeline};
pub use run::AnalysisRun;
