//! Static scan and time-boxed execution of Python programs, with the results
//! shaped for display and for a model that explains or repairs the code.

pub mod error;
pub mod orchestrator;
pub mod patcher;
pub mod protocol;
pub mod report;
pub mod sandbox;
pub mod static_analyzer;

pub use orchestrator::{analyze_source, Session};
pub use protocol::{
    AnalysisResult, ComplexityScores, ExecutionResult, Issue, IssueKind, LlmPayload,
};
pub use sandbox::{run_in_sandbox, CodeRunner, Sandbox, SandboxConfig};
pub use static_analyzer::{analyze, analyze_with, AnalyzerConfig};
