//! Shared result shapes handed from the analyzer and the sandbox to the display and model layers

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::ser::{SerializeStruct, Serializer};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

/// Category of a structural issue found by the static analyzer
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// Statement following a `return` at function body level
    Unreachable,
    /// Imported name that is never read
    UnusedImport,
    /// `except:` without an exception type
    BareExcept,
    /// Call to `eval` or `exec`
    DangerousCall,
    /// List, dict or set literal used as a parameter default
    MutableDefault,
    /// Function whose cyclomatic complexity crossed the threshold
    HighComplexity,
    /// Name read before anything bound it (heuristic)
    UndefinedVar,
}

impl IssueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueKind::Unreachable => "unreachable",
            IssueKind::UnusedImport => "unused_import",
            IssueKind::BareExcept => "bare_except",
            IssueKind::DangerousCall => "dangerous_call",
            IssueKind::MutableDefault => "mutable_default",
            IssueKind::HighComplexity => "high_complexity",
            IssueKind::UndefinedVar => "undefined_var",
        }
    }
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single structural problem
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Issue {
    pub kind: IssueKind,
    pub message: String,
    /// 1-based line, `None` when the finding has no source position
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
}

impl Issue {
    pub fn new(kind: IssueKind, message: impl Into<String>, line: Option<usize>) -> Self {
        Self {
            kind,
            message: message.into(),
            line,
        }
    }
}

/// Function name to cyclomatic complexity, in first-seen order.
/// Repeated names overwrite the score but keep their first position.
pub type ComplexityScores = IndexMap<String, u32>;

/// Outcome of a static scan
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisResult {
    /// The source did not parse; no rule ran
    SyntaxError {
        message: String,
        line: Option<usize>,
    },
    Scanned {
        issues: Vec<Issue>,
        complexity: ComplexityScores,
    },
}

impl AnalysisResult {
    pub fn is_ok(&self) -> bool {
        matches!(self, AnalysisResult::Scanned { .. })
    }

    /// Issues of a successful scan, empty for a syntax failure
    pub fn issues(&self) -> &[Issue] {
        match self {
            AnalysisResult::Scanned { issues, .. } => issues,
            AnalysisResult::SyntaxError { .. } => &[],
        }
    }

    pub fn complexity(&self) -> Option<&ComplexityScores> {
        match self {
            AnalysisResult::Scanned { complexity, .. } => Some(complexity),
            AnalysisResult::SyntaxError { .. } => None,
        }
    }

    pub fn issues_of(&self, kind: IssueKind) -> impl Iterator<Item = &Issue> + '_ {
        self.issues().iter().filter(move |issue| issue.kind == kind)
    }
}

#[derive(Serialize)]
struct SyntaxErrorBody<'a> {
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    line: Option<usize>,
}

impl Serialize for AnalysisResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            AnalysisResult::SyntaxError { message, line } => {
                let mut state = serializer.serialize_struct("AnalysisResult", 2)?;
                state.serialize_field("ok", &false)?;
                state.serialize_field(
                    "error",
                    &SyntaxErrorBody {
                        message,
                        line: *line,
                    },
                )?;
                state.end()
            }
            AnalysisResult::Scanned { issues, complexity } => {
                let mut state = serializer.serialize_struct("AnalysisResult", 3)?;
                state.serialize_field("ok", &true)?;
                state.serialize_field("issues", issues)?;
                state.serialize_field("complexity", complexity)?;
                state.end()
            }
        }
    }
}

/// Outcome of one sandboxed run
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionResult {
    /// The process exited before the deadline
    Completed {
        stdout: String,
        stderr: String,
        /// Exit code, or the negated signal number when a signal ended the process
        exit_code: i32,
        elapsed_seconds: f64,
    },
    /// The deadline elapsed and the process group was reclaimed
    TimedOut { elapsed_seconds: f64 },
    /// The interpreter could not be launched or waited on
    Failed { error: String },
}

impl ExecutionResult {
    pub fn is_ok(&self) -> bool {
        matches!(self, ExecutionResult::Completed { .. })
    }

    pub fn timed_out(&self) -> bool {
        matches!(self, ExecutionResult::TimedOut { .. })
    }

    pub fn failed(error: impl Into<String>) -> Self {
        ExecutionResult::Failed {
            error: error.into(),
        }
    }

    pub fn elapsed_seconds(&self) -> Option<f64> {
        match self {
            ExecutionResult::Completed {
                elapsed_seconds, ..
            }
            | ExecutionResult::TimedOut { elapsed_seconds } => Some(*elapsed_seconds),
            ExecutionResult::Failed { .. } => None,
        }
    }
}

impl Serialize for ExecutionResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ExecutionResult::Completed {
                stdout,
                stderr,
                exit_code,
                elapsed_seconds,
            } => {
                let mut state = serializer.serialize_struct("ExecutionResult", 5)?;
                state.serialize_field("ok", &true)?;
                state.serialize_field("stdout", stdout)?;
                state.serialize_field("stderr", stderr)?;
                state.serialize_field("exit_code", exit_code)?;
                state.serialize_field("elapsed_seconds", elapsed_seconds)?;
                state.end()
            }
            ExecutionResult::TimedOut { elapsed_seconds } => {
                let mut state = serializer.serialize_struct("ExecutionResult", 3)?;
                state.serialize_field("ok", &false)?;
                state.serialize_field("timed_out", &true)?;
                state.serialize_field("elapsed_seconds", elapsed_seconds)?;
                state.end()
            }
            ExecutionResult::Failed { error } => {
                let mut state = serializer.serialize_struct("ExecutionResult", 2)?;
                state.serialize_field("ok", &false)?;
                state.serialize_field("error", error)?;
                state.end()
            }
        }
    }
}

/// Request body handed to the prompt-formatting layer
#[derive(Debug, Clone, Serialize)]
pub struct LlmPayload<'a> {
    pub session_id: Uuid,
    pub generated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<&'a str>,
    pub source: &'a str,
    pub ast_result: &'a AnalysisResult,
    pub runtime_result: &'a ExecutionResult,
}

impl<'a> LlmPayload<'a> {
    pub fn new(
        file: Option<&'a str>,
        source: &'a str,
        ast_result: &'a AnalysisResult,
        runtime_result: &'a ExecutionResult,
    ) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            file,
            source,
            ast_result,
            runtime_result,
        }
    }
}
