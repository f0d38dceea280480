//! Static structural analysis of Python source.
//! Parses once with tree-sitter, then runs a closed set of heuristic rules
//! over the same tree. Pure: no I/O, no shared state.

use crate::protocol::{AnalysisResult, Issue};
use crate::static_analyzer::checks::{BareExcept, DangerousCalls, MutableDefaults, UnreachableCode};
use crate::static_analyzer::names::{UndefinedNames, UnusedImports};
use crate::static_analyzer::tree::ParsedModule;
use anyhow::Result;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, warn};

pub mod checks;
pub mod complexity;
pub mod names;
pub mod syntax;
pub mod tree;

/// Default score at which a function is reported as too complex
pub const DEFAULT_COMPLEXITY_THRESHOLD: u32 = 10;

/// A single issue-producing check over a parsed module
pub trait Rule {
    /// Stable identifier used in logs
    fn name(&self) -> &'static str;

    /// Findings in document order
    fn check(&self, module: &ParsedModule<'_>) -> Result<Vec<Issue>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalyzerConfig {
    /// Functions scoring at or above this get a `high_complexity` issue
    pub complexity_threshold: u32,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            complexity_threshold: DEFAULT_COMPLEXITY_THRESHOLD,
        }
    }
}

/// Scan `source` with the default configuration
pub fn analyze(source: &str) -> AnalysisResult {
    analyze_with(source, &AnalyzerConfig::default())
}

/// Scan `source`. Issues come grouped by rule in this order: unreachable,
/// unused_import, bare_except, dangerous_call, mutable_default,
/// high_complexity, undefined_var; each group is in document order.
pub fn analyze_with(source: &str, config: &AnalyzerConfig) -> AnalysisResult {
    let module = match ParsedModule::parse(source) {
        Ok(module) => module,
        Err(failure) => {
            debug!(line = ?failure.line, "source does not parse: {}", failure.message);
            return AnalysisResult::SyntaxError {
                message: failure.message,
                line: failure.line,
            };
        }
    };

    let structural: [&dyn Rule; 5] = [
        &UnreachableCode,
        &UnusedImports,
        &BareExcept,
        &DangerousCalls,
        &MutableDefaults,
    ];

    let mut issues = vec![];
    for rule in structural {
        issues.extend(isolated(rule.name(), || rule.check(&module)));
    }

    let measured = isolated("complexity", || complexity::measure(&module));
    issues.extend(complexity::high_complexity_issues(
        &measured,
        config.complexity_threshold,
    ));

    issues.extend(isolated(UndefinedNames.name(), || {
        UndefinedNames.check(&module)
    }));

    debug!(
        issues = issues.len(),
        functions = measured.len(),
        "static scan finished"
    );

    AnalysisResult::Scanned {
        issues,
        complexity: complexity::to_scores(&measured),
    }
}

/// Run one rule so that an error or a panic inside it only empties its own
/// findings
fn isolated<T, F>(rule: &str, body: F) -> T
where
    T: Default,
    F: FnOnce() -> Result<T>,
{
    match panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(findings)) => findings,
        Ok(Err(e)) => {
            warn!(rule, "rule failed, reporting no findings: {:#}", e);
            T::default()
        }
        Err(payload) => {
            warn!(
                rule,
                "rule panicked, reporting no findings: {}",
                panic_message(payload.as_ref())
            );
            T::default()
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
