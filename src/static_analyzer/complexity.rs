//! Cyclomatic complexity per function: one plus the number of branch-like nodes

use crate::protocol::{ComplexityScores, Issue, IssueKind};
use crate::static_analyzer::tree::{line_of, ParsedModule, Preorder};
use anyhow::Result;
use tree_sitter::Node;

/// Node kinds that each add one decision point. `boolean_operator` is binary
/// in this grammar, so an N-operand `and`/`or` chain adds N-1.
const BRANCH_KINDS: &[&str] = &[
    "if_statement",
    "elif_clause",
    "for_statement",
    "while_statement",
    "except_clause",
    "except_group_clause",
    "with_statement",
    "assert_statement",
    "for_in_clause",
    "boolean_operator",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionComplexity {
    pub name: String,
    pub line: usize,
    pub score: u32,
}

/// Score every function in document order. Nested functions are counted
/// both on their own and as part of every enclosing function.
pub fn measure(module: &ParsedModule<'_>) -> Result<Vec<FunctionComplexity>> {
    module
        .functions()
        .map(|function| {
            Ok(FunctionComplexity {
                name: module.definition_name(function)?.to_string(),
                line: line_of(function),
                score: score(function),
            })
        })
        .collect()
}

pub fn score(function: Node<'_>) -> u32 {
    let branches = Preorder::new(function)
        .filter(|node| BRANCH_KINDS.contains(&node.kind()))
        .count();
    1 + branches as u32
}

pub fn to_scores(measured: &[FunctionComplexity]) -> ComplexityScores {
    let mut scores = ComplexityScores::new();
    for function in measured {
        scores.insert(function.name.clone(), function.score);
    }
    scores
}

pub fn high_complexity_issues(measured: &[FunctionComplexity], threshold: u32) -> Vec<Issue> {
    measured
        .iter()
        .filter(|function| function.score >= threshold)
        .map(|function| {
            Issue::new(
                IssueKind::HighComplexity,
                format!(
                    "'{}' has high cyclomatic complexity ({}); consider refactoring",
                    function.name, function.score
                ),
                Some(function.line),
            )
        })
        .collect()
}
