//! Statement- and call-level checks: unreachable code, bare handlers,
//! dynamic evaluation and mutable defaults

use crate::protocol::{Issue, IssueKind};
use crate::static_analyzer::tree::{line_of, ParsedModule};
use crate::static_analyzer::Rule;
use anyhow::Result;

const DANGEROUS_CALLEES: &[&str] = &["eval", "exec"];

const MUTABLE_LITERALS: &[&str] = &["list", "dictionary", "set"];

/// First statement after a top-level `return` in a function body
pub struct UnreachableCode;

impl Rule for UnreachableCode {
    fn name(&self) -> &'static str {
        "unreachable"
    }

    fn check(&self, module: &ParsedModule<'_>) -> Result<Vec<Issue>> {
        let mut issues = vec![];

        for function in module.functions() {
            let Some(body) = function.child_by_field_name("body") else {
                continue;
            };

            let mut cursor = body.walk();
            let mut returned = false;
            for statement in body.named_children(&mut cursor) {
                if statement.kind() == "comment" {
                    continue;
                }
                if returned {
                    issues.push(Issue::new(
                        IssueKind::Unreachable,
                        format!(
                            "Unreachable code after return in '{}'",
                            module.definition_name(function)?
                        ),
                        Some(line_of(statement)),
                    ));
                    break;
                }
                if statement.kind() == "return_statement" {
                    returned = true;
                }
            }
        }

        Ok(issues)
    }
}

/// `except:` with no exception type
pub struct BareExcept;

impl Rule for BareExcept {
    fn name(&self) -> &'static str {
        "bare_except"
    }

    fn check(&self, module: &ParsedModule<'_>) -> Result<Vec<Issue>> {
        let issues = module
            .nodes()
            .filter(|node| node.kind() == "except_clause")
            .filter(|handler| {
                let mut cursor = handler.walk();
                let typed = handler
                    .named_children(&mut cursor)
                    .any(|child| !matches!(child.kind(), "block" | "comment"));
                !typed
            })
            .map(|handler| {
                Issue::new(
                    IssueKind::BareExcept,
                    "Bare 'except:' catches all exceptions; use 'except Exception' or a specific type",
                    Some(line_of(handler)),
                )
            })
            .collect();

        Ok(issues)
    }
}

/// Calls whose callee is named `eval` or `exec`, bare or as an attribute.
/// No alias resolution: `e = eval; e(s)` goes unnoticed.
pub struct DangerousCalls;

impl Rule for DangerousCalls {
    fn name(&self) -> &'static str {
        "dangerous_call"
    }

    fn check(&self, module: &ParsedModule<'_>) -> Result<Vec<Issue>> {
        let mut issues = vec![];

        for call in module.nodes().filter(|node| node.kind() == "call") {
            let Some(callee) = call.child_by_field_name("function") else {
                continue;
            };
            let name_node = match callee.kind() {
                "identifier" => Some(callee),
                "attribute" => callee.child_by_field_name("attribute"),
                _ => None,
            };
            let Some(name_node) = name_node else {
                continue;
            };

            let name = module.text(name_node)?;
            if DANGEROUS_CALLEES.contains(&name) {
                issues.push(Issue::new(
                    IssueKind::DangerousCall,
                    format!(
                        "Use of '{}()' is a security risk; avoid executing arbitrary strings",
                        name
                    ),
                    Some(line_of(call)),
                ));
            }
        }

        Ok(issues)
    }
}

/// List, dict or set literals as parameter defaults of a `def`
pub struct MutableDefaults;

impl Rule for MutableDefaults {
    fn name(&self) -> &'static str {
        "mutable_default"
    }

    fn check(&self, module: &ParsedModule<'_>) -> Result<Vec<Issue>> {
        let mut issues = vec![];

        for function in module.functions() {
            let Some(parameters) = function.child_by_field_name("parameters") else {
                continue;
            };

            let mut cursor = parameters.walk();
            for parameter in parameters.named_children(&mut cursor) {
                if !matches!(
                    parameter.kind(),
                    "default_parameter" | "typed_default_parameter"
                ) {
                    continue;
                }
                let mutable = parameter
                    .child_by_field_name("value")
                    .map_or(false, |value| MUTABLE_LITERALS.contains(&value.kind()));
                if mutable {
                    issues.push(Issue::new(
                        IssueKind::MutableDefault,
                        format!(
                            "Mutable default argument in '{}'; use None and assign inside the function",
                            module.definition_name(function)?
                        ),
                        Some(line_of(function)),
                    ));
                }
            }
        }

        Ok(issues)
    }
}
