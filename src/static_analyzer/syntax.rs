//! Checks for programs the grammar accepts but the interpreter refuses to
//! compile. Tree-sitter recovers from some of these without leaving an
//! `ERROR` node (an empty block, stray indentation) and still knows Python 2
//! statement forms.

use crate::static_analyzer::tree::{line_of, Preorder, SyntaxFailure};
use tree_sitter::Node;

/// Statement kinds that only exist in Python 2
const LEGACY_STATEMENTS: &[(&str, &str)] = &[("print_statement", "print"), ("exec_statement", "exec")];

/// Earliest structural error in the tree, by line
pub fn first_structural_error(root: Node<'_>) -> Option<SyntaxFailure> {
    let mut failures = vec![];

    for node in Preorder::new(root) {
        match node.kind() {
            "module" => failures.extend(misaligned(node, Some(0))),
            "block" => {
                if significant_children(node).next().is_none() {
                    failures.push(empty_block(node));
                } else {
                    failures.extend(misaligned(node, None));
                }
            }
            "parameters" | "lambda_parameters" => failures.extend(default_order(node)),
            kind => {
                if let Some((_, keyword)) = LEGACY_STATEMENTS.iter().find(|(k, _)| *k == kind) {
                    failures.push(SyntaxFailure {
                        message: format!("Missing parentheses in call to '{}'", keyword),
                        line: Some(line_of(node)),
                    });
                }
            }
        }
    }

    // Preorder reports a parent's problems before its children's, so pick by line
    failures.into_iter().min_by_key(|failure| failure.line)
}

fn significant_children<'t>(container: Node<'t>) -> impl Iterator<Item = Node<'t>> {
    let mut cursor = container.walk();
    let children: Vec<Node<'t>> = container.named_children(&mut cursor).collect();
    children.into_iter().filter(|child| child.kind() != "comment")
}

/// A compound statement whose body has no statements. Reported where the
/// interpreter does: on the next statement, or the line after the header.
fn empty_block(block: Node<'_>) -> SyntaxFailure {
    let mut current = block;
    let next = loop {
        let sibling = {
            let mut sibling = current.next_named_sibling();
            while let Some(node) = sibling.filter(|node| node.kind() == "comment") {
                sibling = node.next_named_sibling();
            }
            sibling
        };
        if sibling.is_some() {
            break sibling;
        }
        match current.parent() {
            Some(parent) => current = parent,
            None => break None,
        }
    };

    let line = match next {
        Some(node) => line_of(node),
        None => {
            let header_end = block
                .prev_sibling()
                .map_or(block.start_position().row, |colon| colon.end_position().row);
            header_end + 2
        }
    };

    SyntaxFailure {
        message: "expected an indented block".to_string(),
        line: Some(line),
    }
}

/// First statement that starts a line at a different column than the rest of
/// its container. Statements sharing a line with the one before them
/// (`a = 1; b = 2`) are not checked.
fn misaligned(container: Node<'_>, required: Option<usize>) -> Option<SyntaxFailure> {
    let mut expected = required;
    let mut previous_end_row: Option<usize> = None;

    for statement in significant_children(container) {
        let start = statement.start_position();
        let shares_line = previous_end_row.map_or(false, |row| row == start.row);
        previous_end_row = Some(statement.end_position().row);
        if shares_line {
            continue;
        }

        match expected {
            None => expected = Some(start.column),
            Some(column) if column == start.column => {}
            Some(column) => {
                let message = if start.column > column {
                    "unexpected indent"
                } else {
                    "unindent does not match any outer indentation level"
                };
                return Some(SyntaxFailure {
                    message: message.to_string(),
                    line: Some(line_of(statement)),
                });
            }
        }
    }

    None
}

/// A parameter without a default after one with a default, before any `*`
fn default_order(parameters: Node<'_>) -> Option<SyntaxFailure> {
    let mut seen_default = false;

    for parameter in significant_children(parameters) {
        match parameter.kind() {
            "default_parameter" | "typed_default_parameter" => seen_default = true,
            "identifier" | "typed_parameter" if !is_star(parameter) => {
                if seen_default {
                    return Some(SyntaxFailure {
                        message: "parameter without a default follows parameter with a default"
                            .to_string(),
                        line: Some(line_of(parameter)),
                    });
                }
            }
            "positional_separator" => {}
            // `*`, `*args`, `**kwargs`: keyword-only parameters follow
            _ => break,
        }
    }

    None
}

/// `*args: T` and `**kw: T` are typed parameters wrapping a splat
fn is_star(parameter: Node<'_>) -> bool {
    parameter.kind() == "typed_parameter"
        && parameter.named_child(0).map_or(false, |inner| {
            matches!(
                inner.kind(),
                "list_splat_pattern" | "dictionary_splat_pattern"
            )
        })
}
