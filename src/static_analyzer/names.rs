//! Name-based rules: unused imports and the flat undefined-name heuristic

use crate::protocol::{Issue, IssueKind};
use crate::static_analyzer::tree::{line_of, name_context, NameContext, ParsedModule, Preorder};
use crate::static_analyzer::Rule;
use anyhow::{anyhow, Result};
use std::collections::HashSet;
use tree_sitter::Node;

/// Names the undefined-name heuristic treats as always bound
const BUILTINS: &[&str] = &[
    "abs", "aiter", "all", "anext", "any", "ascii", "bin", "bool", "breakpoint", "bytearray",
    "bytes", "callable", "chr", "classmethod", "compile", "complex", "copyright", "credits",
    "delattr", "dict", "dir", "divmod", "enumerate", "eval", "exec", "exit", "filter", "float",
    "format", "frozenset", "getattr", "globals", "hasattr", "hash", "help", "hex", "id", "input",
    "int", "isinstance", "issubclass", "iter", "len", "license", "list", "locals", "map", "max",
    "memoryview", "min", "next", "object", "oct", "open", "ord", "pow", "print", "property",
    "quit", "range", "repr", "reversed", "round", "set", "setattr", "slice", "sorted",
    "staticmethod", "str", "sum", "super", "tuple", "type", "vars", "zip", "__import__",
    "__name__", "__file__", "__doc__", "__builtins__", "__spec__", "__loader__", "__package__",
    "__debug__", "NotImplemented", "Ellipsis",
    "BaseException", "BaseExceptionGroup", "Exception", "ExceptionGroup", "ArithmeticError",
    "AssertionError", "AttributeError", "BlockingIOError", "BrokenPipeError", "BufferError",
    "ChildProcessError", "ConnectionError", "ConnectionAbortedError", "ConnectionRefusedError",
    "ConnectionResetError", "EOFError", "EnvironmentError", "FileExistsError",
    "FileNotFoundError", "FloatingPointError", "GeneratorExit", "IOError", "ImportError",
    "IndentationError", "IndexError", "InterruptedError", "IsADirectoryError", "KeyError",
    "KeyboardInterrupt", "LookupError", "MemoryError", "ModuleNotFoundError", "NameError",
    "NotADirectoryError", "NotImplementedError", "OSError", "OverflowError", "PermissionError",
    "ProcessLookupError", "RecursionError", "ReferenceError", "RuntimeError",
    "StopAsyncIteration", "StopIteration", "SyntaxError", "SystemError", "SystemExit",
    "TabError", "TimeoutError", "TypeError", "UnboundLocalError", "UnicodeDecodeError",
    "UnicodeEncodeError", "UnicodeError", "UnicodeTranslateError", "ValueError",
    "ZeroDivisionError", "Warning", "UserWarning", "DeprecationWarning",
    "PendingDeprecationWarning", "SyntaxWarning", "RuntimeWarning", "FutureWarning",
    "ImportWarning", "UnicodeWarning", "BytesWarning", "ResourceWarning", "EncodingWarning",
];

/// A name introduced by an import statement
#[derive(Debug, Clone, PartialEq, Eq)]
struct ImportBinding<'s> {
    /// What the user wrote (`os.path`, `np`)
    shown: &'s str,
    /// What the statement binds in the namespace (`os`, `np`)
    bound: &'s str,
    line: usize,
}

/// Bindings of every `import` / `from ... import` in document order.
/// Wildcard and `__future__` imports bind nothing checkable.
fn import_bindings<'s>(module: &ParsedModule<'s>) -> Result<Vec<ImportBinding<'s>>> {
    let mut bindings = vec![];

    for statement in module.nodes() {
        if !matches!(
            statement.kind(),
            "import_statement" | "import_from_statement"
        ) {
            continue;
        }

        let mut cursor = statement.walk();
        for imported in statement.children_by_field_name("name", &mut cursor) {
            bindings.push(binding_for(module, imported, line_of(statement))?);
        }
    }

    Ok(bindings)
}

fn binding_for<'s>(
    module: &ParsedModule<'s>,
    imported: Node<'_>,
    line: usize,
) -> Result<ImportBinding<'s>> {
    match imported.kind() {
        "aliased_import" => {
            let alias = imported
                .child_by_field_name("alias")
                .ok_or_else(|| anyhow!("aliased import without alias at line {}", line))?;
            let alias = module.text(alias)?;
            Ok(ImportBinding {
                shown: alias,
                bound: alias,
                line,
            })
        }
        "dotted_name" => {
            let shown = module.text(imported)?;
            let bound = shown.split('.').next().unwrap_or(shown);
            Ok(ImportBinding { shown, bound, line })
        }
        other => Err(anyhow!("unexpected import target {} at line {}", other, line)),
    }
}

/// Loop targets of a comprehension's `for` clauses, bound before the
/// element expression that precedes them in the text is read
fn comprehension_targets<'s>(
    module: &ParsedModule<'s>,
    comprehension: Node<'_>,
) -> Result<Vec<&'s str>> {
    let mut targets = vec![];
    let mut cursor = comprehension.walk();
    for clause in comprehension.named_children(&mut cursor) {
        if clause.kind() != "for_in_clause" {
            continue;
        }
        let Some(left) = clause.child_by_field_name("left") else {
            continue;
        };
        for node in Preorder::new(left) {
            if node.kind() == "identifier" && name_context(node) == NameContext::Store {
                targets.push(module.text(node)?);
            }
        }
    }
    Ok(targets)
}

fn loaded_names<'s>(module: &ParsedModule<'s>) -> Result<HashSet<&'s str>> {
    module
        .nodes()
        .filter(|node| node.kind() == "identifier")
        .filter(|node| name_context(*node) == NameContext::Load)
        .map(|node| module.text(node))
        .collect()
}

/// Imported names with no read anywhere in the module
pub struct UnusedImports;

impl Rule for UnusedImports {
    fn name(&self) -> &'static str {
        "unused_import"
    }

    fn check(&self, module: &ParsedModule<'_>) -> Result<Vec<Issue>> {
        let loaded = loaded_names(module)?;

        let issues = import_bindings(module)?
            .into_iter()
            .filter(|binding| !loaded.contains(binding.bound))
            .map(|binding| {
                Issue::new(
                    IssueKind::UnusedImport,
                    format!("Unused import: '{}'", binding.shown),
                    Some(binding.line),
                )
            })
            .collect();

        Ok(issues)
    }
}

/// Heuristic: one flat set of bound names, filled in document order, no scopes.
/// Reads of names not yet in the set are reported. Forward references,
/// names bound only in another scope, and shadowing all fool it.
/// Comprehension targets are the one exception to document order.
pub struct UndefinedNames;

impl Rule for UndefinedNames {
    fn name(&self) -> &'static str {
        "undefined_var"
    }

    fn check(&self, module: &ParsedModule<'_>) -> Result<Vec<Issue>> {
        let mut bound: HashSet<&str> = BUILTINS.iter().copied().collect();
        let mut issues = vec![];

        for node in module.nodes() {
            match node.kind() {
                "import_statement" | "import_from_statement" => {
                    let mut cursor = node.walk();
                    for imported in node.children_by_field_name("name", &mut cursor) {
                        bound.insert(binding_for(module, imported, line_of(node))?.bound);
                    }
                }
                "list_comprehension"
                | "set_comprehension"
                | "dictionary_comprehension"
                | "generator_expression" => {
                    bound.extend(comprehension_targets(module, node)?);
                }
                "identifier" => {
                    let context = name_context(node);
                    let name = module.text(node)?;
                    if context.binds() {
                        bound.insert(name);
                    } else if context == NameContext::Load && !bound.contains(name) {
                        issues.push(Issue::new(
                            IssueKind::UndefinedVar,
                            format!("Possibly undefined variable: '{}'", name),
                            Some(line_of(node)),
                        ));
                    }
                }
                _ => {}
            }
        }

        Ok(issues)
    }
}
