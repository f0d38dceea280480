//! Tree-sitter plumbing for the Python analyzer: parsing, syntax error lookup,
//! pre-order traversal and name-context classification

use crate::static_analyzer::syntax::first_structural_error;
use anyhow::{anyhow, Result};
use tree_sitter::{Node, Parser, Tree, TreeCursor};

/// Location and wording of the first syntax error in a parse tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxFailure {
    pub message: String,
    pub line: Option<usize>,
}

/// A successfully parsed module together with the text it came from
pub struct ParsedModule<'s> {
    source: &'s str,
    tree: Tree,
}

impl<'s> ParsedModule<'s> {
    pub fn parse(source: &'s str) -> Result<Self, SyntaxFailure> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_python::LANGUAGE.into())
            .map_err(|e| SyntaxFailure {
                message: format!("python grammar unavailable: {}", e),
                line: None,
            })?;

        let tree = parser.parse(source, None).ok_or_else(|| SyntaxFailure {
            message: "parser produced no syntax tree".to_string(),
            line: None,
        })?;

        let root = tree.root_node();
        if let Some(failure) = first_syntax_error(root).or_else(|| first_structural_error(root)) {
            return Err(failure);
        }

        Ok(Self { source, tree })
    }

    pub fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }

    pub fn text(&self, node: Node<'_>) -> Result<&'s str> {
        self.source
            .get(node.byte_range())
            .ok_or_else(|| anyhow!("node {} spans outside the source", node.kind()))
    }

    /// Every node of the module in document order
    pub fn nodes(&self) -> Preorder<'_> {
        Preorder::new(self.root())
    }

    /// Every `def` (sync or async, any depth) in document order
    pub fn functions(&self) -> impl Iterator<Item = Node<'_>> {
        self.nodes()
            .filter(|node| node.kind() == "function_definition")
    }

    /// Name of a function or class definition
    pub fn definition_name(&self, node: Node<'_>) -> Result<&'s str> {
        let name = node
            .child_by_field_name("name")
            .ok_or_else(|| anyhow!("{} without a name at line {}", node.kind(), line_of(node)))?;
        self.text(name)
    }
}

/// 1-based line where a node starts
pub fn line_of(node: Node<'_>) -> usize {
    node.start_position().row + 1
}

fn first_syntax_error(root: Node<'_>) -> Option<SyntaxFailure> {
    if !root.has_error() {
        return None;
    }

    let broken = Preorder::new(root).find(|node| node.is_error() || node.is_missing());
    Some(match broken {
        Some(node) if node.is_missing() => SyntaxFailure {
            message: format!("expected '{}'", node.kind()),
            line: Some(line_of(node)),
        },
        Some(node) => SyntaxFailure {
            message: "invalid syntax".to_string(),
            line: Some(line_of(node)),
        },
        None => SyntaxFailure {
            message: "invalid syntax".to_string(),
            line: None,
        },
    })
}

/// Depth-first, document-order walk over a subtree.
/// Iterative so deeply nested input cannot exhaust the stack.
pub struct Preorder<'t> {
    cursor: TreeCursor<'t>,
    done: bool,
}

impl<'t> Preorder<'t> {
    pub fn new(root: Node<'t>) -> Self {
        Self {
            cursor: root.walk(),
            done: false,
        }
    }
}

impl<'t> Iterator for Preorder<'t> {
    type Item = Node<'t>;

    fn next(&mut self) -> Option<Node<'t>> {
        if self.done {
            return None;
        }

        let node = self.cursor.node();
        if self.cursor.goto_first_child() || self.cursor.goto_next_sibling() {
            return Some(node);
        }

        loop {
            if !self.cursor.goto_parent() {
                self.done = true;
                return Some(node);
            }
            if self.cursor.goto_next_sibling() {
                return Some(node);
            }
        }
    }
}

/// Whether `child` is the node stored under `field` on `parent`
pub fn is_field(parent: Node<'_>, field: &str, child: Node<'_>) -> bool {
    parent
        .child_by_field_name(field)
        .map_or(false, |candidate| candidate.id() == child.id())
}

/// How an identifier occurrence relates to the name it spells
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameContext {
    /// The value is read
    Load,
    /// Assignment-like target
    Store,
    /// Function or lambda parameter
    Param,
    /// Name of a `def` or `class`
    Definition,
    /// Target of `del`
    Delete,
    /// Identifier that is not a variable: attribute names, keyword argument
    /// names, `global` declarations, import paths
    Other,
}

impl NameContext {
    pub fn binds(&self) -> bool {
        matches!(
            self,
            NameContext::Store | NameContext::Param | NameContext::Definition
        )
    }
}

const PATTERN_CONTAINERS: &[&str] = &[
    "pattern_list",
    "tuple_pattern",
    "list_pattern",
    "list_splat_pattern",
    "parenthesized_expression",
];

const PARAMETER_LISTS: &[&str] = &["parameters", "lambda_parameters", "typed_parameter"];

const IMPORT_PATHS: &[&str] = &["dotted_name", "aliased_import", "relative_import", "import_prefix"];

const IMPORT_STATEMENTS: &[&str] = &[
    "import_statement",
    "import_from_statement",
    "future_import_statement",
];

/// Classify an `identifier` node by looking at its ancestors
pub fn name_context(ident: Node<'_>) -> NameContext {
    let Some(parent) = ident.parent() else {
        return NameContext::Load;
    };

    if in_case_pattern(ident) {
        return pattern_context(ident, parent);
    }

    match parent.kind() {
        "attribute" => {
            if is_field(parent, "attribute", ident) {
                NameContext::Other
            } else {
                NameContext::Load
            }
        }
        "keyword_argument" => {
            if is_field(parent, "name", ident) {
                NameContext::Other
            } else {
                NameContext::Load
            }
        }
        "function_definition" | "class_definition" => {
            if is_field(parent, "name", ident) {
                NameContext::Definition
            } else {
                NameContext::Load
            }
        }
        "parameters" | "lambda_parameters" | "typed_parameter" => NameContext::Param,
        "default_parameter" | "typed_default_parameter" => {
            if is_field(parent, "name", ident) {
                NameContext::Param
            } else {
                NameContext::Load
            }
        }
        "global_statement" | "nonlocal_statement" => NameContext::Other,
        "as_pattern_target" => NameContext::Store,
        "named_expression" => {
            if is_field(parent, "name", ident) {
                NameContext::Store
            } else {
                NameContext::Load
            }
        }
        "except_clause" => {
            let after_as = ident
                .prev_sibling()
                .map_or(false, |prev| prev.kind() == "as" || prev.kind() == ",");
            if after_as || is_field(parent, "alias", ident) {
                NameContext::Store
            } else {
                NameContext::Load
            }
        }
        "delete_statement" => NameContext::Delete,
        "expression_list"
            if parent
                .parent()
                .map_or(false, |grand| grand.kind() == "delete_statement") =>
        {
            NameContext::Delete
        }
        kind if IMPORT_PATHS.contains(&kind) => import_or_load(parent),
        _ => target_context(ident),
    }
}

fn in_case_pattern(ident: Node<'_>) -> bool {
    let mut node = ident;
    while let Some(parent) = node.parent() {
        match parent.kind() {
            "case_pattern" => return true,
            "case_clause" | "block" | "module" => return false,
            _ => node = parent,
        }
    }
    false
}

/// Bare names in a `case` pattern capture; dotted names and class names are
/// looked up, keyword pattern names are attributes
fn pattern_context(ident: Node<'_>, parent: Node<'_>) -> NameContext {
    match parent.kind() {
        "dotted_name" if parent.named_child_count() > 1 => {
            let first = parent.named_child(0).map_or(false, |head| head.id() == ident.id());
            if first {
                NameContext::Load
            } else {
                NameContext::Other
            }
        }
        "dotted_name"
            if parent
                .parent()
                .map_or(false, |grand| grand.kind() == "class_pattern") =>
        {
            NameContext::Load
        }
        "keyword_pattern"
            if parent
                .named_child(0)
                .map_or(false, |name| name.id() == ident.id()) =>
        {
            NameContext::Other
        }
        _ => NameContext::Store,
    }
}

fn import_or_load(mut node: Node<'_>) -> NameContext {
    while IMPORT_PATHS.contains(&node.kind()) {
        match node.parent() {
            Some(parent) => node = parent,
            None => break,
        }
    }
    if IMPORT_STATEMENTS.contains(&node.kind()) {
        NameContext::Other
    } else {
        NameContext::Load
    }
}

/// Climb through destructuring patterns to find whether the identifier is
/// the target of an assignment-like construct
fn target_context(ident: Node<'_>) -> NameContext {
    let mut child = ident;
    while let Some(parent) = child.parent() {
        let kind = parent.kind();
        if PATTERN_CONTAINERS.contains(&kind) {
            if kind == "list_splat_pattern"
                && parent
                    .parent()
                    .map_or(false, |grand| PARAMETER_LISTS.contains(&grand.kind()))
            {
                return NameContext::Param;
            }
            child = parent;
            continue;
        }
        if kind == "dictionary_splat_pattern" {
            return NameContext::Param;
        }

        let is_target = match kind {
            "assignment" | "augmented_assignment" | "for_statement" | "for_in_clause" => {
                is_field(parent, "left", child)
            }
            _ => false,
        };
        return if is_target {
            NameContext::Store
        } else {
            NameContext::Load
        };
    }
    NameContext::Load
}
