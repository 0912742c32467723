//! Python symbol backend.
//!
//! Parses every `.py` file under the project root with tree-sitter.
//! Definitions are `def`/`class` nodes and bare-name assignments;
//! references are identifier occurrences, which structurally excludes
//! comments, string bodies, and the attribute position of `x.symbol`
//! member accesses.

use std::path::Path;

use tree_sitter::{Node, Parser};

use super::{Budget, Location, SymbolKind, collect_sources, line_context};
use crate::error::{Error, Result};

pub(super) fn scan(
    project_root: &Path,
    symbol: &str,
    budget: Budget,
    references: bool,
) -> Result<Vec<Location>> {
    let language: tree_sitter::Language = tree_sitter_python::LANGUAGE.into();

    // Fail up front if the grammar cannot be loaded at all.
    Parser::new().set_language(&language).map_err(|e| {
        Error::BackendUnavailable {
            language: "python",
            reason: e.to_string(),
        }
    })?;

    let files = collect_sources(project_root, project_root, &["py"])?;
    super::scan_files(&files, budget, |rel_path, abs_path| {
        scan_file(rel_path, abs_path, &language, symbol, references)
    })
}

fn scan_file(
    rel_path: &str,
    abs_path: &Path,
    language: &tree_sitter::Language,
    symbol: &str,
    references: bool,
) -> Option<Vec<Location>> {
    let source = std::fs::read_to_string(abs_path).ok()?;
    let mut parser = Parser::new();
    parser.set_language(language).ok()?;
    let tree = parser.parse(&source, None)?;

    let mut locations = Vec::new();
    walk(
        &tree.root_node(),
        &source,
        rel_path,
        symbol,
        references,
        &mut locations,
    );
    Some(locations)
}

fn walk(
    node: &Node,
    source: &str,
    rel_path: &str,
    symbol: &str,
    references: bool,
    out: &mut Vec<Location>,
) {
    if references {
        if node.kind() == "identifier"
            && node_text(node, source) == symbol
            && !is_attribute_position(node)
        {
            out.push(location_at(node, source, rel_path, classify(node)));
        }
    } else if let Some((name, kind)) = definition_name(node) {
        if node_text(&name, source) == symbol {
            out.push(location_at(&name, source, rel_path, kind));
        }
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        walk(&child, source, rel_path, symbol, references, out);
    }
}

/// The name node and kind when `node` defines a symbol.
fn definition_name<'a>(node: &Node<'a>) -> Option<(Node<'a>, SymbolKind)> {
    match node.kind() {
        "function_definition" => node
            .child_by_field_name("name")
            .map(|n| (n, SymbolKind::FunctionDefinition)),
        "class_definition" => node
            .child_by_field_name("name")
            .map(|n| (n, SymbolKind::ClassDefinition)),
        "assignment" => {
            let left = node.child_by_field_name("left")?;
            (left.kind() == "identifier")
                .then_some((left, SymbolKind::VariableDefinition))
        }
        _ => None,
    }
}

/// True when the identifier is the attribute of `x.attr` (an attribute
/// access rather than a free name).
fn is_attribute_position(node: &Node) -> bool {
    node.parent().is_some_and(|parent| {
        parent.kind() == "attribute"
            && parent
                .child_by_field_name("attribute")
                .is_some_and(|attr| attr.id() == node.id())
    })
}

fn classify(node: &Node) -> SymbolKind {
    let Some(parent) = node.parent() else {
        return SymbolKind::Unknown;
    };

    let is_field = |field: &str| {
        parent
            .child_by_field_name(field)
            .is_some_and(|n| n.id() == node.id())
    };

    match parent.kind() {
        "call" if is_field("function") => SymbolKind::FunctionCall,
        "function_definition" if is_field("name") => {
            SymbolKind::FunctionDefinition
        }
        "class_definition" if is_field("name") => SymbolKind::ClassDefinition,
        "assignment" if is_field("left") => SymbolKind::VariableDefinition,
        _ => SymbolKind::Reference,
    }
}

fn node_text<'a>(node: &Node, source: &'a str) -> &'a str {
    node.utf8_text(source.as_bytes()).unwrap_or("")
}

fn location_at(
    node: &Node,
    source: &str,
    rel_path: &str,
    kind: SymbolKind,
) -> Location {
    let pos = node.start_position();
    Location {
        file_path: rel_path.to_string(),
        line: pos.row + 1,
        column: pos.column,
        context: line_context(source, pos.row),
        kind,
    }
}
