//! TypeScript/JavaScript symbol backend.
//!
//! Source files are discovered from the directory of the nearest
//! `tsconfig.json` at or above the project root, falling back to the
//! project tree itself. Each file is parsed with the grammar matching its
//! extension; member-access property positions are `property_identifier`
//! nodes and therefore never reported as references to a free name.

use std::path::{Path, PathBuf};

use tree_sitter::{Node, Parser};

use super::{Budget, Location, SymbolKind, collect_sources, line_context};
use crate::error::{Error, Result};

const EXTENSIONS: &[&str] = &["ts", "tsx", "js", "jsx"];

pub(super) fn scan(
    project_root: &Path,
    symbol: &str,
    budget: Budget,
    references: bool,
) -> Result<Vec<Location>> {
    // Fail up front if the grammars cannot be loaded at all.
    let probe: tree_sitter::Language =
        tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into();
    Parser::new().set_language(&probe).map_err(|e| {
        Error::BackendUnavailable {
            language: "typescript",
            reason: e.to_string(),
        }
    })?;

    let scan_root = find_tsconfig_root(project_root)
        .unwrap_or_else(|| project_root.to_path_buf());
    let files = collect_sources(project_root, &scan_root, EXTENSIONS)?;

    super::scan_files(&files, budget, |rel_path, abs_path| {
        scan_file(rel_path, abs_path, symbol, references)
    })
}

/// Walk upward from the project root looking for a `tsconfig.json`; the
/// containing directory becomes the scan root.
fn find_tsconfig_root(project_root: &Path) -> Option<PathBuf> {
    let mut dir = Some(project_root);
    while let Some(current) = dir {
        if current.join("tsconfig.json").is_file() {
            return Some(current.to_path_buf());
        }
        dir = current.parent();
    }
    None
}

fn language_for(abs_path: &Path) -> Option<tree_sitter::Language> {
    match abs_path.extension().and_then(|e| e.to_str()) {
        Some("ts") => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
        Some("tsx") => Some(tree_sitter_typescript::LANGUAGE_TSX.into()),
        Some("js") | Some("jsx") => {
            Some(tree_sitter_javascript::LANGUAGE.into())
        }
        _ => None,
    }
}

fn scan_file(
    rel_path: &str,
    abs_path: &Path,
    symbol: &str,
    references: bool,
) -> Option<Vec<Location>> {
    let source = std::fs::read_to_string(abs_path).ok()?;
    let mut parser = Parser::new();
    parser.set_language(&language_for(abs_path)?).ok()?;
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
        if matches!(node.kind(), "identifier" | "type_identifier")
            && node_text(node, source) == symbol
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

fn definition_name<'a>(node: &Node<'a>) -> Option<(Node<'a>, SymbolKind)> {
    let kind = match node.kind() {
        "function_declaration" | "generator_function_declaration" => {
            SymbolKind::FunctionDefinition
        }
        "class_declaration" => SymbolKind::ClassDefinition,
        "interface_declaration" => SymbolKind::InterfaceDefinition,
        "type_alias_declaration" => SymbolKind::TypeDefinition,
        "variable_declarator" => SymbolKind::VariableDefinition,
        _ => return None,
    };
    node.child_by_field_name("name").map(|name| (name, kind))
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
        "call_expression" if is_field("function") => SymbolKind::FunctionCall,
        "variable_declarator" if is_field("name") => {
            SymbolKind::VariableDefinition
        }
        "function_declaration" | "generator_function_declaration"
            if is_field("name") =>
        {
            SymbolKind::FunctionDefinition
        }
        "class_declaration" if is_field("name") => SymbolKind::ClassDefinition,
        "interface_declaration" if is_field("name") => {
            SymbolKind::InterfaceDefinition
        }
        "type_alias_declaration" if is_field("name") => {
            SymbolKind::TypeDefinition
        }
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
