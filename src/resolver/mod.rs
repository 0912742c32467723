//! Language-dispatched symbol resolution.
//!
//! Definitions and references are resolved against the live filesystem
//! (not the search index) by parsing source files with tree-sitter. Each
//! call carries a wall-clock budget; on expiry the caller gets a timeout
//! error rather than a partial answer presented as complete.

mod python;
mod typescript;

use std::{
    path::{Path, PathBuf},
    sync::atomic::{AtomicBool, Ordering},
    time::{Duration, Instant},
};

use rayon::prelude::*;

use crate::{
    error::{Error, Result},
    walker,
};

/// Default wall-clock budget per backend call.
pub const BACKEND_BUDGET: Duration = Duration::from_secs(30);

/// The languages a backend exists for.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    serde::Serialize,
    serde::Deserialize,
    schemars::JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    Typescript,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::Typescript => "typescript",
        }
    }
}

impl std::str::FromStr for Language {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "python" => Ok(Language::Python),
            "typescript" => Ok(Language::Typescript),
            other => Err(Error::UnsupportedLanguage(other.to_string())),
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The syntactic role of a resolved occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    FunctionDefinition,
    ClassDefinition,
    InterfaceDefinition,
    TypeDefinition,
    VariableDefinition,
    FunctionCall,
    Reference,
    Unknown,
}

/// One resolved occurrence of a symbol.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Location {
    /// Path relative to the project root, forward-slashed.
    pub file_path: String,
    /// 1-based line number.
    pub line: usize,
    /// 0-based column.
    pub column: usize,
    /// Trimmed text of the occurrence's line.
    pub context: String,
    pub kind: SymbolKind,
}

pub struct SymbolResolver {
    project_root: PathBuf,
    budget: Duration,
}

impl SymbolResolver {
    pub fn new(project_root: PathBuf) -> Self {
        Self {
            project_root,
            budget: BACKEND_BUDGET,
        }
    }

    /// Override the wall-clock budget (used by tests).
    pub fn with_budget(project_root: PathBuf, budget: Duration) -> Self {
        Self {
            project_root,
            budget,
        }
    }

    /// Every definition site of `symbol` in the given language.
    pub fn get_definition(
        &self,
        symbol: &str,
        language: Language,
    ) -> Result<Vec<Location>> {
        self.scan(symbol, language, false)
    }

    /// Every reference site of `symbol` (definitions included).
    pub fn get_references(
        &self,
        symbol: &str,
        language: Language,
    ) -> Result<Vec<Location>> {
        self.scan(symbol, language, true)
    }

    fn scan(
        &self,
        symbol: &str,
        language: Language,
        references: bool,
    ) -> Result<Vec<Location>> {
        let symbol = validate_symbol(symbol)?;
        let budget = Budget {
            deadline: Instant::now() + self.budget,
            secs: self.budget.as_secs(),
        };
        match language {
            Language::Python => {
                python::scan(&self.project_root, symbol, budget, references)
            }
            Language::Typescript => typescript::scan(
                &self.project_root,
                symbol,
                budget,
                references,
            ),
        }
    }
}

impl std::fmt::Debug for SymbolResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymbolResolver")
            .field("project_root", &self.project_root)
            .field("budget", &self.budget)
            .finish()
    }
}

/// Per-call wall-clock budget handed to the backends.
#[derive(Debug, Clone, Copy)]
struct Budget {
    deadline: Instant,
    secs: u64,
}

/// Scan files in parallel under a deadline. Files visited after the
/// deadline are abandoned and the whole call fails with a timeout, so a
/// truncated scan is never mistaken for a complete one.
fn scan_files<F>(
    files: &[(String, PathBuf)],
    budget: Budget,
    scan_file: F,
) -> Result<Vec<Location>>
where
    F: Fn(&str, &Path) -> Option<Vec<Location>> + Sync,
{
    let timed_out = AtomicBool::new(false);

    let per_file: Vec<Vec<Location>> = files
        .par_iter()
        .map(|(rel_path, abs_path)| {
            if timed_out.load(Ordering::Relaxed)
                || Instant::now() >= budget.deadline
            {
                timed_out.store(true, Ordering::Relaxed);
                return Vec::new();
            }
            scan_file(rel_path, abs_path).unwrap_or_default()
        })
        .collect();

    if timed_out.load(Ordering::Relaxed) {
        return Err(Error::BackendTimeout(budget.secs));
    }

    Ok(per_file.into_iter().flatten().collect())
}

fn validate_symbol(symbol: &str) -> Result<&str> {
    let symbol = symbol.trim();
    if symbol.is_empty() {
        return Err(Error::InvalidArgument(
            "symbol name cannot be empty".to_string(),
        ));
    }
    Ok(symbol)
}

/// Collect files under `scan_root` with one of the given extensions,
/// honoring the skip-dir set. Paths are reported relative to
/// `project_root`.
fn collect_sources(
    project_root: &Path,
    scan_root: &Path,
    extensions: &[&str],
) -> Result<Vec<(String, PathBuf)>> {
    let project_root = project_root
        .canonicalize()
        .unwrap_or_else(|_| project_root.to_path_buf());
    let files = walker::discover_files(scan_root, None)?;
    Ok(files
        .into_iter()
        .filter(|f| {
            f.abs_path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| extensions.contains(&e))
        })
        .map(|f| {
            (walker::relative_path(&project_root, &f.abs_path), f.abs_path)
        })
        .collect())
}

/// Trimmed text of a 0-based source row.
fn line_context(source: &str, row: usize) -> String {
    source.lines().nth(row).unwrap_or("").trim().to_string()
}
