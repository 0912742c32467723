use std::{
    path::{Path, PathBuf},
    time::SystemTime,
};

use crate::error::Result;

/// Directory basenames that are never descended into.
pub const SKIP_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "__pycache__",
    ".venv",
    "dist",
    "build",
    ".next",
    ".cache",
    "coverage",
];

/// File extensions considered for indexing.
pub const INDEXABLE_EXTENSIONS: &[&str] = &[
    "py", "ts", "tsx", "js", "jsx", "md", "txt", "json", "yaml", "yml", "toml",
];

/// A discovered indexable file.
#[derive(Debug, Clone)]
pub struct DiscoveredFile {
    /// Path relative to the project root, forward-slashed.
    pub rel_path: String,
    /// Fully resolved absolute path.
    pub abs_path: PathBuf,
    /// Modification time in nanoseconds since the Unix epoch.
    pub mtime_ns: u64,
}

/// Recursively walk the project root and collect indexable files.
///
/// Descends depth-first, skipping directories whose basename is in
/// [`SKIP_DIRS`] and anything under `exclude` (the index's own storage, so
/// it never indexes itself). Unreadable directory entries are skipped.
pub fn discover_files(
    root: &Path,
    exclude: Option<&Path>,
) -> Result<Vec<DiscoveredFile>> {
    // Canonical paths keep the exclusion comparison and relative paths
    // stable regardless of how the roots were spelled.
    let root = root.canonicalize()?;
    let exclude = exclude.and_then(|p| p.canonicalize().ok());
    let mut results = Vec::new();
    walk_dir(&root, &root, exclude.as_deref(), &mut results)?;
    results.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    Ok(results)
}

fn walk_dir(
    root: &Path,
    current: &Path,
    exclude: Option<&Path>,
    results: &mut Vec<DiscoveredFile>,
) -> Result<()> {
    let entries = std::fs::read_dir(current)?;

    for entry in entries {
        let Ok(entry) = entry else { continue };
        let path = entry.path();

        if exclude.is_some_and(|ex| path == ex) {
            continue;
        }

        let Ok(file_type) = entry.file_type() else {
            continue;
        };

        if file_type.is_dir() {
            let name = entry.file_name();
            if SKIP_DIRS.contains(&name.to_string_lossy().as_ref()) {
                continue;
            }
            // A failing subdirectory is skipped, not fatal.
            let _ = walk_dir(root, &path, exclude, results);
        } else if file_type.is_file() && is_indexable(&path) {
            let Ok(meta) = entry.metadata() else { continue };
            results.push(DiscoveredFile {
                rel_path: relative_path(root, &path),
                abs_path: path,
                mtime_ns: mtime_ns(&meta),
            });
        }
    }

    Ok(())
}

pub fn is_indexable(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            let ext = ext.to_ascii_lowercase();
            INDEXABLE_EXTENSIONS.contains(&ext.as_str())
        })
}

/// Relative, forward-slashed path from `root` to `path`.
pub fn relative_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

pub fn mtime_ns(meta: &std::fs::Metadata) -> u64 {
    meta.modified()
        .unwrap_or(SystemTime::UNIX_EPOCH)
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rel_paths(files: &[DiscoveredFile]) -> Vec<&str> {
        files.iter().map(|f| f.rel_path.as_str()).collect()
    }

    #[test]
    fn discovers_indexable_extensions_only() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("main.py"), "x = 1\n").unwrap();
        std::fs::write(tmp.path().join("notes.md"), "# Hi\n").unwrap();
        std::fs::write(tmp.path().join("image.png"), "binary").unwrap();
        std::fs::write(tmp.path().join("app.rs"), "fn main() {}\n").unwrap();

        let files = discover_files(tmp.path(), None).unwrap();
        assert_eq!(rel_paths(&files), vec!["main.py", "notes.md"]);
    }

    #[test]
    fn skips_configured_directories() {
        let tmp = tempfile::tempdir().unwrap();
        for dir in ["node_modules", ".git", "__pycache__"] {
            let d = tmp.path().join(dir);
            std::fs::create_dir(&d).unwrap();
            std::fs::write(d.join("inner.py"), "pass\n").unwrap();
        }
        std::fs::write(tmp.path().join("kept.py"), "pass\n").unwrap();

        let files = discover_files(tmp.path(), None).unwrap();
        assert_eq!(rel_paths(&files), vec!["kept.py"]);
    }

    #[test]
    fn recurses_and_uses_forward_slashes() {
        let tmp = tempfile::tempdir().unwrap();
        let sub = tmp.path().join("src").join("deep");
        std::fs::create_dir_all(&sub).unwrap();
        std::fs::write(sub.join("mod.ts"), "export const x = 1;\n").unwrap();

        let files = discover_files(tmp.path(), None).unwrap();
        assert_eq!(rel_paths(&files), vec!["src/deep/mod.ts"]);
    }

    #[test]
    fn excluded_path_is_not_traversed() {
        let tmp = tempfile::tempdir().unwrap();
        let db_dir = tmp.path().join(".code_search.db");
        std::fs::create_dir(&db_dir).unwrap();
        std::fs::write(db_dir.join("meta.json"), "{}").unwrap();
        std::fs::write(tmp.path().join("kept.json"), "{}").unwrap();

        let files = discover_files(tmp.path(), Some(&db_dir)).unwrap();
        assert_eq!(rel_paths(&files), vec!["kept.json"]);
    }

    #[test]
    fn mtime_is_nonzero() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("f.md"), "hi").unwrap();

        let files = discover_files(tmp.path(), None).unwrap();
        assert!(files[0].mtime_ns > 0);
    }

    #[test]
    fn results_are_sorted() {
        let tmp = tempfile::tempdir().unwrap();
        for name in ["z.md", "a.md", "m.md"] {
            std::fs::write(tmp.path().join(name), "x").unwrap();
        }

        let files = discover_files(tmp.path(), None).unwrap();
        assert_eq!(rel_paths(&files), vec!["a.md", "m.md", "z.md"]);
    }
}
