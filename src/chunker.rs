//! Semantic file chunking.
//!
//! Splits a file's text into typed fragments that become the unit of
//! indexing and retrieval: Markdown by headings, Python by top-level
//! declarations, TypeScript/JavaScript by export declarations, and a single
//! whole-file chunk for plain text and config formats. Chunking is a pure
//! function of the path and bytes: no I/O, deterministic, and it never
//! fails on malformed input -- files that fit no structure fall back to one
//! whole-file chunk.

use crate::search::DOC_BASENAMES;

/// How many leading bytes are inspected for the binary-file check.
const BINARY_SNIFF_LEN: usize = 8192;

/// The semantic type of a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    MarkdownSection,
    PythonFunction,
    PythonClass,
    PythonModule,
    TypescriptFunction,
    TypescriptClass,
    TypescriptInterface,
    TypescriptType,
    TypescriptVariable,
    TypescriptModule,
    TextFile,
    ConfigFile,
}

impl ChunkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkType::MarkdownSection => "markdown_section",
            ChunkType::PythonFunction => "python_function",
            ChunkType::PythonClass => "python_class",
            ChunkType::PythonModule => "python_module",
            ChunkType::TypescriptFunction => "typescript_function",
            ChunkType::TypescriptClass => "typescript_class",
            ChunkType::TypescriptInterface => "typescript_interface",
            ChunkType::TypescriptType => "typescript_type",
            ChunkType::TypescriptVariable => "typescript_variable",
            ChunkType::TypescriptModule => "typescript_module",
            ChunkType::TextFile => "text_file",
            ChunkType::ConfigFile => "config_file",
        }
    }
}

impl std::fmt::Display for ChunkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A semantic fragment of a file. Line numbers are 1-based inclusive and
/// `content` equals the file's lines `[line_start, line_end]` at chunking
/// time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub chunk_type: ChunkType,
    /// Heading text or declaration name; empty for whole-file and module
    /// chunks without a symbol.
    pub symbol_name: String,
    pub content: String,
    pub line_start: usize,
    pub line_end: usize,
    pub is_doc_file: bool,
}

/// Chunk a file's bytes according to its extension.
///
/// Binary files (a NUL byte within the first 8 KiB) produce no chunks.
/// Non-UTF-8 text is decoded lossily rather than rejected.
pub fn chunk(path: &str, bytes: &[u8]) -> Vec<Chunk> {
    if is_binary(bytes) {
        return Vec::new();
    }

    let text = String::from_utf8_lossy(bytes);
    let is_doc = is_doc_file(path);

    match extension_of(path).as_deref() {
        Some("md") => chunk_markdown(&text, is_doc),
        Some("py") => chunk_python(&text, is_doc),
        Some("ts") | Some("tsx") | Some("js") | Some("jsx") => {
            chunk_typescript(&text, is_doc)
        }
        Some("json") | Some("yaml") | Some("yml") | Some("toml") => {
            vec![whole_file(ChunkType::ConfigFile, &text, is_doc)]
        }
        _ => vec![whole_file(ChunkType::TextFile, &text, is_doc)],
    }
}

/// True when the file's basename is in the doc-boost set.
pub fn is_doc_file(path: &str) -> bool {
    let basename = path.rsplit('/').next().unwrap_or(path);
    DOC_BASENAMES.contains(&basename)
}

fn is_binary(bytes: &[u8]) -> bool {
    let sniff = &bytes[..bytes.len().min(BINARY_SNIFF_LEN)];
    sniff.contains(&0)
}

fn extension_of(path: &str) -> Option<String> {
    let basename = path.rsplit('/').next()?;
    let (stem, ext) = basename.rsplit_once('.')?;
    if stem.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

fn whole_file(chunk_type: ChunkType, text: &str, is_doc: bool) -> Chunk {
    let lines: Vec<&str> = text.lines().collect();
    Chunk {
        chunk_type,
        symbol_name: String::new(),
        content: lines.join("\n"),
        line_start: 1,
        line_end: lines.len().max(1),
        is_doc_file: is_doc,
    }
}

fn slice_chunk(
    chunk_type: ChunkType,
    symbol_name: String,
    lines: &[&str],
    start: usize,
    end: usize,
    is_doc: bool,
) -> Chunk {
    Chunk {
        chunk_type,
        symbol_name,
        content: lines[start..end].join("\n"),
        line_start: start + 1,
        line_end: end.max(start + 1),
        is_doc_file: is_doc,
    }
}

// -- Markdown --

/// Parse a heading line (`#{1,6}` followed by whitespace and text),
/// returning the trimmed heading text.
fn markdown_heading(line: &str) -> Option<String> {
    let hashes = line.bytes().take_while(|&b| b == b'#').count();
    if !(1..=6).contains(&hashes) {
        return None;
    }
    let rest = &line[hashes..];
    let mut chars = rest.chars();
    if !chars.next().is_some_and(char::is_whitespace) {
        return None;
    }
    if chars.next().is_none() {
        return None;
    }
    Some(rest.trim().to_string())
}

fn chunk_markdown(text: &str, is_doc: bool) -> Vec<Chunk> {
    let lines: Vec<&str> = text.lines().collect();

    let headings: Vec<(usize, String)> = lines
        .iter()
        .enumerate()
        .filter_map(|(i, line)| markdown_heading(line).map(|h| (i, h)))
        .collect();

    if headings.is_empty() {
        return vec![whole_file(ChunkType::MarkdownSection, text, is_doc)];
    }

    let mut chunks = Vec::with_capacity(headings.len() + 1);

    // Preamble before the first heading, only if it has visible content.
    let first = headings[0].0;
    if lines[..first].iter().any(|l| !l.trim().is_empty()) {
        chunks.push(slice_chunk(
            ChunkType::MarkdownSection,
            String::new(),
            &lines,
            0,
            first,
            is_doc,
        ));
    }

    for (k, (start, name)) in headings.iter().enumerate() {
        let end = headings
            .get(k + 1)
            .map(|(next, _)| *next)
            .unwrap_or(lines.len());
        chunks.push(slice_chunk(
            ChunkType::MarkdownSection,
            name.clone(),
            &lines,
            *start,
            end,
            is_doc,
        ));
    }

    chunks
}

// -- Python --

fn python_decl(line: &str) -> Option<(ChunkType, String)> {
    let (chunk_type, rest) = if let Some(rest) = line.strip_prefix("def ") {
        (ChunkType::PythonFunction, rest)
    } else if let Some(rest) = line.strip_prefix("class ") {
        (ChunkType::PythonClass, rest)
    } else {
        return None;
    };

    let name = leading_identifier(rest.trim_start());
    (!name.is_empty()).then_some((chunk_type, name))
}

fn leading_identifier(s: &str) -> String {
    s.chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect()
}

fn indentation(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

fn chunk_python(text: &str, is_doc: bool) -> Vec<Chunk> {
    let lines: Vec<&str> = text.lines().collect();
    let n = lines.len();
    let mut owned = vec![false; n];
    let mut chunks = Vec::new();

    let mut i = 0;
    while i < n {
        let Some((chunk_type, name)) = python_decl(lines[i]) else {
            i += 1;
            continue;
        };

        // Pull contiguous column-0 decorators into the declaration chunk.
        let mut start = i;
        while start > 0 && !owned[start - 1] && lines[start - 1].starts_with('@')
        {
            start -= 1;
        }

        // The body runs through indented and blank lines until the next
        // top-level non-blank line or EOF.
        let mut end = i + 1;
        while end < n {
            let line = lines[end];
            if line.trim().is_empty() || indentation(line) > 0 {
                end += 1;
            } else {
                break;
            }
        }

        for flag in owned.iter_mut().take(end).skip(start) {
            *flag = true;
        }
        chunks.push(slice_chunk(chunk_type, name, &lines, start, end, is_doc));
        i = end;
    }

    if chunks.is_empty() {
        return vec![whole_file(ChunkType::PythonModule, text, is_doc)];
    }

    // Everything outside the declaration chunks (imports, module-level
    // statements) forms the module chunk.
    let module_lines: Vec<usize> = (0..n).filter(|&i| !owned[i]).collect();
    let has_content = module_lines.iter().any(|&i| !lines[i].trim().is_empty());
    if has_content {
        let content: Vec<&str> =
            module_lines.iter().map(|&i| lines[i]).collect();
        chunks.push(Chunk {
            chunk_type: ChunkType::PythonModule,
            symbol_name: String::new(),
            content: content.join("\n"),
            line_start: module_lines[0] + 1,
            line_end: module_lines[module_lines.len() - 1] + 1,
            is_doc_file: is_doc,
        });
    }

    chunks
}

// -- TypeScript / JavaScript --

fn ts_decl(line: &str) -> Option<(ChunkType, String)> {
    let rest = line.strip_prefix("export ")?.trim_start();

    let (chunk_type, rest) = if let Some(rest) = rest
        .strip_prefix("async ")
        .map(str::trim_start)
        .and_then(|r| r.strip_prefix("function "))
        .or_else(|| rest.strip_prefix("function "))
    {
        (ChunkType::TypescriptFunction, rest)
    } else if let Some(rest) = rest
        .strip_prefix("default ")
        .map(str::trim_start)
        .and_then(|r| r.strip_prefix("class "))
        .or_else(|| rest.strip_prefix("class "))
    {
        (ChunkType::TypescriptClass, rest)
    } else if let Some(rest) = rest.strip_prefix("interface ") {
        (ChunkType::TypescriptInterface, rest)
    } else if let Some(rest) = rest.strip_prefix("type ") {
        (ChunkType::TypescriptType, rest)
    } else if let Some(rest) = rest
        .strip_prefix("const ")
        .or_else(|| rest.strip_prefix("let "))
        .or_else(|| rest.strip_prefix("var "))
    {
        (ChunkType::TypescriptVariable, rest)
    } else {
        return None;
    };

    let name = leading_identifier(rest.trim_start());
    (!name.is_empty()).then_some((chunk_type, name))
}

/// True for a line opening a top-level `export` statement.
fn is_export_line(line: &str) -> bool {
    line.strip_prefix("export")
        .is_some_and(|rest| rest.starts_with([' ', '\t', '{', '*']))
}

fn chunk_typescript(text: &str, is_doc: bool) -> Vec<Chunk> {
    let lines: Vec<&str> = text.lines().collect();
    let n = lines.len();
    let mut owned = vec![false; n];
    let mut chunks = Vec::new();

    let mut i = 0;
    while i < n {
        let Some((chunk_type, name)) = ts_decl(lines[i]) else {
            i += 1;
            continue;
        };

        // The chunk runs until the next top-level export, or through a
        // column-0 closing brace that is followed by a blank line or EOF.
        let mut end = i + 1;
        while end < n {
            let line = lines[end];
            if is_export_line(line) {
                break;
            }
            if line.starts_with('}') {
                let next_blank = end + 1 >= n
                    || lines[end + 1].trim().is_empty();
                if next_blank {
                    end += 1;
                    break;
                }
            }
            end += 1;
        }

        for flag in owned.iter_mut().take(end).skip(i) {
            *flag = true;
        }
        chunks.push(slice_chunk(chunk_type, name, &lines, i, end, is_doc));
        i = end;
    }

    if chunks.is_empty() {
        return vec![whole_file(ChunkType::TypescriptModule, text, is_doc)];
    }

    let module_lines: Vec<usize> = (0..n).filter(|&i| !owned[i]).collect();
    let has_content = module_lines.iter().any(|&i| !lines[i].trim().is_empty());
    if has_content {
        let content: Vec<&str> =
            module_lines.iter().map(|&i| lines[i]).collect();
        chunks.push(Chunk {
            chunk_type: ChunkType::TypescriptModule,
            symbol_name: String::new(),
            content: content.join("\n"),
            line_start: module_lines[0] + 1,
            line_end: module_lines[module_lines.len() - 1] + 1,
            is_doc_file: is_doc,
        });
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(chunks: &[Chunk]) -> Vec<&str> {
        chunks.iter().map(|c| c.symbol_name.as_str()).collect()
    }

    #[test]
    fn markdown_splits_at_headings() {
        let text = "# Intro\nwelcome\n\n## Usage\nrun it\n### Flags\n-v\n";
        let chunks = chunk("README.md", text.as_bytes());

        assert_eq!(chunks.len(), 3);
        assert_eq!(names(&chunks), vec!["Intro", "Usage", "Flags"]);
        assert!(
            chunks
                .iter()
                .all(|c| c.chunk_type == ChunkType::MarkdownSection)
        );

        assert_eq!(chunks[0].line_start, 1);
        assert_eq!(chunks[0].line_end, 3);
        assert_eq!(chunks[0].content, "# Intro\nwelcome\n");
        assert_eq!(chunks[1].line_start, 4);
        assert_eq!(chunks[1].line_end, 5);
        assert_eq!(chunks[2].line_start, 6);
        assert_eq!(chunks[2].line_end, 7);
    }

    #[test]
    fn markdown_preamble_becomes_first_chunk() {
        let text = "intro text before any heading\n\n# First\nbody\n";
        let chunks = chunk("doc.md", text.as_bytes());

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].symbol_name, "");
        assert_eq!(chunks[0].line_start, 1);
        assert_eq!(chunks[0].line_end, 2);
        assert_eq!(chunks[1].symbol_name, "First");
    }

    #[test]
    fn markdown_blank_preamble_is_dropped() {
        let text = "\n\n# Only\nbody\n";
        let chunks = chunk("doc.md", text.as_bytes());

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].symbol_name, "Only");
    }

    #[test]
    fn markdown_without_headings_is_one_chunk() {
        let text = "no headings here\njust prose\n";
        let chunks = chunk("notes.md", text.as_bytes());

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_type, ChunkType::MarkdownSection);
        assert_eq!(chunks[0].symbol_name, "");
        assert_eq!(chunks[0].line_start, 1);
        assert_eq!(chunks[0].line_end, 2);
    }

    #[test]
    fn markdown_heading_levels_one_through_six() {
        let text = "# a\n###### b\n####### not a heading\n#nospace\n";
        let chunks = chunk("doc.md", text.as_bytes());

        assert_eq!(names(&chunks), vec!["a", "b"]);
        // The invalid heading lines belong to the last real section.
        assert_eq!(chunks[1].line_end, 4);
    }

    #[test]
    fn doc_basename_sets_flag() {
        let chunks = chunk("docs/FileStructure.md", b"# Layout\nstuff\n");
        assert!(chunks[0].is_doc_file);

        let chunks = chunk("docs/README.md", b"# Layout\nstuff\n");
        assert!(!chunks[0].is_doc_file);

        // Basename equality is exact, not a suffix match.
        let chunks = chunk("docs/MyFileStructure.md", b"# Layout\n");
        assert!(!chunks[0].is_doc_file);
    }

    #[test]
    fn python_top_level_declarations() {
        let text = "import os\n\ndef login(email):\n    return email\n\n\
                    class Session:\n    def close(self):\n        pass\n";
        let chunks = chunk("auth.py", text.as_bytes());

        let login = chunks
            .iter()
            .find(|c| c.symbol_name == "login")
            .expect("login chunk");
        assert_eq!(login.chunk_type, ChunkType::PythonFunction);
        assert_eq!(login.line_start, 3);

        let session = chunks
            .iter()
            .find(|c| c.symbol_name == "Session")
            .expect("Session chunk");
        assert_eq!(session.chunk_type, ChunkType::PythonClass);
        // Nested def stays inside the class chunk.
        assert!(session.content.contains("def close"));

        let module = chunks
            .iter()
            .find(|c| c.chunk_type == ChunkType::PythonModule)
            .expect("module chunk");
        assert!(module.content.contains("import os"));
        assert_eq!(module.line_start, 1);
    }

    #[test]
    fn python_decorators_join_declaration() {
        let text = "@cached\n@retry\ndef fetch():\n    pass\n";
        let chunks = chunk("util.py", text.as_bytes());

        let fetch = chunks
            .iter()
            .find(|c| c.symbol_name == "fetch")
            .expect("fetch chunk");
        assert_eq!(fetch.line_start, 1);
        assert!(fetch.content.starts_with("@cached\n@retry\ndef fetch"));
    }

    #[test]
    fn python_without_declarations_is_one_module_chunk() {
        let text = "import sys\n\nprint(sys.argv)\n";
        let chunks = chunk("script.py", text.as_bytes());

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_type, ChunkType::PythonModule);
        assert_eq!(chunks[0].line_start, 1);
        assert_eq!(chunks[0].line_end, 3);
    }

    #[test]
    fn python_trailing_blanks_stay_with_declaration() {
        let text = "def a():\n    pass\n\n\ndef b():\n    pass\n";
        let chunks = chunk("two.py", text.as_bytes());

        assert_eq!(names(&chunks), vec!["a", "b"]);
        assert_eq!(chunks[0].line_end, 4);
        assert_eq!(chunks[1].line_start, 5);
    }

    #[test]
    fn typescript_export_declarations() {
        let text = "import React from 'react';\n\n\
                    export function ModelSelector(props: Props) {\n\
                    \x20\x20return null;\n}\n\n\
                    export interface Props {\n\x20\x20id: string;\n}\n\n\
                    export type Mode = 'a' | 'b';\n\
                    export const DEFAULT_MODE: Mode = 'a';\n";
        let chunks = chunk("selector.tsx", text.as_bytes());

        let selector = chunks
            .iter()
            .find(|c| c.symbol_name == "ModelSelector")
            .expect("ModelSelector chunk");
        assert_eq!(selector.chunk_type, ChunkType::TypescriptFunction);
        assert_eq!(selector.line_start, 3);
        // The closing brace followed by a blank line ends the chunk.
        assert_eq!(selector.line_end, 5);

        let props = chunks
            .iter()
            .find(|c| c.symbol_name == "Props")
            .expect("Props chunk");
        assert_eq!(props.chunk_type, ChunkType::TypescriptInterface);

        let mode = chunks.iter().find(|c| c.symbol_name == "Mode").unwrap();
        assert_eq!(mode.chunk_type, ChunkType::TypescriptType);

        let default_mode = chunks
            .iter()
            .find(|c| c.symbol_name == "DEFAULT_MODE")
            .unwrap();
        assert_eq!(default_mode.chunk_type, ChunkType::TypescriptVariable);

        let module = chunks
            .iter()
            .find(|c| c.chunk_type == ChunkType::TypescriptModule)
            .expect("module chunk");
        assert!(module.content.contains("import React"));
    }

    #[test]
    fn typescript_async_and_default_modifiers() {
        let text = "export async function load() {\n}\n\n\
                    export default class App {\n}\n";
        let chunks = chunk("app.ts", text.as_bytes());

        assert_eq!(
            chunks[0].chunk_type,
            ChunkType::TypescriptFunction
        );
        assert_eq!(chunks[0].symbol_name, "load");
        assert_eq!(chunks[1].chunk_type, ChunkType::TypescriptClass);
        assert_eq!(chunks[1].symbol_name, "App");
    }

    #[test]
    fn typescript_without_exports_is_one_module_chunk() {
        let text = "const x = 1;\nfunction helper() {}\n";
        let chunks = chunk("internal.ts", text.as_bytes());

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_type, ChunkType::TypescriptModule);
    }

    #[test]
    fn config_and_text_files_are_whole_file_chunks() {
        let chunks = chunk("Cargo.toml", b"[package]\nname = \"x\"\n");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_type, ChunkType::ConfigFile);
        assert_eq!(chunks[0].line_end, 2);

        let chunks = chunk("notes.txt", b"plain text\n");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_type, ChunkType::TextFile);
        assert_eq!(chunks[0].symbol_name, "");
    }

    #[test]
    fn binary_file_produces_no_chunks() {
        let mut bytes = b"looks like text ".to_vec();
        bytes.push(0);
        bytes.extend_from_slice(b" but is not");

        assert!(chunk("blob.txt", &bytes).is_empty());
    }

    #[test]
    fn empty_file_is_a_single_chunk() {
        let chunks = chunk("empty.md", b"");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].line_start, 1);
        assert_eq!(chunks[0].line_end, 1);
        assert_eq!(chunks[0].content, "");
    }

    #[test]
    fn huge_section_is_kept_whole() {
        let mut text = String::from("# Big\n");
        for i in 0..12_000 {
            text.push_str(&format!("line {i}\n"));
        }
        let chunks = chunk("big.md", text.as_bytes());

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].line_end, 12_001);
    }
}
