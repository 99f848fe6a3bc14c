use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::PreprocessError;

/// Resolves `#include`/`#define` directives and produces a single
/// expanded character stream the lexer scans as if it were one file.
///
/// Each source file is read at most once: `included` records canonical
/// absolute paths already spliced in, making repeated or circular
/// includes a silent no-op rather than an error.
pub struct Preprocessor {
    search_paths: Vec<PathBuf>,
    included: HashSet<PathBuf>,
    macros: HashMap<String, Vec<String>>,
}

impl Preprocessor {
    pub fn new(search_paths: Vec<PathBuf>) -> Self {
        Self {
            search_paths,
            included: HashSet::new(),
            macros: HashMap::new(),
        }
    }

    /// Expands `entry` and everything it (transitively) includes into one
    /// string, line numbers preserved per-source-file but not globally
    /// contiguous; the lexer only needs position info relative to the
    /// originating line within whichever file is in scope at lex time, so
    /// positions here describe the splice output, line-numbered from 1.
    pub fn run(&mut self, entry: &Path) -> Result<String, PreprocessError> {
        let canonical = canonicalize_best_effort(entry);
        let mut out = String::new();
        self.include_file(&canonical, &mut out)?;
        Ok(out)
    }

    fn include_file(&mut self, path: &Path, out: &mut String) -> Result<(), PreprocessError> {
        if self.included.contains(path) {
            debug!(path = %path.display(), "include already satisfied, skipping");
            return Ok(());
        }
        self.included.insert(path.to_path_buf());

        let text = std::fs::read_to_string(path).map_err(|_| {
            PreprocessError::IncludeNotFound(
                path.display().to_string(),
                0,
                path.display().to_string(),
            )
        })?;

        let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();

        for (lineno, raw_line) in text.lines().enumerate() {
            let lineno = lineno as u32 + 1;
            let trimmed = raw_line.trim_start();

            if let Some(rest) = trimmed.strip_prefix("#include") {
                let target = parse_include_target(rest).ok_or_else(|| {
                    PreprocessError::MalformedDirective(
                        path.display().to_string(),
                        lineno,
                        raw_line.to_string(),
                    )
                })?;
                let resolved = self.resolve_include(&dir, &target).ok_or_else(|| {
                    PreprocessError::IncludeNotFound(path.display().to_string(), lineno, target)
                })?;
                self.include_file(&resolved, out)?;
                continue;
            }

            if let Some(rest) = trimmed.strip_prefix("#define") {
                let (name, tokens) = parse_define(rest).ok_or_else(|| {
                    PreprocessError::MalformedDirective(
                        path.display().to_string(),
                        lineno,
                        raw_line.to_string(),
                    )
                })?;
                self.macros.insert(name, tokens);
                continue;
            }

            let expanded = self.expand_line(raw_line, path, lineno)?;
            out.push_str(&expanded);
            out.push('\n');
        }

        Ok(())
    }

    fn resolve_include(&self, current_dir: &Path, target: &str) -> Option<PathBuf> {
        let direct = current_dir.join(target);
        if direct.is_file() {
            return Some(canonicalize_best_effort(&direct));
        }
        for base in &self.search_paths {
            let candidate = base.join(target);
            if candidate.is_file() {
                return Some(canonicalize_best_effort(&candidate));
            }
        }
        None
    }

    /// Textually substitutes macro names matched on word boundaries,
    /// re-scanning the result so a macro expanding into another macro's
    /// name is itself expanded, while a direct self-reference is reported
    /// as `CyclicMacro` rather than looping forever.
    fn expand_line(&self, line: &str, path: &Path, lineno: u32) -> Result<String, PreprocessError> {
        let mut current = line.to_string();
        let mut seen = HashSet::new();

        loop {
            let mut changed = false;
            let mut result = String::with_capacity(current.len());
            let bytes = current.as_bytes();
            let mut i = 0;

            while i < bytes.len() {
                if in_literal_at(&current, i) {
                    let ch = current[i..].chars().next().unwrap();
                    result.push(ch);
                    i += ch.len_utf8();
                    continue;
                }
                if is_ident_start(bytes[i] as char) {
                    let start = i;
                    while i < bytes.len() && is_ident_continue(bytes[i] as char) {
                        i += 1;
                    }
                    let word = &current[start..i];
                    if let Some(expansion) = self.macros.get(word) {
                        if !seen.insert(word.to_string()) {
                            return Err(PreprocessError::CyclicMacro(
                                path.display().to_string(),
                                lineno,
                                word.to_string(),
                            ));
                        }
                        result.push_str(&expansion.join(" "));
                        changed = true;
                    } else {
                        result.push_str(word);
                    }
                    continue;
                }
                let ch = current[i..].chars().next().unwrap();
                result.push(ch);
                i += ch.len_utf8();
            }

            current = result;
            if !changed {
                break;
            }
        }

        Ok(current)
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// True if byte offset `i` of `line` lies inside a string or character
/// literal or a `//` comment. Comments/literals are never nested or
/// multi-line within a single scanned line, so a simple left-to-right scan
/// suffices.
fn in_literal_at(line: &str, i: usize) -> bool {
    let bytes = line.as_bytes();
    let mut j = 0;
    let mut in_string = false;
    let mut in_char = false;
    while j < i && j < bytes.len() {
        let c = bytes[j] as char;
        if in_string {
            if c == '\\' {
                j += 2;
                continue;
            }
            if c == '"' {
                in_string = false;
            }
        } else if in_char {
            if c == '\\' {
                j += 2;
                continue;
            }
            if c == '\'' {
                in_char = false;
            }
        } else if c == '/' && bytes.get(j + 1) == Some(&b'/') {
            return true;
        } else if c == '"' {
            in_string = true;
        } else if c == '\'' {
            in_char = true;
        }
        j += 1;
    }
    in_string || in_char
}

fn parse_include_target(rest: &str) -> Option<String> {
    let rest = rest.trim();
    let rest = rest.strip_suffix(';').unwrap_or(rest).trim();
    let rest = rest.strip_prefix('"')?;
    let end = rest.find('"')?;
    Some(rest[..end].to_string())
}

fn parse_define(rest: &str) -> Option<(String, Vec<String>)> {
    let rest = rest.trim_start();
    let mut first = rest.chars();
    if !first.next().is_some_and(is_ident_start) {
        return None;
    }
    let end = rest
        .char_indices()
        .find(|(_, c)| !is_ident_continue(*c))
        .map(|(idx, _)| idx)
        .unwrap_or(rest.len());
    let name = rest[..end].to_string();
    let tokens: Vec<String> = rest[end..]
        .split_whitespace()
        .map(str::to_string)
        .collect();
    Some((name, tokens))
}

fn canonicalize_best_effort(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(name: &str, contents: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("rtmc-preprocess-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn expands_object_like_macro_on_word_boundary() {
        let path = write_temp("macro.rtmc", "#define N 4\nint arr[N];\n");
        let mut pp = Preprocessor::new(vec![]);
        let out = pp.run(&path).unwrap();
        assert!(out.contains("int arr[4];"));
    }

    #[test]
    fn does_not_expand_substring_matches() {
        let path = write_temp("substr.rtmc", "#define N 4\nint NAME;\n");
        let mut pp = Preprocessor::new(vec![]);
        let out = pp.run(&path).unwrap();
        assert!(out.contains("int NAME;"));
    }

    #[test]
    fn include_is_idempotent() {
        let a = write_temp("a_inc.rtmc", "#define N 4\n");
        let b_src = format!("#include \"{}\";\n#include \"{}\";\nint arr[N];\n", a.display(), a.display());
        let b = write_temp("b_inc.rtmc", &b_src);
        let mut pp = Preprocessor::new(vec![]);
        let out = pp.run(&b).unwrap();
        assert_eq!(out.matches("arr[4]").count(), 1);
    }

    #[test]
    fn direct_cyclic_macro_is_rejected() {
        let path = write_temp("cycle.rtmc", "#define A A\nint x = A;\n");
        let mut pp = Preprocessor::new(vec![]);
        assert!(matches!(pp.run(&path), Err(PreprocessError::CyclicMacro(..))));
    }

    #[test]
    fn missing_include_is_reported() {
        let path = write_temp("missing.rtmc", "#include \"does_not_exist.rtmc\";\n");
        let mut pp = Preprocessor::new(vec![]);
        assert!(matches!(pp.run(&path), Err(PreprocessError::IncludeNotFound(..))));
    }
}
