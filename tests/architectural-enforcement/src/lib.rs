//! Architectural Enforcement Integration Tests
//!
//! This package contains integration tests that enforce architectural principles
//! across the navsession crates:
//! - No sleep() calls in production code (scenario pacing excepted)
//! - No blocking I/O inside async functions
//! - No process-global mutable state
//!
//! The helpers here walk the workspace sources and classify lines. They are
//! line-based heuristics, not a parser.

use std::fs;
use std::path::{Path, PathBuf};

/// Production source directories, relative to the workspace root
pub const PRODUCTION_DIRS: &[&str] = &["navsession/core/src", "navsession/sim/src"];

/// Workspace root, resolved from this package's manifest directory
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../..")
}

/// A source file split into lines
pub struct SourceFile {
    /// Path relative to the workspace root
    pub path: PathBuf,
    /// File contents
    pub content: String,
}

impl SourceFile {
    /// Lines of the file
    #[must_use]
    pub fn lines(&self) -> Vec<&str> {
        self.content.lines().collect()
    }

    /// Format a violation at `idx` (zero-based)
    #[must_use]
    pub fn violation(&self, idx: usize, what: &str, line: &str) -> String {
        format!("{}:{} - {}: {}", self.path.display(), idx + 1, what, line.trim())
    }
}

/// Every `.rs` file under `dir` (relative to the workspace root)
#[must_use]
pub fn rust_files(dir: &str) -> Vec<SourceFile> {
    let root = workspace_root();
    let path = root.join(dir);
    if !path.exists() {
        return Vec::new();
    }

    walkdir::WalkDir::new(&path)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.path().extension().and_then(|s| s.to_str()) == Some("rs"))
        .filter_map(|entry| {
            let content = fs::read_to_string(entry.path()).ok()?;
            let relative = entry
                .path()
                .strip_prefix(&root)
                .unwrap_or(entry.path())
                .to_path_buf();
            Some(SourceFile {
                path: relative,
                content,
            })
        })
        .collect()
}

/// Code portion of a line with any trailing `//` comment removed
#[must_use]
pub fn code_part(line: &str) -> &str {
    line.split("//").next().unwrap_or(line)
}

/// Whether the line at `current_idx` sits inside a `#[cfg(test)]` module
#[must_use]
pub fn is_in_test_module(lines: &[&str], current_idx: usize) -> bool {
    for i in (0..current_idx).rev() {
        let line = lines[i].trim();
        if line.starts_with("mod tests") {
            return i > 0 && lines[i - 1].trim().starts_with("#[cfg(test)]");
        }
    }
    false
}

/// Whether the line at `current_idx` is inside a test function
#[must_use]
pub fn is_in_test_function(lines: &[&str], current_idx: usize) -> bool {
    // Scan backwards to find the enclosing function
    let mut found_fn_idx = None;
    for i in (0..current_idx).rev() {
        let line = lines[i].trim();

        if line.starts_with("fn ") || line.contains(" fn ") {
            found_fn_idx = Some(i);
            break;
        }

        // Stop at module boundaries
        if line.starts_with("mod ") || (line.starts_with("impl") && line.contains('{')) {
            return false;
        }
    }

    if let Some(fn_idx) = found_fn_idx {
        for i in (0..fn_idx).rev() {
            let line = lines[i].trim();

            if line.starts_with("#[test]") || line.starts_with("#[tokio::test") {
                return true;
            }

            // Doc comments and other attributes sit between marker and fn
            if line.starts_with("#[") || line.starts_with("///") {
                continue;
            }
            break;
        }
    }

    false
}

/// Whether the line at `current_idx` is inside an async function
#[must_use]
pub fn is_in_async_function(lines: &[&str], current_idx: usize) -> bool {
    for i in (0..current_idx).rev() {
        let line = lines[i].trim();

        if line.contains("async fn ") {
            return true;
        }

        if (line.starts_with("fn ") || line.contains(" fn ")) && !line.contains("async") {
            return false;
        }

        if line.starts_with("mod ") || (line.starts_with("impl") && line.contains('{')) {
            return false;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workspace_root_has_production_dirs() {
        for dir in PRODUCTION_DIRS {
            assert!(workspace_root().join(dir).exists(), "{dir} missing");
        }
    }

    #[test]
    fn test_rust_files_found() {
        let files = rust_files("navsession/core/src");
        assert!(files
            .iter()
            .any(|f| f.path.ends_with("navsession/core/src/lib.rs")));
    }

    #[test]
    fn test_code_part_strips_comment() {
        assert_eq!(code_part("let x = 1; // sleep(5)"), "let x = 1; ");
        assert_eq!(code_part("let x = 1;"), "let x = 1;");
    }

    #[test]
    fn test_test_module_detection() {
        let code = vec![
            "fn prod() {}",
            "#[cfg(test)]",
            "mod tests {",
            "    fn helper() {}",
            "}",
        ];
        assert!(!is_in_test_module(&code, 0));
        assert!(is_in_test_module(&code, 3));
    }

    #[test]
    fn test_test_function_detection() {
        let code = vec![
            "#[tokio::test]",
            "async fn test_something() {",
            "    tokio::time::sleep(d).await;",
            "}",
            "pub async fn run() {",
            "    tokio::time::sleep(d).await;",
            "}",
        ];
        assert!(is_in_test_function(&code, 2));
        assert!(!is_in_test_function(&code, 5));
    }

    #[test]
    fn test_async_function_detection() {
        let code = vec![
            "pub async fn run() {",
            "    let s = std::io::stdout();",
            "}",
            "pub fn load() {",
            "    let s = std::fs::read_to_string(p);",
            "}",
        ];
        assert!(is_in_async_function(&code, 1));
        assert!(!is_in_async_function(&code, 4));
    }
}
