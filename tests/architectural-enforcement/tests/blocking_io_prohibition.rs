//! Integration Test: Blocking I/O Prohibition
//!
//! **Policy**: Async functions MUST NOT use blocking I/O. The session loop and
//! its collaborators share one runtime; a blocked worker stalls every scope.
//! **Required**: Use `tokio::fs`, `tokio::io`, `tokio::net` inside async code.
//! Blocking reads are fine in plain functions that run before the runtime
//! needs them (config and scenario loading).

use architectural_enforcement::{
    code_part, is_in_async_function, is_in_test_function, is_in_test_module, rust_files,
    SourceFile, PRODUCTION_DIRS,
};

const FORBIDDEN: &[(&str, &str)] = &[
    ("std::fs::", "Blocking file I/O"),
    ("std::net::", "Blocking network I/O"),
    ("std::process::Command", "Blocking process I/O"),
    ("std::io::stdin()", "Blocking stdin"),
    ("std::io::stdout()", "Blocking stdout"),
    ("reqwest::blocking", "Blocking HTTP client"),
];

/// Test that async production code does not use blocking I/O
#[test]
fn test_no_blocking_io_in_async_code() {
    let violations: Vec<String> = PRODUCTION_DIRS
        .iter()
        .flat_map(|dir| rust_files(dir))
        .flat_map(|file| check_file(&file))
        .collect();

    if !violations.is_empty() {
        eprintln!("\n❌ CRITICAL: Blocking I/O calls found in async code!\n");

        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }

        eprintln!("\n✅ REQUIRED async I/O:");
        eprintln!("  - tokio::fs::read_to_string().await");
        eprintln!("  - tokio::io::stdout() with AsyncWriteExt");
        eprintln!("\n✅ ACCEPTABLE blocking I/O:");
        eprintln!("  - Non-async functions (config and scenario loading)");
        eprintln!("  - Test code");

        panic!(
            "\nFound {} blocking I/O violation(s) in async code.\nFix these before merging!",
            violations.len()
        );
    }
}

fn check_file(file: &SourceFile) -> Vec<String> {
    let lines = file.lines();
    let mut violations = Vec::new();

    for (idx, line) in lines.iter().enumerate() {
        let code = code_part(line);

        let Some((_, what)) = FORBIDDEN.iter().find(|(pattern, _)| code.contains(pattern)) else {
            continue;
        };

        if is_in_test_function(&lines, idx) || is_in_test_module(&lines, idx) {
            continue;
        }

        if is_in_async_function(&lines, idx) {
            violations.push(file.violation(idx, what, line));
        }
    }

    violations
}

#[test]
fn test_blocking_read_in_async_flagged() {
    let file = SourceFile {
        path: "navsession/sim/src/fake.rs".into(),
        content: "pub async fn load(p: &Path) {\n    let s = std::fs::read_to_string(p);\n}\n"
            .to_string(),
    };
    let violations = check_file(&file);
    assert_eq!(violations.len(), 1);
    assert!(violations[0].contains("Blocking file I/O"));
}

#[test]
fn test_blocking_read_in_plain_fn_allowed() {
    let file = SourceFile {
        path: "navsession/sim/src/fake.rs".into(),
        content: "fn read_scenario(p: &Path) {\n    let s = std::fs::read_to_string(p);\n}\n"
            .to_string(),
    };
    assert!(check_file(&file).is_empty());
}
