//! Integration Test: Global State Prohibition
//!
//! **Policy**: Every piece of session state lives in the session that owns
//! it. Two sessions in one process must never observe each other, so
//! process-global mutable state is forbidden in production code.

use architectural_enforcement::{code_part, rust_files, SourceFile, PRODUCTION_DIRS};

const FORBIDDEN: &[&str] = &[
    "static mut ",
    "lazy_static!",
    "thread_local!",
    "OnceLock",
    "OnceCell",
    "LazyLock",
];

/// Test that production code declares no process-global mutable state
#[test]
fn test_no_global_state_in_production_code() {
    let violations: Vec<String> = PRODUCTION_DIRS
        .iter()
        .flat_map(|dir| rust_files(dir))
        .flat_map(|file| check_file(&file))
        .collect();

    if !violations.is_empty() {
        eprintln!("\n❌ CRITICAL: Global state found in production code!\n");

        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }

        eprintln!("\n✅ REQUIRED:");
        eprintln!("  - Keep state on SessionCoordinator or the collaborator that owns it");
        eprintln!("  - Share through Arc handed out by HostServices");

        panic!(
            "\nFound {} global state violation(s).\nFix these before merging!",
            violations.len()
        );
    }
}

fn check_file(file: &SourceFile) -> Vec<String> {
    file.lines()
        .iter()
        .enumerate()
        .filter_map(|(idx, line)| {
            let code = code_part(line);
            FORBIDDEN
                .iter()
                .find(|pattern| code.contains(*pattern))
                .map(|pattern| file.violation(idx, pattern, line))
        })
        .collect()
}

#[test]
fn test_static_mut_flagged() {
    let file = SourceFile {
        path: "navsession/core/src/fake.rs".into(),
        content: "static mut CURRENT: Option<u32> = None;\nfn label() -> &'static str { \"x\" }\n"
            .to_string(),
    };
    let violations = check_file(&file);
    assert_eq!(violations.len(), 1);
    assert!(violations[0].contains("static mut"));
}

#[test]
fn test_static_lifetime_allowed() {
    let file = SourceFile {
        path: "navsession/core/src/fake.rs".into(),
        content: "pub fn name(&self) -> &'static str {\n    self.name\n}\n".to_string(),
    };
    assert!(check_file(&file).is_empty());
}
