//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Session code MUST NOT call sleep methods. Signals and commands
//! are awaited, never polled.
//! **Exceptions**: Scenario pacing in the simulator, test code

use architectural_enforcement::{
    code_part, is_in_test_function, is_in_test_module, rust_files, SourceFile,
};

/// Test that production code does not contain sleep() calls
#[test]
fn test_no_sleep_in_production_code() {
    let violations = find_sleep_violations();

    if !violations.is_empty() {
        eprintln!("\n❌ CRITICAL: Sleep calls found in production code!\n");

        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }

        eprintln!("\n✅ ACCEPTABLE sleep uses:");
        eprintln!("  - Scenario pacing and wait steps in navsession-sim");
        eprintln!("  - Test code (#[test] or #[tokio::test] functions)");
        eprintln!("\n❌ FORBIDDEN:");
        eprintln!("  - Sleep in polling loops");
        eprintln!("  - Sleep as poor man's synchronization");
        eprintln!("  - Sleep to 'wait' for a signal (subscribe to it!)");

        panic!(
            "\nFound {} sleep violation(s) in production code.\nFix these before merging!",
            violations.len()
        );
    }
}

/// Find all sleep() calls in production code
fn find_sleep_violations() -> Vec<String> {
    let mut violations = Vec::new();

    for file in rust_files("navsession/core/src") {
        check_file(
            &file,
            &mut violations,
            &SleepPolicy {
                allow_pacing: false,
                allow_tests: true,
            },
        );
    }

    for file in rust_files("navsession/sim/src") {
        check_file(
            &file,
            &mut violations,
            &SleepPolicy {
                allow_pacing: true,
                allow_tests: true,
            },
        );
    }

    violations
}

struct SleepPolicy {
    allow_pacing: bool,
    allow_tests: bool,
}

fn check_file(file: &SourceFile, violations: &mut Vec<String>, policy: &SleepPolicy) {
    let lines = file.lines();

    for (idx, line) in lines.iter().enumerate() {
        let code = code_part(line);
        if !(code.contains("::sleep(") || code.contains(".sleep(")) {
            continue;
        }

        if policy.allow_tests
            && (is_in_test_function(&lines, idx) || is_in_test_module(&lines, idx))
        {
            continue;
        }

        if policy.allow_pacing && is_pacing_context(&lines, idx) {
            continue;
        }

        violations.push(file.violation(idx, "sleep", line));
    }
}

/// Check if sleep paces a scenario (acceptable in the simulator)
fn is_pacing_context(lines: &[&str], current_idx: usize) -> bool {
    let context_range = current_idx.saturating_sub(5)..current_idx;

    context_range.into_iter().any(|i| {
        let line = lines[i].to_lowercase();
        line.contains("pacing") || line.contains("wait step")
    })
}

#[test]
fn test_pacing_detection() {
    let code = vec![
        "async fn pace(&self) {",
        "    if !self.pacing.is_zero() {",
        "        tokio::time::sleep(self.pacing).await;",
        "    }",
        "}",
    ];
    assert!(is_pacing_context(&code, 2));
}

#[test]
fn test_sleep_outside_pacing_flagged() {
    let file = SourceFile {
        path: "navsession/core/src/fake.rs".into(),
        content: "async fn poll(&self) {\n    loop {\n        tokio::time::sleep(d).await;\n    }\n}\n"
            .to_string(),
    };

    let mut violations = Vec::new();
    check_file(
        &file,
        &mut violations,
        &SleepPolicy {
            allow_pacing: true,
            allow_tests: true,
        },
    );
    assert_eq!(violations.len(), 1);
    assert!(violations[0].starts_with("navsession/core/src/fake.rs:3"));
}
