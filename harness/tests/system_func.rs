//! End-to-end run through real child processes, with a shell script standing in
//! for the `func` binary.
//!
//! Kept to a single test so no other test thread forks while the script is
//! being written.

#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use func_harness::cli::execute_run;
use func_harness::core::types::{Outcome, Stage};
use func_harness::exit_codes;
use func_harness::io::env::RunConfig;
use func_harness::io::executor::SystemExecutor;
use func_harness::io::settings::{HarnessSettings, Timings};

const FAKE_FUNC: &str = r#"#!/bin/sh
cmd="$1"
shift
case "$cmd" in
  create)
    dir="$1"
    mkdir -p "$dir"
    case "$dir" in
      */broken) echo "template not found" >&2; exit 1 ;;
    esac
    echo "name: $(basename "$dir")" > "$dir/func.yaml"
    ;;
  build)
    [ -f func.yaml ] || exit 1
    echo "building with $2 for $4"
    touch .built
    ;;
  run)
    [ -f .built ] || exit 1
    exec sleep 30
    ;;
  invoke)
    [ -f .built ] || exit 1
    echo '{"ok":true}'
    ;;
  *)
    exit 2
    ;;
esac
"#;

fn write_fake_func(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("func");
    fs::write(&path, FAKE_FUNC).expect("write fake func");
    let mut perms = fs::metadata(&path).expect("metadata").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).expect("chmod");
    path
}

#[test]
fn runs_templates_against_a_scripted_func_binary() {
    let templates = tempfile::tempdir().expect("templates");
    for dir in ["go/hello", "go/broken", "docs/guide", ".github/workflows"] {
        fs::create_dir_all(templates.path().join(dir)).expect("mkdir");
    }
    let bin = tempfile::tempdir().expect("bin");
    let work = tempfile::tempdir().expect("work");

    let run = RunConfig {
        binary_path: write_fake_func(bin.path()),
        registry: "localhost:5000/test".to_string(),
        work_dir: work.path().to_path_buf(),
        host_languages: ["go".to_string()].into(),
    };
    let settings = HarnessSettings {
        timings: Timings {
            settle_delay_ms: 200,
            warmup_delay_ms: 0,
            invoke_retry_delay_ms: 50,
            max_invoke_attempts: 3,
            create_timeout_secs: 10,
            prereq_timeout_secs: 10,
            build_timeout_secs: 10,
            invoke_timeout_secs: 10,
        },
        ..HarnessSettings::default()
    };
    let executor = SystemExecutor::new(10_000);

    let outcome = execute_run(templates.path(), &settings, &run, &executor, &executor)
        .expect("harness run");

    let results = outcome.reporter.results();
    let names: Vec<_> = results.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["go-broken", "go-hello"]);

    let broken = &results[0];
    assert_eq!(broken.outcome, Outcome::Failed);
    assert_eq!(broken.failed_stage, Some(Stage::Create));
    assert!(
        broken
            .error
            .as_deref()
            .is_some_and(|e| e.contains("template not found"))
    );
    let log = fs::read_to_string(broken.log_path.as_ref().expect("log path")).expect("log");
    assert!(log.contains("template not found"));
    assert!(broken.preserved_path.as_ref().expect("preserved").exists());

    let hello = &results[1];
    assert_eq!(hello.outcome, Outcome::Passed, "error: {:?}", hello.error);
    assert_eq!(hello.invoke_attempts, 1);
    assert!(!outcome.scratch_root.join("targets/go/hello").exists());
    assert!(!outcome.scratch_root.join("logs/go/hello.log").exists());

    assert_eq!(outcome.reporter.exit_code(), exit_codes::FAILED);
    assert!(outcome.results_path.expect("results").exists());
}
