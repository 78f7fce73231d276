mod common;
use common::TestFixture;
use predicates::prelude::*;
use tracebox_testing::fixtures::{MULTIPLE_TRACES, SIMPLE_TRACE};
use tracebox_types::PROCESS_NAME_KEY;

/// Prints `$TRACE` to stderr and exits with `$EXIT_CODE`.
const PRINT_TRACE: [&str; 3] = [
    "sh",
    "-c",
    "printf '%s\\n' \"$TRACE\" >&2; exit \"${EXIT_CODE:-0}\"",
];

#[test]
fn test_run_captures_trace_from_stderr() {
    let fixture = TestFixture::new();

    fixture
        .command()
        .arg("run")
        .args(PRINT_TRACE)
        .env("TRACE", SIMPLE_TRACE)
        .env("EXIT_CODE", "3")
        .assert()
        .code(3)
        .stdout(predicate::str::contains(
            "Exception in thread \"main\" java.lang.RuntimeException: some",
        ))
        .stdout(predicate::str::contains("(process: sh"));

    let stored = fixture.read_store();
    assert_eq!(stored.traces.len(), 1);
    let trace = &stored.traces[0];
    assert_eq!(
        trace.first_line,
        "Exception in thread \"main\" java.lang.RuntimeException: some"
    );
    assert_eq!(trace.other_lines.len(), 4);
    assert_eq!(trace.other_lines[0], "at com.tsarev.stacktracebox.MainKt.some1(main.kt:13)");
    assert_eq!(trace.channel, "stderr");
    assert_eq!(trace.metadata.get(PROCESS_NAME_KEY).map(String::as_str), Some("sh"));
}

#[test]
fn test_run_appends_to_existing_store() {
    let fixture = TestFixture::new();
    fixture.write_store(vec![tracebox_testing::fixtures::stored_trace(
        "a.EarlierException",
        &[],
        Some("old"),
    )]);

    fixture
        .command()
        .arg("run")
        .args(PRINT_TRACE)
        .env("TRACE", MULTIPLE_TRACES)
        .assert()
        .success();

    let stored = fixture.read_store();
    let first_lines: Vec<_> = stored.traces.iter().map(|t| t.first_line.as_str()).collect();
    assert_eq!(
        first_lines,
        vec![
            "a.EarlierException",
            "Exception in thread \"main\" java.lang.RuntimeException: some",
            "Exception in thread \"main\" some.OtherException",
        ]
    );
}

#[test]
fn test_run_json_prints_one_object_per_trace() {
    let fixture = TestFixture::new();

    let output = fixture
        .command()
        .args(["--format", "json", "run"])
        .args(PRINT_TRACE)
        .env("TRACE", MULTIPLE_TRACES)
        .output()
        .expect("Failed to run");
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let traces: Vec<serde_json::Value> = stdout
        .lines()
        .map(|line| serde_json::from_str(line).expect("Each line is JSON"))
        .collect();
    assert_eq!(traces.len(), 2);
    assert_eq!(traces[0]["exception"], "java.lang.RuntimeException");
    assert_eq!(traces[0]["message"], "some");
    assert_eq!(traces[1]["exception"], "some.OtherException");
    assert_eq!(traces[1]["lines"].as_array().map(Vec::len), Some(2));
}

#[test]
fn test_run_raw_echoes_output_without_traces() {
    let fixture = TestFixture::new();

    fixture
        .command()
        .args(["run", "--raw", "sh", "-c", "echo hello; exit 2"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("hello"));

    assert!(fixture.read_store().traces.is_empty());
}

#[test]
fn test_run_unknown_program_fails() {
    let fixture = TestFixture::new();

    fixture
        .command()
        .args(["run", "definitely-not-a-real-program-xyz"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error: Failed to start definitely-not-a-real-program-xyz"));
}
