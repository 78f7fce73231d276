mod common;
use common::TestFixture;
use predicates::prelude::*;
use tracebox_testing::fixtures::stored_trace;

#[test]
fn test_clear_empties_store() {
    let fixture = TestFixture::new();
    fixture.write_store(vec![
        stored_trace("a.FooException", &[], None),
        stored_trace("a.BarException", &["\tat a.B.run(B.java:1)"], None),
    ]);

    fixture
        .command()
        .args(["--format", "json", "clear"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#"{"cleared":2}"#));

    assert!(fixture.read_store().traces.is_empty());
}

#[test]
fn test_clear_without_store_creates_empty_one() {
    let fixture = TestFixture::new();

    fixture
        .command()
        .arg("clear")
        .assert()
        .success()
        .stdout(predicate::str::contains("Cleared 0 traces."));

    assert!(fixture.store_path().exists());
}
