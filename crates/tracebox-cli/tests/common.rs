//! Shared fixture for CLI integration tests.
#![allow(dead_code)]

use assert_cmd::Command;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracebox_types::{StoredTrace, StoredTraces};

pub struct TestFixture {
    temp_dir: TempDir,
    data_dir: PathBuf,
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

impl TestFixture {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let data_dir = temp_dir.path().join(".tracebox");
        fs::create_dir_all(&data_dir).expect("Failed to create data dir");

        // Poll quickly so short-lived programs are picked up fast.
        fs::write(data_dir.join("config.toml"), "[watcher]\npoll_interval_ms = 20\n")
            .expect("Failed to write config");

        Self { temp_dir, data_dir }
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("traces.json")
    }

    pub fn write_store(&self, traces: Vec<StoredTrace>) {
        tracebox_testing::fixtures::write_store(&self.store_path(), traces)
            .expect("Failed to write store");
    }

    pub fn read_store(&self) -> StoredTraces {
        tracebox_testing::fixtures::read_store(&self.store_path()).expect("Failed to read store")
    }

    /// Write a source file under `<root>/src`, returning the source root.
    pub fn write_source(&self, relative: &str, content: &str) -> PathBuf {
        let source_root = self.root().join("src");
        let path = source_root.join(relative);
        fs::create_dir_all(path.parent().expect("source path has a parent"))
            .expect("Failed to create source dir");
        fs::write(path, content).expect("Failed to write source");
        source_root
    }

    #[allow(deprecated)]
    pub fn command(&self) -> Command {
        let mut cmd = Command::cargo_bin("tracebox").expect("Failed to find binary");
        cmd.current_dir(self.root())
            .env_remove("RUST_LOG")
            .env_remove("TRACEBOX_PATH")
            .arg("--data-dir")
            .arg(&self.data_dir);
        cmd
    }
}
