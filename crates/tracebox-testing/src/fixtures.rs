//! Sample trace text and stored-trace files.

use anyhow::Result;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracebox_types::{StoredTrace, StoredTraces};

/// One complete trace followed by the usual exit line.
pub const SIMPLE_TRACE: &str = "Exception in thread \"main\" java.lang.RuntimeException: some
\tat com.tsarev.stacktracebox.MainKt.some1(main.kt:13)
\tat com.tsarev.stacktracebox.MainKt.some2(main.kt:9)
\tat com.tsarev.stacktracebox.MainKt.main(main.kt:5)
\tat com.tsarev.stacktracebox.MainKt.main(main.kt)

Process finished with exit code 1";

/// Two traces separated by unrelated output.
pub const MULTIPLE_TRACES: &str = "Exception in thread \"main\" java.lang.RuntimeException: some
\tat com.tsarev.stacktracebox.MainKt.some1(main.kt:13)

some other text

Exception in thread \"main\" some.OtherException
\tat com.tsarev.stacktracebox.MainKt.some1";

/// A trace with a cause chain and frames in nested classes.
pub const CAUSED_TRACE: &str = "java.lang.IllegalStateException: request failed
\tat com.example.api.Handler$Inner.handle(Handler.java:42)
\tat com.example.api.Server.dispatch(Server.java:7)
Caused by: java.io.IOException: connection reset
\tat com.example.net.Client.read(Client.java:88)
\t... 2 more";

pub fn stored_trace(first_line: &str, other_lines: &[&str], process: Option<&str>) -> StoredTrace {
    let mut metadata = BTreeMap::new();
    if let Some(process) = process {
        metadata.insert(tracebox_types::PROCESS_NAME_KEY.to_string(), process.to_string());
    }
    StoredTrace {
        first_line: first_line.to_string(),
        other_lines: other_lines.iter().map(|line| line.to_string()).collect(),
        channel: "stderr".to_string(),
        time: 1_735_689_600_000,
        metadata,
    }
}

/// Write a store file in the format `JsonFilePersistence` reads.
pub fn write_store(path: &Path, traces: Vec<StoredTrace>) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(&StoredTraces { traces })?;
    std::fs::write(path, content)?;
    Ok(())
}

pub fn read_store(path: &Path) -> Result<StoredTraces> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Fresh directory holding the path of a not-yet-written store file.
pub fn temp_store() -> Result<(TempDir, PathBuf)> {
    let dir = TempDir::new()?;
    let path = dir.path().join("traces.json");
    Ok((dir, path))
}
