use crate::types::OutputFormat;
use anyhow::Result;
use std::path::Path;
use tracebox_runtime::{EventStore, JsonFilePersistence};

pub fn handle(store_path: &Path, format: OutputFormat) -> Result<()> {
    let persistence = JsonFilePersistence::new(store_path);
    let store = EventStore::new();
    let cleared = store.load(&persistence)?;
    store.clear();
    store.save(&persistence)?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::json!({ "cleared": cleared })),
        OutputFormat::Plain => println!("Cleared {} traces.", cleared),
    }
    Ok(())
}
