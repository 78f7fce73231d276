pub mod event;
pub mod stored;

pub use event::*;
pub use stored::{StoredTrace, StoredTraces};

/// Metadata key under which the originating process display name is recorded.
pub const PROCESS_NAME_KEY: &str = "tracebox.process";
