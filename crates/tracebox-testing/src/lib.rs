//! Testing infrastructure for tracebox tests.
//!
//! - `fixtures`: Sample trace text and stored-trace files
//! - `process`: In-memory process host driving the runtime's host traits
//! - `index`: Scriptable symbol index with failure injection
//! - `assertions`: Polling helpers for asynchronous expectations

pub mod assertions;
pub mod fixtures;
pub mod index;
pub mod process;

pub use index::FakeSymbolIndex;
pub use process::{FakeProcess, FakeProcessSource};
