// Runtime - async plumbing around the engine
// Watches processes, fans their output through aggregators, stores traces
// and resolves trace lines to source locations in the background.

pub mod broker;
pub mod config;
pub mod error;
pub mod extensions;
pub mod gate;
pub mod listener;
pub mod navigation;
pub mod pipeline;
pub mod process;
pub mod replay;
pub mod source_index;
pub mod store;
pub mod watcher;

pub use broker::EventBroker;
pub use config::{Config, resolve_data_dir};
pub use error::{Error, Result};
pub use extensions::{GIT_REVISION_KEY, GitRevisionContributor, GroupByGitRevision};
pub use gate::ReadinessGate;
pub use listener::ProcessListener;
pub use navigation::{NavigationCache, NavigationUpdate, NavigationWorker, SymbolIndex};
pub use pipeline::TraceBox;
pub use process::{ListenerId, ProcessHandle, ProcessKey, ProcessOutputListener, ProcessSource};
pub use replay::{ReplayChannel, ReplaySubscription};
pub use source_index::{SourceLocation, SourceSymbol, SourceTreeIndex, SourceWatch};
pub use store::{EventStore, JsonFilePersistence, StoreChange, TracePersistence};
pub use watcher::ProcessWatcher;
