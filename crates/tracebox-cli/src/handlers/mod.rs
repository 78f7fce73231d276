pub mod clear;
pub mod run;
pub mod show;

use std::sync::Arc;
use tracebox_engine::ExtensionRegistry;
use tracebox_runtime::{GitRevisionContributor, GroupByGitRevision};

/// Default extensions plus git revision tagging for the current directory.
fn registry() -> ExtensionRegistry {
    let mut registry = ExtensionRegistry::with_defaults();
    let workdir = std::env::current_dir().unwrap_or_else(|_| ".".into());
    registry.add_contributor(Arc::new(GitRevisionContributor::new(workdir)));
    registry.add_criterion(Arc::new(GroupByGitRevision));
    registry
}
