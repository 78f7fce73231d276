use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;
use tracebox_engine::{DisplayPart, GroupingCriterion, MetadataContributor};
use tracebox_types::TraceEvent;

pub const GIT_REVISION_KEY: &str = "tracebox.git.revision";

/// Records the git revision checked out in a working directory.
///
/// `git rev-parse HEAD` runs at most once; outside a repository nothing is
/// recorded.
#[derive(Debug)]
pub struct GitRevisionContributor {
    workdir: PathBuf,
    revision: OnceLock<Option<String>>,
}

impl GitRevisionContributor {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
            revision: OnceLock::new(),
        }
    }

    /// Contributor with a known revision, skipping the git lookup.
    pub fn with_revision(revision: impl Into<String>) -> Self {
        let contributor = Self::new(".");
        let _ = contributor.revision.set(Some(revision.into()));
        contributor
    }

    pub fn revision(&self) -> Option<&str> {
        self.revision
            .get_or_init(|| read_revision(&self.workdir))
            .as_deref()
    }
}

fn read_revision(workdir: &Path) -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "HEAD"])
        .current_dir(workdir)
        .output();

    match output {
        Ok(output) if output.status.success() => {
            let revision = String::from_utf8_lossy(&output.stdout).trim().to_string();
            (!revision.is_empty()).then_some(revision)
        }
        Ok(_) => {
            tracing::debug!(workdir = %workdir.display(), "Not a git working tree");
            None
        }
        Err(err) => {
            tracing::debug!(error = %err, "git is not available");
            None
        }
    }
}

impl MetadataContributor for GitRevisionContributor {
    fn priority(&self) -> i32 {
        1
    }

    fn name(&self) -> &'static str {
        "git"
    }

    fn metadata(&self, _trace: &TraceEvent) -> BTreeMap<String, String> {
        self.revision()
            .map(|revision| BTreeMap::from([(GIT_REVISION_KEY.to_string(), revision.to_string())]))
            .unwrap_or_default()
    }

    fn display_parts(&self, trace: &TraceEvent) -> Vec<DisplayPart> {
        trace
            .metadata_value(GIT_REVISION_KEY)
            .map(|revision| {
                let short: String = revision.chars().take(10).collect();
                vec![DisplayPart::new("revision", short)]
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct GroupByGitRevision;

impl GroupingCriterion for GroupByGitRevision {
    fn priority(&self) -> i32 {
        3
    }

    fn name(&self) -> &'static str {
        "git"
    }

    fn label(&self) -> &'static str {
        "Git revision"
    }

    fn key(&self, trace: &TraceEvent) -> String {
        trace
            .metadata_value(GIT_REVISION_KEY)
            .unwrap_or("no revision")
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tracebox_engine::ExtensionRegistry;
    use tracebox_types::{ChannelTag, ExceptionHeader};

    fn trace() -> TraceEvent {
        TraceEvent::new(
            ExceptionHeader::new("a.FooException", "a.FooException", None),
            Vec::new(),
            ChannelTag::stderr(),
            Utc::now(),
        )
    }

    #[test]
    fn test_revision_is_attached_and_grouped() {
        let mut registry = ExtensionRegistry::with_defaults();
        registry.add_contributor(std::sync::Arc::new(GitRevisionContributor::with_revision(
            "0123456789abcdef",
        )));
        registry.add_criterion(std::sync::Arc::new(GroupByGitRevision));

        let mut trace = trace();
        assert_eq!(GroupByGitRevision.key(&trace), "no revision");

        registry.apply_metadata(&mut trace);
        assert_eq!(trace.metadata_value(GIT_REVISION_KEY), Some("0123456789abcdef"));
        assert_eq!(GroupByGitRevision.key(&trace), "0123456789abcdef");
        assert_eq!(
            registry.display_parts(&trace),
            vec![DisplayPart::new("revision", "0123456789")]
        );
    }

    #[test]
    fn test_outside_repository_records_nothing() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let contributor = GitRevisionContributor::new(temp_dir.path());
        assert!(contributor.metadata(&trace()).is_empty());
    }
}
