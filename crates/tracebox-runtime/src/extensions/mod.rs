//! Extensions that need the host environment.

mod git;

pub use git::{GIT_REVISION_KEY, GitRevisionContributor, GroupByGitRevision};
