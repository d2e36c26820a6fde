//! Source repository managers
//!
//! Managers are looked up by provider name. The provisioning path does not
//! call them; they are resolved at config load so an unknown provider is
//! rejected early.

pub mod gitlab;

use std::{collections::HashMap, sync::Arc};

use once_cell::sync::Lazy;

use crate::core::{AgentError, AgentResult};

/// Operations a source repository provider exposes
pub trait RepositoryManager: Send + Sync {
    fn name(&self) -> &str;

    /// Clone the repository at `url`
    fn clone_repository(&self, url: &str) -> AgentResult<()>;

    /// Initialize `target_url` from the repository at `url`
    fn initialize(&self, url: &str, target_url: &str) -> AgentResult<()>;
}

type ManagerCreateFn = fn() -> Arc<dyn RepositoryManager>;

/// Global registry mapping provider names to their factory functions.
static REPOSITORY_REGISTRY: Lazy<HashMap<&'static str, ManagerCreateFn>> = Lazy::new(|| {
    let arr: Vec<(&str, ManagerCreateFn)> = vec![(
        gitlab::PROVIDER_NAME,
        gitlab::create_gitlab_manager,
    )];
    arr.into_iter().collect()
});

/// Look up a repository manager by provider name.
///
/// # Errors
/// Returns `AgentError::Repository` for unknown provider names
pub fn manager(name: &str) -> AgentResult<Arc<dyn RepositoryManager>> {
    let builder = REPOSITORY_REGISTRY
        .get(name)
        .ok_or_else(|| AgentError::Repository(format!("unknown repository provider {name:?}")))?;
    Ok(builder())
}

/// Names of every registered provider, sorted
pub fn providers() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = REPOSITORY_REGISTRY.keys().copied().collect();
    names.sort_unstable();
    names
}
