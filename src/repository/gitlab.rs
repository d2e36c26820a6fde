use std::sync::Arc;

use log::debug;

use super::RepositoryManager;
use crate::core::AgentResult;

pub const PROVIDER_NAME: &str = "gitlab";

pub fn create_gitlab_manager() -> Arc<dyn RepositoryManager> {
    Arc::new(GitlabManager)
}

/// GitLab provider. Both operations succeed without side effects.
pub struct GitlabManager;

impl RepositoryManager for GitlabManager {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn clone_repository(&self, url: &str) -> AgentResult<()> {
        debug!("gitlab: clone {url}");
        Ok(())
    }

    fn initialize(&self, url: &str, target_url: &str) -> AgentResult<()> {
        debug!("gitlab: initialize {target_url} from {url}");
        Ok(())
    }
}
