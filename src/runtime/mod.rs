//! Container provisioning
//!
//! [`ContainerProvisioner`] turns one resolved component into one container
//! create call against a [`ContainerRuntime`]. Containers are created, never
//! started, and nothing is retried.

pub mod docker;

use std::sync::Arc;

use log::{debug, error};

use crate::{
    core::{AgentError, AgentResult, ContainerRuntime, ContainerSpec},
    metrics,
};

pub use docker::DockerRuntime;

/// A container that now exists in the runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedContainer {
    pub name: String,
    pub id: String,
}

/// Outcome of one create call. Failures are always `AgentError::Provision`.
pub type ContainerCreationResult = AgentResult<CreatedContainer>;

pub struct ContainerProvisioner {
    runtime: Arc<dyn ContainerRuntime>,
}

impl ContainerProvisioner {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self { runtime }
    }

    pub async fn create_container(&self, name: &str, image: &str) -> ContainerCreationResult {
        let spec = ContainerSpec::new(name, image);
        debug!("Creating container {name} from image {image:?}");

        match self.runtime.create_container(&spec).await {
            Ok(id) => {
                metrics::record_container("created");
                Ok(CreatedContainer {
                    name: name.to_string(),
                    id,
                })
            }
            Err(err) => {
                metrics::record_container("failed");
                error!("Creating container {name} failed: {err}");
                Err(into_provision_error(name, err))
            }
        }
    }
}

fn into_provision_error(name: &str, err: AgentError) -> AgentError {
    match err {
        AgentError::Provision { .. } => err,
        other => AgentError::Provision {
            name: name.to_string(),
            cause: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;

    struct FlakyRuntime {
        calls: Mutex<Vec<ContainerSpec>>,
    }

    #[async_trait]
    impl ContainerRuntime for FlakyRuntime {
        async fn create_container(&self, spec: &ContainerSpec) -> AgentResult<String> {
            self.calls.lock().unwrap().push(spec.clone());
            if spec.image.is_empty() {
                Err(AgentError::Store("socket closed".to_string()))
            } else {
                Ok(format!("id-{}", spec.name))
            }
        }
    }

    #[tokio::test]
    async fn test_create_container() {
        let runtime = Arc::new(FlakyRuntime {
            calls: Mutex::new(Vec::new()),
        });
        let provisioner = ContainerProvisioner::new(runtime.clone());

        let created = provisioner
            .create_container("web", "nginx:latest")
            .await
            .unwrap();
        assert_eq!(created.id, "id-web");
        assert_eq!(
            runtime.calls.lock().unwrap()[0],
            ContainerSpec::new("web", "nginx:latest")
        );
    }

    #[tokio::test]
    async fn test_failures_become_provision_errors() {
        let runtime = Arc::new(FlakyRuntime {
            calls: Mutex::new(Vec::new()),
        });
        let provisioner = ContainerProvisioner::new(runtime);

        match provisioner.create_container("db", "").await {
            Err(AgentError::Provision { name, cause }) => {
                assert_eq!(name, "db");
                assert!(cause.contains("socket closed"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
