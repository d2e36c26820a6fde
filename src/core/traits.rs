//! Core traits for provisiond components
//!
//! These are the seams to the external collaborators of the pipeline:
//! the key-value store, the container runtime and the downstream shipper.

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;

use super::error::AgentResult;
use crate::model::Assembly;

/// Store collections the pipeline reads from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Requests,
    Nodes,
    Assemblies,
    PredefClouds,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Requests => "requests",
            Collection::Nodes => "nodes",
            Collection::Assemblies => "assemblies",
            Collection::PredefClouds => "predefclouds",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only fetch-by-id access to the key-value store
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Fetch the raw record stored under `collection/id`.
    ///
    /// Returns `AgentError::NotFound` when no such key exists and
    /// `AgentError::Store` when the store cannot be reached.
    async fn fetch(&self, collection: Collection, id: &str) -> AgentResult<Vec<u8>>;
}

/// Creation parameters for one container
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerSpec {
    #[serde(skip)]
    pub name: String,
    #[serde(rename = "Image")]
    pub image: String,
}

impl ContainerSpec {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
        }
    }
}

/// Container runtime able to create (not start) containers
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Create a container and return the runtime's id for it
    async fn create_container(&self, spec: &ContainerSpec) -> AgentResult<String>;
}

/// Downstream deployment step that receives a provisioned assembly
#[async_trait]
pub trait Shipper: Send + Sync {
    fn name(&self) -> &str;

    async fn ship(&self, assembly: Assembly);
}
