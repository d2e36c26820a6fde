//! Read-only walk of the specification graph
//!
//! Every lookup is an independent store round-trip, issued in traversal
//! order. Nothing is cached between calls.

use std::sync::Arc;

use log::{debug, warn};

use crate::{
    core::{AgentError, AgentResult, Collection, KvStore},
    model::{
        is_assembly_id, Assembly, Component, ComponentInputs, ComponentRequirements,
        LenientDecode, NodeAssemblyIndex, PredefinedCloudSpec, Request,
    },
    store::decode_record,
};

pub struct GraphResolver {
    store: Arc<dyn KvStore>,
}

impl GraphResolver {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    pub async fn resolve_request(&self, id: &str) -> AgentResult<Request> {
        let bytes = self.store.fetch(Collection::Requests, id).await?;
        decode_record(Collection::Requests, id, &bytes)
    }

    pub async fn resolve_assembly_index(&self, node_id: &str) -> AgentResult<NodeAssemblyIndex> {
        let bytes = self.store.fetch(Collection::Nodes, node_id).await?;
        decode_record(Collection::Nodes, node_id, &bytes)
    }

    /// Resolve one assembly. Placeholder ids (empty or a single character)
    /// resolve to `None` without touching the store.
    pub async fn resolve_assembly(&self, assembly_id: &str) -> AgentResult<Option<Assembly>> {
        if !is_assembly_id(assembly_id) {
            debug!("Skipping placeholder assembly id {assembly_id:?}");
            return Ok(None);
        }
        let bytes = self
            .store
            .fetch(Collection::Assemblies, assembly_id)
            .await?;
        decode_record(Collection::Assemblies, assembly_id, &bytes).map(Some)
    }

    /// Requirements and inputs of a component, zero-valued where the
    /// sub-structure does not decode.
    pub fn resolve_component_details(
        &self,
        component: &Component,
    ) -> (ComponentRequirements, ComponentInputs) {
        (component.requirements(), component.inputs())
    }

    /// Fetch the cloud spec a host id points at. The body is decoded
    /// leniently; only the fetch itself can fail.
    pub async fn resolve_predefined_cloud(&self, host_id: &str) -> AgentResult<PredefinedCloudSpec> {
        let bytes = self.store.fetch(Collection::PredefClouds, host_id).await?;
        Ok(PredefinedCloudSpec::parse_bytes_or_default(&bytes))
    }

    /// Cloud lookup for a component. An empty host skips the fetch and a
    /// missing record yields `None`; store failures propagate.
    pub async fn lookup_cloud_for(
        &self,
        requirements: &ComponentRequirements,
    ) -> AgentResult<Option<PredefinedCloudSpec>> {
        if requirements.host.is_empty() {
            return Ok(None);
        }
        match self.resolve_predefined_cloud(&requirements.host).await {
            Ok(cloud) => Ok(Some(cloud)),
            Err(err @ AgentError::NotFound { .. }) => {
                warn!("Predefined cloud not resolved: {err}");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{core::AgentError, store::MemoryStore};

    fn resolver_with(store: Arc<MemoryStore>) -> GraphResolver {
        GraphResolver::new(store)
    }

    #[tokio::test]
    async fn test_resolve_request_and_index() {
        let store = Arc::new(MemoryStore::new());
        store.insert_raw(
            Collection::Requests,
            "req-1",
            r#"{"id":"req-1","node_id":"node-1","req_type":"create"}"#,
        );
        store.insert_raw(
            Collection::Nodes,
            "node-1",
            r#"{"id":"node-1","assemblies":["asm-1",""]}"#,
        );
        let resolver = resolver_with(store.clone());

        let req = resolver.resolve_request("req-1").await.unwrap();
        assert_eq!(req.node_id, "node-1");

        let index = resolver.resolve_assembly_index(&req.node_id).await.unwrap();
        assert_eq!(index.assemblies.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_request() {
        let resolver = resolver_with(Arc::new(MemoryStore::new()));
        match resolver.resolve_request("req-x").await {
            Err(AgentError::NotFound { collection, .. }) => assert_eq!(collection, "requests"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_placeholder_assembly_never_fetched() {
        let store = Arc::new(MemoryStore::new());
        let resolver = resolver_with(store.clone());

        assert!(resolver.resolve_assembly("").await.unwrap().is_none());
        assert!(resolver.resolve_assembly("x").await.unwrap().is_none());
        assert!(store.fetch_log().is_empty());
    }

    #[tokio::test]
    async fn test_predefined_cloud_lenient_body() {
        let store = Arc::new(MemoryStore::new());
        store.insert_raw(Collection::PredefClouds, "h1", "garbage");
        store.insert_raw(
            Collection::PredefClouds,
            "h2",
            r#"{"id":"h2","name":"docker","spec":{"type_name":"docker"}}"#,
        );
        let resolver = resolver_with(store.clone());

        let cloud = resolver.resolve_predefined_cloud("h1").await.unwrap();
        assert_eq!(cloud, PredefinedCloudSpec::default());

        let cloud = resolver.resolve_predefined_cloud("h2").await.unwrap();
        assert_eq!(cloud.spec().type_name, "docker");
    }

    #[tokio::test]
    async fn test_lookup_cloud_skips_empty_host() {
        let store = Arc::new(MemoryStore::new());
        let resolver = resolver_with(store.clone());

        let component = Component::parse_or_default(&json!({
            "name": "web",
            "requirements": "broken",
            "inputs": {"source": "nginx:latest"}
        }));
        let (requirements, inputs) = resolver.resolve_component_details(&component);
        assert_eq!(requirements.host, "");
        assert_eq!(inputs.source, "nginx:latest");

        assert!(resolver.lookup_cloud_for(&requirements).await.unwrap().is_none());
        assert!(store.fetch_log().is_empty());

        let missing = ComponentRequirements {
            host: "h-missing".to_string(),
        };
        assert!(resolver.lookup_cloud_for(&missing).await.unwrap().is_none());
        assert!(store.fetched(Collection::PredefClouds, "h-missing"));
    }

    struct UnreachableStore;

    #[async_trait::async_trait]
    impl KvStore for UnreachableStore {
        async fn fetch(&self, _collection: Collection, _id: &str) -> AgentResult<Vec<u8>> {
            Err(AgentError::Store("etcd unreachable".to_string()))
        }
    }

    #[tokio::test]
    async fn test_lookup_cloud_propagates_store_failure() {
        let resolver = GraphResolver::new(Arc::new(UnreachableStore));
        let requirements = ComponentRequirements {
            host: "h1".to_string(),
        };
        match resolver.lookup_cloud_for(&requirements).await {
            Err(AgentError::Store(msg)) => assert!(msg.contains("unreachable")),
            other => panic!("unexpected {other:?}"),
        }
    }
}
