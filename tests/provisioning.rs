use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use provisiond::{
    config::{Config, FailurePolicy},
    core::{AgentError, AgentResult, Collection, ContainerRuntime, ContainerSpec},
    model::{Assembly, NodeAssemblyIndex, Request},
    orchestration::{ProvisioningOrchestrator, RunOutcome},
    queue::MessageHandler,
    shipper::{LogShipper, ShipperDispatcher},
    store::MemoryStore,
};

#[derive(Default)]
struct CountingRuntime {
    created: Mutex<Vec<String>>,
}

#[async_trait]
impl ContainerRuntime for CountingRuntime {
    async fn create_container(&self, spec: &ContainerSpec) -> AgentResult<String> {
        self.created.lock().unwrap().push(spec.name.clone());
        Ok(format!("{:0>12}", spec.name))
    }
}

fn seed(store: &MemoryStore) {
    store.insert(
        Collection::Requests,
        "req-1",
        &Request {
            id: "req-1".to_string(),
            node_id: "node-1".to_string(),
            req_type: "create".to_string(),
            ..Default::default()
        },
    );
    store.insert(
        Collection::Nodes,
        "node-1",
        &NodeAssemblyIndex {
            id: "node-1".to_string(),
            assemblies: vec!["asm-1".to_string(), "".to_string()],
        },
    );
    store.insert(
        Collection::Assemblies,
        "asm-1",
        &Assembly {
            id: "asm-1".to_string(),
            name: "shop".to_string(),
            components: vec![
                json!({"name": "web", "requirements": {"host": "h1"}, "inputs": {"source": "nginx:latest"}}),
                json!({"name": "api", "requirements": {"host": "h1"}, "inputs": {"source": "shop/api:1.4"}}),
            ],
            ..Default::default()
        },
    );
    store.insert_raw(
        Collection::PredefClouds,
        "h1",
        r#"{"id":"h1","name":"local","spec":{"type_name":"docker"}}"#,
    );
}

#[tokio::test]
async fn test_create_request_end_to_end() {
    let store = Arc::new(MemoryStore::new());
    seed(&store);
    let runtime = Arc::new(CountingRuntime::default());
    let orchestrator = ProvisioningOrchestrator::new(
        store.clone(),
        runtime.clone(),
        ShipperDispatcher::new(Arc::new(LogShipper), Some(1)),
        FailurePolicy::FailFast,
    );

    let report = orchestrator.handle(br#"{"id":"req-1"}"#).await.unwrap();
    assert_eq!(report.outcome, RunOutcome::Shipped);
    assert_eq!(report.shipper_arguments.as_deref(), Some(" -c web -c api"));
    assert_eq!(*runtime.created.lock().unwrap(), vec!["web", "api"]);

    let fetched: Vec<Collection> = store.fetch_log().into_iter().map(|(c, _)| c).collect();
    assert_eq!(
        fetched,
        vec![
            Collection::Requests,
            Collection::Nodes,
            Collection::Assemblies,
            Collection::PredefClouds,
            Collection::PredefClouds,
        ]
    );
}

#[tokio::test]
async fn test_handler_reports_failures() {
    let store = Arc::new(MemoryStore::new());
    let runtime = Arc::new(CountingRuntime::default());
    let orchestrator = ProvisioningOrchestrator::new(
        store,
        runtime.clone(),
        ShipperDispatcher::new(Arc::new(LogShipper), None),
        FailurePolicy::FailFast,
    );
    let handler: Arc<dyn MessageHandler> = Arc::new(orchestrator);

    assert!(matches!(
        handler.handle_message("/provisiond/queue/1", b"not json").await,
        Err(AgentError::Decode(_))
    ));
    assert!(matches!(
        handler
            .handle_message("/provisiond/queue/2", br#"{"id":"req-missing"}"#)
            .await,
        Err(AgentError::NotFound { .. })
    ));
    assert!(runtime.created.lock().unwrap().is_empty());
}

#[test]
fn test_orchestrator_from_config() {
    let config = Config::from_yaml(
        r#"
---
etcd:
  host: ["http://127.0.0.1:2379"]
shipper:
  command: /bin/true
"#,
    )
    .unwrap();
    // building never connects; the store and runtime are lazy
    let _orchestrator = ProvisioningOrchestrator::from_config(&config);
}
