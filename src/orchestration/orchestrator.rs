use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, error, info, warn};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    config::{Config, FailurePolicy},
    core::{
        normalize, AgentError, AgentResult, ContainerRuntime, ErrorContext, KvStore,
        RequestLifecycleToken,
    },
    metrics,
    model::Assembly,
    queue::MessageHandler,
    resolver::GraphResolver,
    runtime::{ContainerProvisioner, CreatedContainer, DockerRuntime},
    shipper::ShipperDispatcher,
    store::EtcdStore,
};

/// Prefix written before every provisioned component name in the shipper
/// arguments.
pub const SHIPPER_ARGUMENT_FLAG: &str = " -c ";

/// Inbound queue message
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Message {
    pub id: String,
}

pub fn decode_message(bytes: &[u8]) -> AgentResult<Message> {
    let message: Message = serde_json::from_slice(bytes).decode_context("queue message")?;
    if message.id.is_empty() {
        return Err(AgentError::Decode("queue message: empty id".to_string()));
    }
    Ok(message)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Containers were provisioned and the hand-off was dispatched
    Shipped,
    /// The node indexes no resolvable assembly
    NothingToShip,
    /// Valid token without provisioning behavior
    Skipped(RequestLifecycleToken),
}

impl RunOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            RunOutcome::Shipped => "shipped",
            RunOutcome::NothingToShip => "nothing_to_ship",
            RunOutcome::Skipped(_) => "skipped",
        }
    }
}

/// A component the `continue` policy stepped over
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentFailure {
    pub assembly_id: String,
    pub component: String,
    pub cause: String,
}

/// What one run did
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub request_id: String,
    pub token: RequestLifecycleToken,
    pub provisioned: Vec<CreatedContainer>,
    pub failures: Vec<ComponentFailure>,
    pub shipper_arguments: Option<String>,
    pub outcome: RunOutcome,
}

impl RunReport {
    fn new(run_id: Uuid, request_id: &str, token: RequestLifecycleToken) -> Self {
        Self {
            run_id,
            request_id: request_id.to_string(),
            token,
            provisioned: Vec::new(),
            failures: Vec::new(),
            shipper_arguments: None,
            outcome: RunOutcome::NothingToShip,
        }
    }
}

/// Drives one message through decode, resolve, provision and hand-off.
///
/// A run is strictly sequential. Under [`FailurePolicy::FailFast`] the first
/// container that cannot be created ends the run: later components are not
/// attempted, containers already created stay in place, and nothing is
/// shipped.
pub struct ProvisioningOrchestrator {
    resolver: GraphResolver,
    provisioner: ContainerProvisioner,
    dispatcher: ShipperDispatcher,
    policy: FailurePolicy,
}

impl ProvisioningOrchestrator {
    pub fn new(
        store: Arc<dyn KvStore>,
        runtime: Arc<dyn ContainerRuntime>,
        dispatcher: ShipperDispatcher,
        policy: FailurePolicy,
    ) -> Self {
        Self {
            resolver: GraphResolver::new(store),
            provisioner: ContainerProvisioner::new(runtime),
            dispatcher,
            policy,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Arc::new(EtcdStore::new(config.etcd.clone())),
            Arc::new(DockerRuntime::new(&config.runtime)),
            ShipperDispatcher::from_config(&config.shipper),
            config.provisioning.failure_policy,
        )
    }

    /// Handle one raw message. Every error is terminal for the run and is
    /// returned to the caller after being logged.
    pub async fn handle(&self, bytes: &[u8]) -> AgentResult<RunReport> {
        let run_id = Uuid::new_v4();
        let result = self.run(run_id, bytes).await;

        match &result {
            Ok(report) => {
                metrics::record_message(report.outcome.label());
                info!(
                    "[{run_id}] request {} ({}) finished: {}, {} container(s) created, {} failure(s)",
                    report.request_id,
                    report.token,
                    report.outcome.label(),
                    report.provisioned.len(),
                    report.failures.len()
                );
            }
            Err(err) => {
                metrics::record_message(err.kind());
                error!("[{run_id}] run failed: {err}");
            }
        }
        result
    }

    async fn run(&self, run_id: Uuid, bytes: &[u8]) -> AgentResult<RunReport> {
        let message = decode_message(bytes)?;
        debug!("[{run_id}] resolving request {}", message.id);

        let request = self.resolver.resolve_request(&message.id).await?;
        let token = normalize(&request.req_type)?;
        let mut report = RunReport::new(run_id, &request.id, token);

        if token != RequestLifecycleToken::Create {
            debug!("[{run_id}] no provisioning for {token} requests");
            report.outcome = RunOutcome::Skipped(token);
            return Ok(report);
        }

        let index = self
            .resolver
            .resolve_assembly_index(&request.node_id)
            .await?;

        let mut shipper_arguments = String::new();
        let mut shipped_assembly: Option<Assembly> = None;

        for assembly_id in &index.assemblies {
            let Some(assembly) = self.resolver.resolve_assembly(assembly_id).await? else {
                continue;
            };

            for component in assembly.components() {
                if component.name.is_empty() {
                    debug!("[{run_id}] skipping unnamed component in {}", assembly.id);
                    continue;
                }

                let (requirements, inputs) = self.resolver.resolve_component_details(&component);
                // resolved for its fetch, not consumed yet
                let _cloud = self.resolver.lookup_cloud_for(&requirements).await?;

                if inputs.source.is_empty() {
                    warn!(
                        "[{run_id}] component {} in {} has no image source, skipping",
                        component.name, assembly.id
                    );
                    continue;
                }

                match self
                    .provisioner
                    .create_container(&component.name, &inputs.source)
                    .await
                {
                    Ok(created) => {
                        shipper_arguments.push_str(SHIPPER_ARGUMENT_FLAG);
                        shipper_arguments.push_str(&component.name);
                        report.provisioned.push(created);
                    }
                    Err(err) => match self.policy {
                        FailurePolicy::FailFast => return Err(err),
                        FailurePolicy::Continue => {
                            warn!("[{run_id}] continuing past failed component: {err}");
                            report.failures.push(ComponentFailure {
                                assembly_id: assembly.id.clone(),
                                component: component.name.clone(),
                                cause: err.to_string(),
                            });
                        }
                    },
                }
            }

            shipped_assembly = Some(assembly);
        }

        if let Some(mut assembly) = shipped_assembly {
            assembly.shipper_arguments = shipper_arguments.clone();
            report.shipper_arguments = Some(shipper_arguments);
            report.outcome = RunOutcome::Shipped;
            info!(
                "[{run_id}] dispatching assembly {} to shipper {}",
                assembly.id,
                self.dispatcher.shipper_name()
            );
            self.dispatcher.dispatch(assembly);
        } else {
            info!(
                "[{run_id}] node {} has no assemblies to provision",
                request.node_id
            );
        }

        Ok(report)
    }
}

#[async_trait]
impl MessageHandler for ProvisioningOrchestrator {
    async fn handle_message(&self, key: &str, payload: &[u8]) -> AgentResult<()> {
        debug!("Handling queue message {key}");
        self.handle(payload).await.map(|_| ())
    }
}
