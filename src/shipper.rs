//! Hand-off to the downstream deployment step
//!
//! A dispatch launches a detached task and returns immediately. There is no
//! completion signal, no error channel and no cancellation: once dispatched,
//! the orchestrator never hears about the shipment again.

use std::sync::Arc;

use async_trait::async_trait;
use log::{error, info};
use tokio::{process::Command, sync::Semaphore};

use crate::{config, core::Shipper, metrics, model::Assembly};

/// Shipper that only records the hand-off in the log
pub struct LogShipper;

#[async_trait]
impl Shipper for LogShipper {
    fn name(&self) -> &str {
        "log"
    }

    async fn ship(&self, assembly: Assembly) {
        info!(
            "Shipping assembly {} with arguments {:?}",
            assembly.id, assembly.shipper_arguments
        );
    }
}

/// Shipper that runs an external executable with the assembly's shipper
/// arguments, e.g. `shipper -c web -c db`.
pub struct CommandShipper {
    program: String,
}

impl CommandShipper {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn command(&self, assembly: &Assembly) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(assembly.shipper_arguments.split_whitespace())
            .env("PROVISIOND_ASSEMBLY_ID", &assembly.id);
        command
    }
}

#[async_trait]
impl Shipper for CommandShipper {
    fn name(&self) -> &str {
        &self.program
    }

    async fn ship(&self, assembly: Assembly) {
        match self.command(&assembly).status().await {
            Ok(status) if status.success() => {
                info!("Shipper {} finished for assembly {}", self.program, assembly.id)
            }
            Ok(status) => error!(
                "Shipper {} exited with {status} for assembly {}",
                self.program, assembly.id
            ),
            Err(err) => error!(
                "Shipper {} could not be started for assembly {}: {err}",
                self.program, assembly.id
            ),
        }
    }
}

/// Launches shipments as detached tasks.
///
/// With `max_inflight` set, each task waits for a permit before shipping so
/// `dispatch` itself still never blocks.
#[derive(Clone)]
pub struct ShipperDispatcher {
    shipper: Arc<dyn Shipper>,
    limit: Option<Arc<Semaphore>>,
}

impl ShipperDispatcher {
    pub fn new(shipper: Arc<dyn Shipper>, max_inflight: Option<usize>) -> Self {
        Self {
            shipper,
            limit: max_inflight.map(|n| Arc::new(Semaphore::new(n))),
        }
    }

    pub fn from_config(config: &config::Shipper) -> Self {
        let shipper: Arc<dyn Shipper> = match &config.command {
            Some(program) => Arc::new(CommandShipper::new(program.clone())),
            None => Arc::new(LogShipper),
        };
        Self::new(shipper, config.max_inflight)
    }

    pub fn shipper_name(&self) -> &str {
        self.shipper.name()
    }

    pub fn dispatch(&self, assembly: Assembly) {
        let shipper = self.shipper.clone();
        let limit = self.limit.clone();
        metrics::record_shipment();

        tokio::spawn(async move {
            let _permit = match limit {
                Some(semaphore) => match semaphore.acquire_owned().await {
                    Ok(permit) => Some(permit),
                    Err(_) => return,
                },
                None => None,
            };
            shipper.ship(assembly).await;
        });
    }
}
