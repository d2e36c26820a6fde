//! Provisioning orchestration
//!
//! Entry point of the pipeline: one inbound message in, at most one shipper
//! hand-off out.

pub mod orchestrator;


pub use orchestrator::{
    decode_message, ComponentFailure, Message, ProvisioningOrchestrator, RunOutcome, RunReport,
    SHIPPER_ARGUMENT_FLAG,
};
