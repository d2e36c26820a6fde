//! Queue-triggered provisioning agent.
//!
//! A message names a request; the request is resolved through the node's
//! assemblies down to individual components, one container is created per
//! component, and the assembly is handed off to the shipper.

pub mod config;
pub mod core;
pub mod logging;
pub mod metrics;
pub mod model;
pub mod orchestration;
pub mod queue;
pub mod repository;
pub mod resolver;
pub mod runtime;
pub mod shipper;
pub mod store;
