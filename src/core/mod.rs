//! Core abstractions for provisiond
//!
//! Error taxonomy, the request lifecycle vocabulary and the traits that
//! decouple the pipeline from its store, runtime and shipper.

pub mod error;
pub mod status;
pub mod traits;

pub use error::{AgentError, AgentResult, ErrorContext};
pub use status::{normalize, RequestLifecycleToken};
pub use traits::*;
