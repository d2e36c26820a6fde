//! Key-value store access
//!
//! Records live under `<prefix>/<collection>/<id>` as JSON documents.

pub mod etcd;
pub mod memory;

use serde::de::DeserializeOwned;

use crate::core::{AgentError, AgentResult, Collection};

pub use etcd::EtcdStore;
pub use memory::MemoryStore;

/// Decode a top-level record. A malformed document is a store failure.
pub fn decode_record<T: DeserializeOwned>(
    collection: Collection,
    id: &str,
    bytes: &[u8],
) -> AgentResult<T> {
    serde_json::from_slice(bytes)
        .map_err(|e| AgentError::Store(format!("malformed record {collection}/{id}: {e}")))
}
