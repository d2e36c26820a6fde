use async_trait::async_trait;
use etcd_client::Client;
use tokio::sync::Mutex;

use crate::{
    config::{
        etcd::{create_client, join_key},
        Etcd,
    },
    core::{AgentError, AgentResult, Collection, KvStore},
};

/// etcd-backed record store.
///
/// The client is created on first use and dropped after any failed call so
/// the next fetch reconnects.
pub struct EtcdStore {
    config: Etcd,
    client: Mutex<Option<Client>>,
}

impl EtcdStore {
    pub fn new(config: Etcd) -> Self {
        Self {
            config,
            client: Mutex::new(None),
        }
    }

    pub fn key(&self, collection: Collection, id: &str) -> String {
        join_key(&self.config.prefix, &[collection.as_str(), id])
    }
}

#[async_trait]
impl KvStore for EtcdStore {
    async fn fetch(&self, collection: Collection, id: &str) -> AgentResult<Vec<u8>> {
        let key = self.key(collection, id);
        let mut client_guard = self.client.lock().await;

        if client_guard.is_none() {
            *client_guard = Some(create_client(&self.config).await?);
        }
        let client = client_guard
            .as_mut()
            .ok_or_else(|| AgentError::Store("Etcd client is not initialized".to_string()))?;

        let result = client.get(key.as_str(), None).await;
        let response = match result {
            Ok(response) => response,
            Err(err) => {
                log::error!("Fetching {key} failed: {err}");
                *client_guard = None;
                return Err(AgentError::Store(format!("get {key}: {err}")));
            }
        };

        response
            .kvs()
            .first()
            .map(|kv| kv.value().to_vec())
            .ok_or_else(|| AgentError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })
    }
}
