//! etcd-backed job queue
//!
//! Every key under the queue prefix is one pending message. The subscriber
//! drains what is already there, oldest first, then watches for new puts.
//! A message is acknowledged by deleting its key once its handler returned,
//! whatever the outcome. Runs are never retried: when the acknowledgement
//! itself fails, the next delivery of the same message only retries the
//! delete.

use std::sync::{
    atomic::{AtomicI64, Ordering},
    Arc,
};

use async_trait::async_trait;
use dashmap::DashMap;
use etcd_client::{
    Client, EventType, GetOptions, KeyValue, SortOrder, SortTarget, WatchOptions, WatchStream,
    Watcher,
};
use pingora_core::services::background::BackgroundService;
use tokio::{
    sync::Mutex,
    time::{sleep, Duration},
};

use crate::{
    config::{etcd::create_client, Etcd, Queue},
    core::{AgentError, AgentResult},
};

/// Receives raw queue payloads
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle_message(&self, key: &str, payload: &[u8]) -> AgentResult<()>;
}

/// One message read from the queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedMessage {
    pub key: String,
    pub create_revision: i64,
    pub mod_revision: i64,
    pub payload: Vec<u8>,
}

impl From<&KeyValue> for QueuedMessage {
    fn from(kv: &KeyValue) -> Self {
        Self {
            key: String::from_utf8_lossy(kv.key()).into_owned(),
            create_revision: kv.create_revision(),
            mod_revision: kv.mod_revision(),
            payload: kv.value().to_vec(),
        }
    }
}

/// Where queued messages are listed from and acknowledged to
#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Messages currently queued and the store revision they were read at
    async fn pending(&self) -> AgentResult<(i64, Vec<QueuedMessage>)>;

    /// Remove a handled message from the queue
    async fn acknowledge(&self, key: &str) -> AgentResult<()>;
}

/// Delivery and acknowledgement bookkeeping, independent of how messages
/// arrive.
pub struct QueueConsumer {
    backend: Arc<dyn QueueBackend>,
    handler: Arc<dyn MessageHandler>,
    revision: AtomicI64,
    // handled, not yet deleted: key -> mod revision
    unacknowledged: DashMap<String, i64>,
}

impl QueueConsumer {
    pub fn new(backend: Arc<dyn QueueBackend>, handler: Arc<dyn MessageHandler>) -> Self {
        Self {
            backend,
            handler,
            revision: AtomicI64::new(0),
            unacknowledged: DashMap::new(),
        }
    }

    /// First revision a watch must start from to miss nothing
    pub fn resume_revision(&self) -> i64 {
        self.revision.load(Ordering::SeqCst) + 1
    }

    /// Deliver every pending message, oldest first. Returns how many were
    /// delivered.
    pub async fn drain(&self) -> AgentResult<usize> {
        let (revision, mut messages) = self.backend.pending().await?;
        messages.sort_by_key(|message| message.create_revision);
        self.revision.fetch_max(revision, Ordering::SeqCst);

        log::info!("Draining {} queued message(s)", messages.len());
        for message in &messages {
            self.deliver(message).await?;
        }
        Ok(messages.len())
    }

    /// Hand one message to the handler, then acknowledge it
    pub async fn deliver(&self, message: &QueuedMessage) -> AgentResult<()> {
        let handled = self
            .unacknowledged
            .get(&message.key)
            .is_some_and(|revision| *revision == message.mod_revision);

        if handled {
            log::info!(
                "Message {} was already handled, retrying acknowledgement",
                message.key
            );
        } else {
            match self
                .handler
                .handle_message(&message.key, &message.payload)
                .await
            {
                Ok(()) => log::debug!("Message {} handled", message.key),
                Err(err) => log::warn!(
                    "Message {} ended with a {} error, acknowledging without retry",
                    message.key,
                    err.kind()
                ),
            }
            self.unacknowledged
                .insert(message.key.clone(), message.mod_revision);
        }

        self.backend.acknowledge(&message.key).await?;
        self.unacknowledged.remove(&message.key);
        self.revision
            .fetch_max(message.mod_revision, Ordering::SeqCst);
        Ok(())
    }
}

/// Queue backend on an etcd key prefix
pub struct EtcdQueue {
    etcd: Etcd,
    prefix: String,
    client: Mutex<Option<Client>>,
}

impl EtcdQueue {
    pub fn new(etcd: Etcd, queue: &Queue) -> Self {
        Self {
            etcd,
            prefix: queue.prefix.clone(),
            client: Mutex::new(None),
        }
    }

    /// Make sure an etcd client exists, otherwise create one
    async fn ensure_client(&self) -> AgentResult<()> {
        let mut client_guard = self.client.lock().await;

        if client_guard.is_none() {
            log::info!("Creating new etcd client for queue...");
            *client_guard = Some(create_client(&self.etcd).await?);
        }
        Ok(())
    }

    async fn reset_client(&self) {
        *self.client.lock().await = None;
    }

    async fn watch(&self, start_revision: i64) -> AgentResult<(Watcher, WatchStream)> {
        let options = WatchOptions::new()
            .with_start_revision(start_revision)
            .with_prefix();

        let mut client_guard = self.client.lock().await;
        let client = client_guard.as_mut().ok_or_else(not_connected)?;
        Ok(client.watch(self.prefix.as_bytes(), Some(options)).await?)
    }
}

fn not_connected() -> AgentError {
    AgentError::Store("etcd client is not initialized".to_string())
}

#[async_trait]
impl QueueBackend for EtcdQueue {
    async fn pending(&self) -> AgentResult<(i64, Vec<QueuedMessage>)> {
        let options = GetOptions::new()
            .with_prefix()
            .with_sort(SortTarget::Create, SortOrder::Ascend);

        let response = {
            let mut client_guard = self.client.lock().await;
            let client = client_guard.as_mut().ok_or_else(not_connected)?;
            client.get(self.prefix.as_bytes(), Some(options)).await?
        };

        let revision = response
            .header()
            .map(|header| header.revision())
            .ok_or_else(|| AgentError::Store("etcd response without header".to_string()))?;
        let messages = response.kvs().iter().map(QueuedMessage::from).collect();
        Ok((revision, messages))
    }

    async fn acknowledge(&self, key: &str) -> AgentResult<()> {
        let mut client_guard = self.client.lock().await;
        let client = client_guard.as_mut().ok_or_else(not_connected)?;
        client.delete(key, None).await?;
        Ok(())
    }
}

pub struct QueueSubscriber {
    queue: Arc<EtcdQueue>,
    consumer: QueueConsumer,
}

impl QueueSubscriber {
    pub fn new(etcd: Etcd, queue: &Queue, handler: Arc<dyn MessageHandler>) -> Self {
        let backend = Arc::new(EtcdQueue::new(etcd, queue));
        Self {
            consumer: QueueConsumer::new(backend.clone(), handler),
            queue: backend,
        }
    }

    /// Deliver puts under the queue prefix until the watch ends
    async fn watch(&self) -> AgentResult<()> {
        let (_watcher, mut stream) = self.queue.watch(self.consumer.resume_revision()).await?;

        while let Some(response) = stream.message().await? {
            if response.canceled() {
                break;
            }

            for event in response.events() {
                // deletes are our own acknowledgements
                if event.event_type() != EventType::Put {
                    continue;
                }
                if let Some(kv) = event.kv() {
                    self.consumer.deliver(&QueuedMessage::from(kv)).await?;
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl BackgroundService for QueueSubscriber {
    async fn start(&self, shutdown: pingora_core::server::ShutdownWatch) -> () {
        loop {
            if *shutdown.borrow() {
                return;
            }

            if let Err(err) = self.queue.ensure_client().await {
                log::error!("Failed to create etcd client: {err}");
                sleep(Duration::from_secs(3)).await;
                continue;
            }

            log::info!("Draining queue {}...", self.queue.prefix);
            if let Err(err) = self.consumer.drain().await {
                log::error!("Queue drain failed: {err}");
                self.queue.reset_client().await;
                sleep(Duration::from_secs(3)).await;
                continue;
            }

            log::info!("Watching queue {}...", self.queue.prefix);
            if let Err(err) = self.watch().await {
                log::error!("Queue watch failed: {err}");
                self.queue.reset_client().await;
                sleep(Duration::from_secs(1)).await;
            }
        }
    }
}
