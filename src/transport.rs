//! In-process request/reply queues.
//!
//! Each service consumes one named queue. A caller sends a command plus a JSON
//! payload and awaits exactly one reply, bounded by the client's timeout. The
//! consumer acknowledges every delivery once, on receipt, whatever the outcome
//! of processing turns out to be.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::error::{CatalogError, ErrorKind};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("no reply from {queue} to {cmd} within {after:?}")]
    Timeout { queue: String, cmd: String, after: Duration },

    #[error("queue {queue} is closed")]
    Closed { queue: String },

    #[error("{queue} dropped {cmd} without replying")]
    Dropped { queue: String, cmd: String },

    #[error("{queue} rejected {cmd}: {message}")]
    Rejected { queue: String, cmd: String, message: String },

    #[error("malformed message: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Reply envelope carried back across the queue.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Reply {
    Ok { data: Value },
    NotFound,
    Conflict { message: String },
    Error { kind: ErrorKind, message: String },
}

impl Reply {
    pub fn ok<T: Serialize>(data: &T) -> Self {
        match serde_json::to_value(data) {
            Ok(data) => Reply::Ok { data },
            Err(err) => CatalogError::from(err).into(),
        }
    }

    pub fn from_result<T: Serialize>(result: Result<T, CatalogError>) -> Self {
        match result {
            Ok(data) => Reply::ok(&data),
            Err(err) => err.into(),
        }
    }

    /// `None` becomes `not_found`.
    pub fn from_found<T: Serialize>(result: Result<Option<T>, CatalogError>) -> Self {
        match result {
            Ok(Some(data)) => Reply::ok(&data),
            Ok(None) => Reply::NotFound,
            Err(err) => err.into(),
        }
    }
}

impl From<CatalogError> for Reply {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::NotFound(_) => Reply::NotFound,
            CatalogError::Conflict(what) => {
                Reply::Conflict { message: format!("{what} already exists") }
            },
            other => Reply::Error { kind: other.kind(), message: other.to_string() },
        }
    }
}

/// A message waiting on a queue.
#[derive(Debug)]
struct Envelope {
    cmd: String,
    payload: Value,
    reply_to: oneshot::Sender<Value>,
}

#[derive(Debug, Default)]
struct QueueStats {
    delivered: AtomicU64,
    acked: AtomicU64,
}

pub fn queue(name: impl Into<String>, capacity: usize) -> (RpcClient, Consumer) {
    let name = name.into();
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let stats = Arc::new(QueueStats::default());
    let client = RpcClient { queue: name.clone(), sender: tx, timeout: Duration::from_secs(5) };
    let consumer = Consumer { queue: name, receiver: rx, stats };
    (client, consumer)
}

#[derive(Clone, Debug)]
pub struct RpcClient {
    queue: String,
    sender: mpsc::Sender<Envelope>,
    timeout: Duration,
}

impl RpcClient {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Sends one message and waits for its single reply.
    pub async fn send<T: Serialize + ?Sized>(
        &self,
        cmd: &str,
        payload: &T,
    ) -> Result<Value, TransportError> {
        let payload = serde_json::to_value(payload)?;
        let (reply_to, reply) = oneshot::channel();
        let envelope = Envelope { cmd: cmd.to_string(), payload, reply_to };

        let exchange = async {
            self.sender
                .send(envelope)
                .await
                .map_err(|_| TransportError::Closed { queue: self.queue.clone() })?;
            reply.await.map_err(|_| TransportError::Dropped {
                queue: self.queue.clone(),
                cmd: cmd.to_string(),
            })
        };

        match tokio::time::timeout(self.timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout {
                queue: self.queue.clone(),
                cmd: cmd.to_string(),
                after: self.timeout,
            }),
        }
    }

    /// Like [`RpcClient::send`], decoding the reply envelope.
    pub async fn call<T: Serialize + ?Sized>(
        &self,
        cmd: &str,
        payload: &T,
    ) -> Result<Reply, TransportError> {
        let value = self.send(cmd, payload).await?;
        Ok(serde_json::from_value(value)?)
    }
}

#[derive(Debug)]
pub struct Consumer {
    queue: String,
    receiver: mpsc::Receiver<Envelope>,
    stats: Arc<QueueStats>,
}

impl Consumer {
    pub async fn recv(&mut self) -> Option<Inbound> {
        let envelope = self.receiver.recv().await?;
        let tag = self.stats.delivered.fetch_add(1, Ordering::SeqCst) + 1;
        Some(Inbound {
            cmd: envelope.cmd,
            payload: envelope.payload,
            delivery: Delivery { tag, stats: self.stats.clone() },
            responder: Responder { reply_to: envelope.reply_to },
        })
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub fn stats(&self) -> DeliveryStats {
        DeliveryStats { stats: self.stats.clone() }
    }
}

/// Read-only view of a queue's delivery counters.
#[derive(Clone, Debug)]
pub struct DeliveryStats {
    stats: Arc<QueueStats>,
}

impl DeliveryStats {
    pub fn delivered(&self) -> u64 {
        self.stats.delivered.load(Ordering::SeqCst)
    }

    pub fn acked(&self) -> u64 {
        self.stats.acked.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct Inbound {
    pub cmd: String,
    pub payload: Value,
    pub delivery: Delivery,
    pub responder: Responder,
}

/// Must be acknowledged exactly once; `ack` consumes it.
#[derive(Debug)]
#[must_use = "every delivery has to be acknowledged"]
pub struct Delivery {
    tag: u64,
    stats: Arc<QueueStats>,
}

impl Delivery {
    pub fn tag(&self) -> u64 {
        self.tag
    }

    pub fn ack(self) {
        self.stats.acked.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug)]
pub struct Responder {
    reply_to: oneshot::Sender<Value>,
}

impl Responder {
    pub fn reply(self, reply: Reply) {
        let value = match serde_json::to_value(&reply) {
            Ok(value) => value,
            Err(err) => {
                warn!(error = %err, "failed to encode reply");
                return;
            },
        };
        // The caller may have timed out and gone away.
        let _ = self.reply_to.send(value);
    }
}

/// A service reachable through a queue.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn handle(&self, cmd: &str, payload: Value) -> Reply;
}

/// Drains `consumer` until every client is gone, acking each delivery on
/// receipt and processing it on its own task.
pub async fn serve<H: Handler>(mut consumer: Consumer, handler: Arc<H>) {
    debug!(queue = %consumer.queue(), "consumer started");

    while let Some(inbound) = consumer.recv().await {
        let Inbound { cmd, payload, delivery, responder } = inbound;
        let tag = delivery.tag();
        delivery.ack();

        let handler = handler.clone();
        let queue = consumer.queue().to_string();
        tokio::spawn(async move {
            debug!(queue = %queue, cmd = %cmd, tag, "handling message");
            let reply = handler.handle(&cmd, payload).await;
            if let Reply::Error { kind, message } = &reply {
                warn!(queue = %queue, cmd = %cmd, ?kind, error = %message, "request failed");
            }
            responder.reply(reply);
        });
    }

    let stats = consumer.stats();
    debug!(
        queue = %consumer.queue(),
        delivered = stats.delivered(),
        acked = stats.acked(),
        "consumer stopped"
    );
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    struct Echo;

    #[async_trait]
    impl Handler for Echo {
        async fn handle(&self, cmd: &str, payload: Value) -> Reply {
            match cmd {
                "echo" => Reply::Ok { data: payload },
                "missing" => Reply::NotFound,
                _ => CatalogError::validation(format!("unknown command {cmd}")).into(),
            }
        }
    }

    #[tokio::test]
    async fn request_gets_single_reply() {
        let (client, consumer) = queue("echo_queue", 8);
        tokio::spawn(serve(consumer, Arc::new(Echo)));

        let reply = client.call("echo", &json!({"a": 1})).await.unwrap();
        assert_eq!(reply, Reply::Ok { data: json!({"a": 1}) });

        let reply = client.call("missing", &json!(null)).await.unwrap();
        assert_eq!(reply, Reply::NotFound);
    }

    #[tokio::test]
    async fn every_delivery_is_acked_once_even_on_failure() {
        let (client, consumer) = queue("ack_queue", 8);
        let stats = consumer.stats();
        tokio::spawn(serve(consumer, Arc::new(Echo)));

        client.call("echo", &json!(1)).await.unwrap();
        let reply = client.call("bogus", &json!(2)).await.unwrap();
        assert!(matches!(reply, Reply::Error { kind: ErrorKind::ValidationFailure, .. }));
        client.call("missing", &json!(3)).await.unwrap();

        assert_eq!(stats.delivered(), 3);
        assert_eq!(stats.acked(), 3);
    }

    #[tokio::test]
    async fn unanswered_request_times_out() {
        let (client, _consumer) = queue("silent_queue", 8);
        let client = client.with_timeout(Duration::from_millis(50));

        let err = client.send("echo", &json!(1)).await.unwrap_err();
        assert!(matches!(err, TransportError::Timeout { .. }));
    }

    #[tokio::test]
    async fn closed_queue_is_reported() {
        let (client, consumer) = queue("gone_queue", 8);
        drop(consumer);

        let err = client.send("echo", &json!(1)).await.unwrap_err();
        assert!(matches!(err, TransportError::Closed { .. }));
    }

    #[tokio::test]
    async fn dropped_responder_is_reported() {
        let (client, mut consumer) = queue("drop_queue", 8);
        tokio::spawn(async move {
            let inbound = consumer.recv().await.unwrap();
            inbound.delivery.ack();
            drop(inbound.responder);
        });

        let err = client.send("echo", &json!(1)).await.unwrap_err();
        assert!(matches!(err, TransportError::Dropped { .. }));
    }
}
