// Copyright (c) 2025 - Cowboy AI, Inc.
//! eventd client built on `async-nats`
//!
//! [`EventdClient`] is a cheaply cloneable handle to a single NATS
//! connection. It is created unconnected from [`EventdOptions`]; publishing
//! or subscribing before [`EventdClient::connect`] succeeds returns
//! [`EventdError::NotConnected`]. Once connected, `async-nats` reconnects on
//! its own with no attempt limit, and the client only observes those
//! transitions through the connection event callback.

use async_nats::connection::State;
use async_nats::{Client, ConnectOptions, Event, Message};
use bytes::Bytes;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock as StdRwLock};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::errors::{EventdError, EventdResult};
use crate::nkey::NkeyAuth;
use crate::options::EventdOptions;

/// Connection name reported to the server
pub const CLIENT_NAME: &str = "eventd publisher";

/// Upper bound on a request-reply round trip
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Callback invoked after the connection to the server is re-established
pub type ReconnectHook = Arc<dyn Fn() + Send + Sync>;

/// Handler for messages delivered on a subscription
#[async_trait::async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    /// Handle one message. Errors are logged, not returned to the publisher.
    async fn handle(&self, message: Message) -> EventdResult<()>;
}

#[async_trait::async_trait]
impl<F, Fut> MessageHandler for F
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = EventdResult<()>> + Send + 'static,
{
    async fn handle(&self, message: Message) -> EventdResult<()> {
        (self)(message).await
    }
}

/// A running subscription and the task dispatching its messages
pub struct Subscription {
    subject: String,
    task: JoinHandle<()>,
}

impl Subscription {
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Stop dispatching. Dropping the subscriber unsubscribes from the server.
    pub fn unsubscribe(self) {
        self.task.abort();
        debug!(subject = %self.subject, "Unsubscribed");
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("subject", &self.subject)
            .field("finished", &self.task.is_finished())
            .finish()
    }
}

/// Receives connection events from `async-nats` and forwards them to logs
/// and the registered reconnect hook.
#[derive(Default)]
pub(crate) struct EventRelay {
    reconnect_hook: StdRwLock<Option<ReconnectHook>>,
    disconnected: AtomicBool,
}

impl EventRelay {
    fn set_reconnect_hook(&self, hook: ReconnectHook) {
        let mut slot = self
            .reconnect_hook
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *slot = Some(hook);
    }

    pub(crate) fn handle(&self, event: Event) {
        match event {
            Event::Connected => {
                if self.disconnected.swap(false, Ordering::SeqCst) {
                    info!("Reconnected to eventd server");
                    let hook = self
                        .reconnect_hook
                        .read()
                        .unwrap_or_else(PoisonError::into_inner)
                        .clone();
                    if let Some(hook) = hook {
                        hook();
                    }
                }
            }
            Event::Disconnected => {
                self.disconnected.store(true, Ordering::SeqCst);
                info!("Disconnected from eventd server");
            }
            Event::SlowConsumer(sid) => {
                warn!(sid, "eventd subscription is falling behind, messages dropped");
            }
            other => {
                warn!(event = %other, "eventd connection error");
            }
        }
    }
}

struct ClientInner {
    options: EventdOptions,
    connection: RwLock<Option<Client>>,
    events: Arc<EventRelay>,
}

/// Client for publishing and subscribing to eventd topics
#[derive(Clone)]
pub struct EventdClient {
    inner: Arc<ClientInner>,
}

impl EventdClient {
    /// Create an unconnected client. Call [`connect`](Self::connect) to dial.
    pub fn new(options: EventdOptions) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                options,
                connection: RwLock::new(None),
                events: Arc::new(EventRelay::default()),
            }),
        }
    }

    pub fn options(&self) -> &EventdOptions {
        &self.inner.options
    }

    /// Whether the options disable eventd entirely
    pub fn is_disabled(&self) -> bool {
        self.inner.options.disabled()
    }

    /// Dial the server once.
    ///
    /// Returns [`EventdError::Connection`] when the server cannot be reached;
    /// retrying is left to the caller. Invalid NKey material fails with
    /// [`EventdError::InvalidNkey`] or [`EventdError::NkeyFile`] before any
    /// dial is attempted.
    #[tracing::instrument(skip(self), fields(server = %self.inner.options))]
    pub async fn connect(&self) -> EventdResult<()> {
        let connect_options = self.connect_options()?;
        let url = self.inner.options.server_url();

        let client = connect_options
            .connect(url.as_str())
            .await
            .map_err(|e| EventdError::Connection(format!("{url}: {e}")))?;

        let server_info = client.server_info();
        info!(
            server_id = %server_info.server_id,
            server_version = %server_info.version,
            "Connected to eventd server"
        );

        *self.inner.connection.write().await = Some(client);
        Ok(())
    }

    /// Build connect options: authentication first, then naming, unlimited
    /// reconnects and the event relay.
    fn connect_options(&self) -> EventdResult<ConnectOptions> {
        let options = &self.inner.options;

        let connect_options = if let Some(seed) = options.nkey() {
            // every connect attempt validates a fresh copy, which `from_seed` wipes
            let mut secret = seed.clone();
            NkeyAuth::from_seed(&mut secret)?.connect_options()
        } else if let Some(path) = options.nkey_file() {
            NkeyAuth::from_seed_file(path)?.connect_options()
        } else {
            ConnectOptions::new()
        };

        let events = Arc::clone(&self.inner.events);
        Ok(connect_options
            .name(CLIENT_NAME)
            .max_reconnects(None::<usize>)
            .event_callback(move |event| {
                let events = Arc::clone(&events);
                async move { events.handle(event) }
            }))
    }

    /// Publish `value` as JSON under `topic`
    pub async fn publish<T>(&self, topic: &str, value: &T) -> EventdResult<()>
    where
        T: Serialize + ?Sized,
    {
        let client = self.connection().await?;
        let payload = encode(value)?;
        let size = payload.len();

        client
            .publish(topic.to_string(), payload)
            .await
            .map_err(|e| EventdError::Publish(e.to_string()))?;

        debug!(subject = topic, bytes = size, "Published event");
        Ok(())
    }

    /// Subscribe `handler` to `topic`.
    ///
    /// Messages are dispatched on a spawned task. Handler errors are logged
    /// at warn level and do not end the subscription.
    pub async fn subscribe<H>(&self, topic: &str, handler: H) -> EventdResult<Subscription>
    where
        H: MessageHandler,
    {
        let client = self.connection().await?;
        let mut subscriber = client
            .subscribe(topic.to_string())
            .await
            .map_err(|e| EventdError::Subscribe(e.to_string()))?;

        let subject = topic.to_string();
        let task_subject = subject.clone();
        let task = tokio::spawn(async move {
            while let Some(message) = subscriber.next().await {
                if let Err(e) = handler.handle(message).await {
                    warn!(subject = %task_subject, error = %e, "eventd subscription handler failed");
                }
            }
            debug!(subject = %task_subject, "Subscription stream ended");
        });

        info!(subject = %subject, "Subscribed");
        Ok(Subscription { subject, task })
    }

    /// Subscribe with a handler that receives each payload decoded from JSON.
    /// Payloads that fail to decode are logged and skipped.
    pub async fn subscribe_json<T, F, Fut>(&self, topic: &str, handler: F) -> EventdResult<Subscription>
    where
        T: DeserializeOwned + Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = EventdResult<()>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        self.subscribe(topic, move |message: Message| {
            let handler = Arc::clone(&handler);
            async move {
                let value: T = serde_json::from_slice(&message.payload)
                    .map_err(|e| EventdError::Deserialization(e.to_string()))?;
                handler(value).await
            }
        })
        .await
    }

    /// Request-reply with JSON on both sides
    pub async fn request<T, R>(&self, topic: &str, request: &T) -> EventdResult<R>
    where
        T: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let client = self.connection().await?;
        let payload = encode(request)?;

        let response = tokio::time::timeout(
            DEFAULT_REQUEST_TIMEOUT,
            client.request(topic.to_string(), payload),
        )
        .await
        .map_err(|_| {
            EventdError::Timeout(format!(
                "request to '{topic}' timed out after {:?}",
                DEFAULT_REQUEST_TIMEOUT
            ))
        })?
        .map_err(|e| EventdError::Request(format!("request to '{topic}' failed: {e}")))?;

        serde_json::from_slice(&response.payload)
            .map_err(|e| EventdError::Deserialization(e.to_string()))
    }

    /// Flush buffered publishes to the server
    pub async fn flush(&self) -> EventdResult<()> {
        let client = self.connection().await?;
        client
            .flush()
            .await
            .map_err(|e| EventdError::Publish(format!("flush failed: {e}")))
    }

    /// Replace the reconnect hook. The last registration wins.
    pub fn on_reconnected<F>(&self, hook: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.events.set_reconnect_hook(Arc::new(hook));
    }

    /// State of the underlying connection, `None` before the first connect
    pub async fn connection_state(&self) -> Option<State> {
        self.inner
            .connection
            .read()
            .await
            .as_ref()
            .map(Client::connection_state)
    }

    /// True while a connection exists and is currently up
    pub async fn is_connected(&self) -> bool {
        matches!(self.connection_state().await, Some(State::Connected))
    }

    /// Drop the connection handle; later publishes fail with `NotConnected`.
    pub async fn disconnect(&self) {
        self.inner.connection.write().await.take();
        info!("eventd client disconnected");
    }

    async fn connection(&self) -> EventdResult<Client> {
        self.inner.connection.read().await.clone().ok_or_else(|| {
            EventdError::NotConnected("connect the eventd client before using it".to_string())
        })
    }
}

impl fmt::Debug for EventdClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventdClient")
            .field("options", &self.inner.options)
            .finish_non_exhaustive()
    }
}

fn encode<T>(value: &T) -> EventdResult<Bytes>
where
    T: Serialize + ?Sized,
{
    Ok(serde_json::to_vec(value)?.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;

    fn counting_hook(relay: &EventRelay) -> Arc<AtomicUsize> {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        relay.set_reconnect_hook(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        calls
    }

    #[test]
    fn test_encode_json_payload() {
        let payload = encode(&serde_json::json!({"type": "UserCreated"})).unwrap();
        assert_eq!(&payload[..], br#"{"type":"UserCreated"}"#);
    }

    #[test]
    fn test_encode_rejects_unserializable_value() {
        let mut value = HashMap::new();
        value.insert((1, 2), "tuple keys are not valid JSON object keys");

        assert!(matches!(encode(&value), Err(EventdError::Serialization(_))));
    }

    #[test]
    fn test_initial_connect_does_not_fire_reconnect_hook() {
        let relay = EventRelay::default();
        let calls = counting_hook(&relay);

        relay.handle(Event::Connected);

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_reconnect_fires_hook_once_per_reconnect() {
        let relay = EventRelay::default();
        let calls = counting_hook(&relay);

        relay.handle(Event::Disconnected);
        relay.handle(Event::Connected);
        relay.handle(Event::Connected);
        relay.handle(Event::Disconnected);
        relay.handle(Event::Connected);

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_last_reconnect_hook_wins() {
        let relay = EventRelay::default();
        let first = counting_hook(&relay);
        let second = counting_hook(&relay);

        relay.handle(Event::Disconnected);
        relay.handle(Event::Connected);

        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_publish_before_connect_fails() {
        let client = EventdClient::new(EventdOptions::default());

        let result = client.publish("orders.created", &serde_json::json!({"id": 1})).await;

        assert!(matches!(result, Err(EventdError::NotConnected(_))));
    }

    #[tokio::test]
    async fn test_subscribe_before_connect_fails() {
        let client = EventdClient::new(EventdOptions::default());

        let result = client
            .subscribe("orders.>", |_message: Message| async { Ok::<(), EventdError>(()) })
            .await;

        assert!(matches!(result, Err(EventdError::NotConnected(_))));
    }

    #[tokio::test]
    async fn test_invalid_nkey_fails_before_dialing() {
        let options = EventdOptions::new("127.0.0.1", 1).with_nkey("SUNOTAREALSEED");
        let client = EventdClient::new(options);

        let result = client.connect().await;

        assert!(matches!(result, Err(EventdError::InvalidNkey(_))));
    }

    #[tokio::test]
    async fn test_configured_seed_survives_failed_attempts() {
        // startup retries call `connect` again, each time from the configured seed
        let seed = nkeys::KeyPair::new_user().seed().unwrap();
        let client = EventdClient::new(EventdOptions::new("127.0.0.1", 1).with_nkey(seed));

        for _ in 0..2 {
            let result = client.connect().await;
            assert!(matches!(result, Err(EventdError::Connection(_))));
        }
        assert!(!client.options().nkey().unwrap().is_wiped());
    }

    #[tokio::test]
    async fn test_unconnected_client_state() {
        let client = EventdClient::new(EventdOptions::default().with_disabled(true));

        assert!(!client.is_connected().await);
        assert!(client.connection_state().await.is_none());
        assert!(client.is_disabled());
        assert!(matches!(client.flush().await, Err(EventdError::NotConnected(_))));
    }
}
