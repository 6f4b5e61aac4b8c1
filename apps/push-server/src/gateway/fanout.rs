//! Broker fan-out: routes `<prefix>:<kind>:<userId>` messages to the
//! connections registered for that user.
//!
//! Push messages carry no data of their own; they only tell a client to pull
//! something. `mobwrite` messages are the exception in that their payload names
//! the one client (by mobwrite id) that should pull.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use komob_common::{ChannelError, PushChannel, PushKind};
use tokio::time;

use super::events::ServerEvent;
use super::registry::SessionStore;
use super::session::Subscriber;

/// First delay before re-subscribing after the broker link drops.
const INITIAL_BACKOFF: Duration = Duration::from_millis(500);

/// Upper bound for the re-subscribe delay.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

pub struct Dispatcher {
    store: Arc<SessionStore>,
    prefix: String,
}

impl Dispatcher {
    pub fn new(store: Arc<SessionStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    /// Pattern covering every push channel.
    pub fn pattern(&self) -> String {
        PushChannel::pattern(&self.prefix)
    }

    /// Route one broker message. Returns how many clients were notified.
    ///
    /// Malformed channel names and unknown kinds are logged and dropped.
    pub fn dispatch(&self, channel: &str, payload: &str) -> usize {
        let target = match PushChannel::parse(&self.prefix, channel) {
            Ok(target) => target,
            Err(ChannelError::UnknownKind(kind)) => {
                tracing::error!(%channel, %kind, "invalid message type");
                return 0;
            }
            Err(e) => {
                tracing::error!(%channel, %payload, error = %e, "invalid message on channel");
                return 0;
            }
        };

        tracing::debug!(kind = %target.kind, user_id = %target.user_id, "received push message");

        self.store
            .recipients_for(&target.user_id)
            .iter()
            .filter(|subscriber| notify(target.kind, subscriber, payload))
            .count()
    }

    /// Subscribe to the push pattern and dispatch until the process exits.
    ///
    /// When a subscription ends, a fresh one is opened from `source` and the
    /// pattern is subscribed again before delivery resumes.
    pub async fn run(self: Arc<Self>, source: Arc<dyn PushSource>) {
        let pattern = self.pattern();
        let mut backoff = INITIAL_BACKOFF;

        loop {
            match source.subscribe(&pattern).await {
                Ok(mut messages) => {
                    backoff = INITIAL_BACKOFF;
                    tracing::info!(%pattern, "subscribed to push channels");

                    while let Some((channel, payload)) = messages.next().await {
                        self.dispatch(&channel, &payload);
                    }
                    tracing::warn!(%pattern, "lost broker subscription");
                }
                Err(e) => {
                    tracing::error!(?e, %pattern, "broker subscribe failed");
                }
            }

            time::sleep(backoff).await;
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }
}

/// `(channel, payload)` pairs from one broker subscription. The stream ends
/// when the subscription is lost.
pub type PushStream = BoxStream<'static, (String, String)>;

/// Opens pattern subscriptions on the message broker.
#[async_trait]
pub trait PushSource: Send + Sync {
    async fn subscribe(&self, pattern: &str) -> redis::RedisResult<PushStream>;
}

/// Redis pub/sub on the collab database.
pub struct RedisPushSource {
    client: redis::Client,
}

impl RedisPushSource {
    /// `client` must carry the collab database in its connection info, so
    /// every fresh connection re-selects it while connecting.
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PushSource for RedisPushSource {
    async fn subscribe(&self, pattern: &str) -> redis::RedisResult<PushStream> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.psubscribe(pattern).await?;

        let messages = pubsub.into_on_message().filter_map(|msg| async move {
            match msg.get_payload::<String>() {
                Ok(payload) => Some((msg.get_channel_name().to_string(), payload)),
                Err(e) => {
                    tracing::warn!(?e, channel = msg.get_channel_name(), "undecodable payload");
                    None
                }
            }
        });
        Ok(messages.boxed())
    }
}

/// Apply the per-kind filter and notify one subscriber.
fn notify(kind: PushKind, subscriber: &Subscriber, payload: &str) -> bool {
    if kind == PushKind::Mobwrite && subscriber.mobwrite_id != payload {
        return false;
    }
    tracing::debug!(
        %kind,
        user_id = %subscriber.user_id,
        connection_id = %subscriber.connection_id(),
        "notifying client"
    );
    subscriber.send(ServerEvent::from(kind))
}
