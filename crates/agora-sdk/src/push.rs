//! Server push notifications
//!
//! Other sessions change resources this client shows. A [`PushChannel`]
//! delivers "something changed below this path" events so local state can
//! be re-fetched. [`WebSocketPush`] talks to the server's websocket
//! endpoint; [`LoopbackPush`] is the in-process channel used by tests and
//! offline setups.

use crate::error::{Result, SdkError};
use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

/// Change notification from the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushEvent {
    /// Kind of change, e.g. `modified` or `new_child`
    pub event: String,
    /// Path the change happened at
    pub resource: String,
}

impl PushEvent {
    pub fn new(event: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            resource: resource.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct PushCommand<'a> {
    action: &'a str,
    resource: &'a str,
}

/// Source of server push events
#[async_trait]
pub trait PushChannel: Send + Sync {
    /// Receive events for `path` and everything below it
    async fn subscribe(&self, path: &str) -> Result<PushSubscription>;
}

/// Events for one subscribed path
pub struct PushSubscription {
    path: String,
    events: broadcast::Receiver<PushEvent>,
}

impl PushSubscription {
    fn new(path: &str, events: broadcast::Receiver<PushEvent>) -> Self {
        Self {
            path: path.to_string(),
            events,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Next event at or below the subscribed path; `None` once the channel
    /// is gone. Missed events are reported as a single `lagged` event.
    pub async fn recv(&mut self) -> Option<PushEvent> {
        loop {
            match self.events.recv().await {
                Ok(event) if event.resource.starts_with(&self.path) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    debug!(path = %self.path, missed, "push subscriber lagged");
                    return Some(PushEvent::new("lagged", self.path.clone()));
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// In-process push channel: events are published by the caller
#[derive(Clone)]
pub struct LoopbackPush {
    events: broadcast::Sender<PushEvent>,
    subscriptions: Arc<DashMap<String, usize>>,
}

impl LoopbackPush {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            events,
            subscriptions: Arc::new(DashMap::new()),
        }
    }

    /// Deliver `event` to matching subscribers; returns how many receivers
    /// saw it
    pub fn publish(&self, event: PushEvent) -> usize {
        self.events.send(event).unwrap_or(0)
    }

    /// How often `path` was subscribed
    pub fn subscriptions(&self, path: &str) -> usize {
        self.subscriptions.get(path).map(|n| *n).unwrap_or(0)
    }
}

impl Default for LoopbackPush {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PushChannel for LoopbackPush {
    async fn subscribe(&self, path: &str) -> Result<PushSubscription> {
        *self.subscriptions.entry(path.to_string()).or_insert(0) += 1;
        Ok(PushSubscription::new(path, self.events.subscribe()))
    }
}

/// Push channel over the server's websocket endpoint.
///
/// Sends `{"action":"subscribe","resource":<path>}` per subscribed path and
/// expects `{"event":..,"resource":..}` messages back. Reconnects after a
/// delay and re-sends every subscription on each new connection.
pub struct WebSocketPush {
    events: broadcast::Sender<PushEvent>,
    commands: mpsc::UnboundedSender<String>,
    task: JoinHandle<()>,
}

impl WebSocketPush {
    /// Start the connection task. Must be called inside a tokio runtime.
    pub fn connect(url: impl Into<String>, reconnect_delay: Duration) -> Self {
        let url = url.into();
        let (events, _) = broadcast::channel(1024);
        let (commands, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(url, reconnect_delay, events.clone(), rx));

        Self {
            events,
            commands,
            task,
        }
    }
}

impl Drop for WebSocketPush {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[async_trait]
impl PushChannel for WebSocketPush {
    async fn subscribe(&self, path: &str) -> Result<PushSubscription> {
        let events = self.events.subscribe();
        self.commands
            .send(path.to_string())
            .map_err(|_| SdkError::Push("push connection task has stopped".to_string()))?;
        Ok(PushSubscription::new(path, events))
    }
}

enum Disconnect {
    /// The owning channel was dropped
    Shutdown,
    /// The server or network closed the connection
    Lost,
}

async fn run(
    url: String,
    reconnect_delay: Duration,
    events: broadcast::Sender<PushEvent>,
    mut commands: mpsc::UnboundedReceiver<String>,
) {
    let mut subscribed: Vec<String> = Vec::new();

    loop {
        match connection(&url, &events, &mut commands, &mut subscribed).await {
            Ok(Disconnect::Shutdown) => {
                info!("push channel shutting down");
                return;
            }
            Ok(Disconnect::Lost) => warn!(%url, "push connection lost"),
            Err(e) => warn!(%url, error = %e, "push connection failed"),
        }

        debug!(?reconnect_delay, "reconnecting push channel");
        tokio::select! {
            _ = sleep(reconnect_delay) => {}
            command = commands.recv() => match command {
                Some(path) => subscribed.push(path),
                None => return,
            },
        }
    }
}

async fn connection(
    url: &str,
    events: &broadcast::Sender<PushEvent>,
    commands: &mut mpsc::UnboundedReceiver<String>,
    subscribed: &mut Vec<String>,
) -> Result<Disconnect> {
    let (stream, _) = connect_async(url).await?;
    info!(url, subscriptions = subscribed.len(), "push channel connected");
    let (mut write, mut read) = stream.split();

    for path in subscribed.iter() {
        write.send(subscribe_message(path)?).await?;
    }

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(path) => {
                    if !subscribed.contains(&path) {
                        write.send(subscribe_message(&path)?).await?;
                        subscribed.push(path);
                    }
                }
                None => {
                    let _ = write.close().await;
                    return Ok(Disconnect::Shutdown);
                }
            },
            message = read.next() => match message {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<PushEvent>(&text) {
                    Ok(event) => {
                        debug!(event = %event.event, resource = %event.resource, "push event");
                        let _ = events.send(event);
                    }
                    Err(e) => debug!(error = %e, "ignoring push message"),
                },
                Some(Ok(Message::Ping(payload))) => write.send(Message::Pong(payload)).await?,
                Some(Ok(Message::Close(_))) | None => return Ok(Disconnect::Lost),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
            },
        }
    }
}

fn subscribe_message(path: &str) -> Result<Message> {
    let command = PushCommand {
        action: "subscribe",
        resource: path,
    };
    Ok(Message::Text(serde_json::to_string(&command)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_loopback_filters_by_path() {
        let push = LoopbackPush::new();
        let mut sub = push.subscribe("/rates/").await.unwrap();

        push.publish(PushEvent::new("modified", "/comments/comment_0000000/"));
        push.publish(PushEvent::new("new_child", "/rates/rate_0000000/"));

        let event = sub.recv().await.unwrap();
        assert_eq!(event.resource, "/rates/rate_0000000/");
        assert_eq!(push.subscriptions("/rates/"), 1);
    }

    #[tokio::test]
    async fn test_loopback_closed_when_dropped() {
        let push = LoopbackPush::new();
        let mut sub = push.subscribe("/rates/").await.unwrap();
        drop(push);
        assert!(sub.recv().await.is_none());
    }

    #[test]
    fn test_subscribe_message_shape() {
        let message = subscribe_message("/rates/").unwrap();
        let text = message.into_text().unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value, serde_json::json!({"action": "subscribe", "resource": "/rates/"}));
    }

    #[test]
    fn test_event_parses() {
        let event: PushEvent =
            serde_json::from_str(r#"{"event":"modified","resource":"/rates/rate_0000000/"}"#)
                .unwrap();
        assert_eq!(event, PushEvent::new("modified", "/rates/rate_0000000/"));
    }
}
