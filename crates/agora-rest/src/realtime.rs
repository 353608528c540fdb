//! Realtime change feed over the backend's websocket channel protocol.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::{SinkExt, Stream, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, trace, warn};

use agora_core::Result;
use agora_core::error::{Error, ProtocolError, TransportError};
use agora_core::repo::{ChangeEvent, ChangeKind, Record, Subscription};

use crate::config::RestConfig;

/// The server drops channels that miss heartbeats for 60 seconds.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Reference used for the channel join message.
const JOIN_REF: &str = "1";

/// Realtime change feed for one subscription.
pub struct RestFeed {
    inner: Pin<Box<dyn Stream<Item = Result<ChangeEvent>> + Send>>,
}

/// A message on the channel socket.
#[derive(Debug, Deserialize)]
struct ChannelMessage {
    event: String,
    #[serde(default)]
    payload: Value,
}

/// Payload of a `postgres_changes` message.
#[derive(Debug, Deserialize)]
struct ChangesPayload {
    data: ChangeData,
}

#[derive(Debug, Deserialize)]
struct ChangeData {
    #[serde(rename = "type")]
    kind: String,
    table: String,
    #[serde(default)]
    record: Option<Value>,
    #[serde(default)]
    old_record: Option<Value>,
    #[serde(default)]
    commit_timestamp: Option<String>,
}

enum Step {
    Heartbeat,
    Incoming(Option<std::result::Result<Message, tokio_tungstenite::tungstenite::Error>>),
}

impl RestFeed {
    pub(crate) fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<ChangeEvent>> + Send + 'static,
    {
        Self {
            inner: Box::pin(stream),
        }
    }

    /// Connect and join the channel for a subscription.
    pub async fn connect(config: &RestConfig, subscription: Subscription) -> Result<Self> {
        let ws_url = config.url.realtime_url(&config.api_key);
        info!(url = %config.url, collection = %subscription.collection, "Connecting to realtime");

        let (ws_stream, _) = connect_async(ws_url.as_str()).await.map_err(|e| {
            Error::Transport(TransportError::Connection {
                message: e.to_string(),
            })
        })?;

        let (mut write, mut read) = ws_stream.split();

        let join = join_message(&subscription, config.access_token.as_deref());
        write
            .send(Message::Text(join.to_string().into()))
            .await
            .map_err(|e| {
                Error::Transport(TransportError::Connection {
                    message: e.to_string(),
                })
            })?;

        debug!("Join sent, listening for changes");

        let stream = async_stream::stream! {
            let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
            heartbeat.tick().await;
            let mut next_ref: u64 = 2;

            loop {
                let step = tokio::select! {
                    _ = heartbeat.tick() => Step::Heartbeat,
                    msg = read.next() => Step::Incoming(msg),
                };

                match step {
                    Step::Heartbeat => {
                        let msg = heartbeat_message(next_ref);
                        next_ref += 1;
                        trace!("Sending heartbeat");
                        if let Err(e) = write.send(Message::Text(msg.to_string().into())).await {
                            error!(error = %e, "Failed to send heartbeat");
                            yield Err(Error::Transport(TransportError::Connection {
                                message: e.to_string(),
                            }));
                            break;
                        }
                    }
                    Step::Incoming(Some(Ok(Message::Text(text)))) => {
                        match parse_message(text.as_str(), &subscription) {
                            Ok(Some(event)) => yield Ok(event),
                            Ok(None) => {}
                            Err(e) => {
                                warn!(error = %e, "Channel error");
                                yield Err(e);
                            }
                        }
                    }
                    Step::Incoming(Some(Ok(Message::Ping(data)))) => {
                        trace!("Received ping");
                        if let Err(e) = write.send(Message::Pong(data)).await {
                            warn!(error = %e, "Failed to send pong");
                        }
                    }
                    Step::Incoming(Some(Ok(Message::Close(frame)))) => {
                        info!(?frame, "Realtime socket closed by server");
                        break;
                    }
                    Step::Incoming(Some(Ok(_))) => {}
                    Step::Incoming(Some(Err(e))) => {
                        error!(error = %e, "Realtime socket error");
                        yield Err(Error::Transport(TransportError::Connection {
                            message: e.to_string(),
                        }));
                        break;
                    }
                    Step::Incoming(None) => break,
                }
            }
        };

        Ok(Self::new(stream))
    }
}

impl Stream for RestFeed {
    type Item = Result<ChangeEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

fn topic(subscription: &Subscription) -> String {
    format!("realtime:public:{}", subscription.collection)
}

fn join_message(subscription: &Subscription, access_token: Option<&str>) -> Value {
    let mut change = json!({
        "event": "*",
        "schema": "public",
        "table": subscription.collection.as_str(),
    });
    if let Some(filter) = &subscription.filter {
        change["filter"] = Value::String(filter.to_string());
    }

    let mut payload = json!({
        "config": {
            "broadcast": { "self": false },
            "presence": { "key": "" },
            "postgres_changes": [change],
        }
    });
    if let Some(token) = access_token {
        payload["access_token"] = Value::String(token.to_string());
    }

    json!({
        "topic": topic(subscription),
        "event": "phx_join",
        "payload": payload,
        "ref": JOIN_REF,
        "join_ref": JOIN_REF,
    })
}

fn heartbeat_message(msg_ref: u64) -> Value {
    json!({
        "topic": "phoenix",
        "event": "heartbeat",
        "payload": {},
        "ref": msg_ref.to_string(),
    })
}

/// Parse one text frame. Returns `Ok(None)` for frames that carry no change.
fn parse_message(text: &str, subscription: &Subscription) -> Result<Option<ChangeEvent>> {
    let message: ChannelMessage = serde_json::from_str(text).map_err(|e| {
        ProtocolError::new(200, None, Some(format!("malformed channel message: {}", e)))
    })?;

    match message.event.as_str() {
        "postgres_changes" => {
            let payload: ChangesPayload =
                serde_json::from_value(message.payload).map_err(|e| {
                    ProtocolError::new(200, None, Some(format!("malformed change payload: {}", e)))
                })?;
            let event = change_event(payload.data, subscription)?;
            Ok(event.filter(|e| subscription.matches(e)))
        }
        "phx_reply" => {
            let status = message.payload.get("status").and_then(Value::as_str);
            if status == Some("error") {
                let reason = message
                    .payload
                    .pointer("/response/reason")
                    .and_then(Value::as_str)
                    .unwrap_or("join rejected");
                return Err(ProtocolError::new(
                    400,
                    Some("ChannelJoinRejected".to_string()),
                    Some(reason.to_string()),
                )
                .into());
            }
            Ok(None)
        }
        "phx_error" => Err(ProtocolError::new(
            500,
            Some("ChannelError".to_string()),
            Some("channel crashed on the server".to_string()),
        )
        .into()),
        other => {
            trace!(event = other, "Ignoring channel message");
            Ok(None)
        }
    }
}

fn change_event(data: ChangeData, subscription: &Subscription) -> Result<Option<ChangeEvent>> {
    if data.table != subscription.collection.as_str() {
        return Ok(None);
    }

    let commit_time = data
        .commit_timestamp
        .as_deref()
        .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    let row = |value: Option<Value>| -> Result<Record> {
        Record::new(value.unwrap_or(Value::Null))
    };

    // Updates carry an empty old_record unless the table replicates full rows.
    let old_if_present = |value: Option<Value>| -> Result<Option<Record>> {
        match value {
            Some(Value::Object(map)) if !map.is_empty() => Ok(Some(Record::from_map(map))),
            _ => Ok(None),
        }
    };

    let kind = match data.kind.as_str() {
        "INSERT" => ChangeKind::Insert {
            new: row(data.record)?,
        },
        "UPDATE" => ChangeKind::Update {
            new: row(data.record)?,
            old: old_if_present(data.old_record)?,
        },
        "DELETE" => ChangeKind::Delete {
            old: row(data.old_record)?,
        },
        other => {
            debug!(kind = other, "Ignoring unknown change type");
            return Ok(None);
        }
    };

    Ok(Some(ChangeEvent {
        collection: subscription.collection.clone(),
        commit_time,
        kind,
    }))
}
