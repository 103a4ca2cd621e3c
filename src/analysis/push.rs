//! Server push channel
//!
//! While a batch upload is being processed the service emits
//! `video_frame_feedback` events over Socket.IO. This module speaks just
//! enough of the Engine.IO v4 / Socket.IO framing over a WebSocket to keep
//! the connection alive and surface those events as [`FrameFeedback`].

use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::analysis::types::FrameFeedback;

/// Event name carrying per-frame feedback during an upload.
pub const FRAME_FEEDBACK_EVENT: &str = "video_frame_feedback";

const EVENT_BUFFER: usize = 256;

const INITIAL_RECONNECT_DELAY: Duration = Duration::from_millis(500);
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(10);

/// A decoded Engine.IO / Socket.IO text frame
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    /// Engine.IO handshake (`0{...}`)
    Open(String),
    /// Engine.IO close (`1`)
    Close,
    /// Engine.IO heartbeat from the server (`2`)
    Ping,
    /// Engine.IO heartbeat reply (`3`)
    Pong,
    /// Socket.IO namespace connect acknowledged (`40`)
    Connect,
    /// Socket.IO namespace disconnect (`41`)
    Disconnect,
    /// Socket.IO event (`42["name", data]`)
    Event {
        name: String,
        data: serde_json::Value,
    },
    /// Anything else (noop, upgrade, acks, connect errors)
    Other(String),
}

/// Decode one text frame. Returns `None` for empty frames.
pub fn decode_packet(text: &str) -> Option<Packet> {
    let mut chars = text.chars();
    let engine_type = chars.next()?;
    let rest = chars.as_str();

    let packet = match engine_type {
        '0' => Packet::Open(rest.to_string()),
        '1' => Packet::Close,
        '2' => Packet::Ping,
        '3' => Packet::Pong,
        '4' => decode_socket_packet(rest),
        _ => Packet::Other(text.to_string()),
    };
    Some(packet)
}

fn decode_socket_packet(text: &str) -> Packet {
    let mut chars = text.chars();
    let Some(socket_type) = chars.next() else {
        return Packet::Other(text.to_string());
    };
    let rest = chars.as_str();

    match socket_type {
        '0' => Packet::Connect,
        '1' => Packet::Disconnect,
        '2' => {
            // Optional "/namespace," prefix, then an optional numeric ack id
            let rest = match rest.strip_prefix('/') {
                Some(ns) => ns.split_once(',').map(|(_, r)| r).unwrap_or(""),
                None => rest,
            };
            let payload = rest.trim_start_matches(|c: char| c.is_ascii_digit());
            match serde_json::from_str::<Vec<serde_json::Value>>(payload) {
                Ok(mut items) if !items.is_empty() => {
                    let data = if items.len() > 1 {
                        items.remove(1)
                    } else {
                        serde_json::Value::Null
                    };
                    match items.first().and_then(|n| n.as_str()) {
                        Some(name) => Packet::Event {
                            name: name.to_string(),
                            data,
                        },
                        None => Packet::Other(text.to_string()),
                    }
                }
                _ => Packet::Other(text.to_string()),
            }
        }
        _ => Packet::Other(text.to_string()),
    }
}

/// Turn the HTTP base URL of the service into its Socket.IO WebSocket endpoint.
pub fn socket_endpoint(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let ws_base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base.to_string()
    };
    format!("{ws_base}/socket.io/?EIO=4&transport=websocket")
}

/// Connector for the service's push channel
#[derive(Debug, Clone)]
pub struct PushChannel {
    endpoint: String,
    initial_delay: Duration,
    max_delay: Duration,
}

impl PushChannel {
    pub fn new(base_url: &str) -> Self {
        Self {
            endpoint: socket_endpoint(base_url),
            initial_delay: INITIAL_RECONNECT_DELAY,
            max_delay: MAX_RECONNECT_DELAY,
        }
    }

    /// Override the reconnect backoff bounds.
    pub fn with_reconnect_delay(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_delay = initial;
        self.max_delay = max.max(initial);
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Start forwarding frame feedback events.
    ///
    /// The subscription stays connected until it is dropped: failed connects
    /// and dropped connections are retried with exponential backoff.
    pub fn subscribe(&self) -> PushSubscription {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let task = tokio::spawn(supervise(self.clone(), tx));
        PushSubscription::with_task(rx, task)
    }
}

/// How a single connection ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionEnd {
    Dropped,
    SubscriberGone,
}

async fn supervise(channel: PushChannel, events: mpsc::Sender<FrameFeedback>) {
    let mut delay = channel.initial_delay;

    loop {
        match connect_async(channel.endpoint.as_str()).await {
            Ok((stream, _)) => {
                info!("Push channel connected: {}", channel.endpoint);
                delay = channel.initial_delay;
                if run_connection(stream, &events).await == ConnectionEnd::SubscriberGone {
                    break;
                }
                warn!("Push channel dropped; reconnecting in {:?}", delay);
            }
            Err(e) => warn!("Push channel connect failed: {}; retrying in {:?}", e, delay),
        }

        if events.is_closed() {
            break;
        }
        sleep(delay).await;
        delay = (delay * 2).min(channel.max_delay);
    }

    debug!("Push channel supervisor stopped");
}

async fn run_connection(
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    events: &mpsc::Sender<FrameFeedback>,
) -> ConnectionEnd {
    let (mut sink, mut source) = stream.split();
    let mut end = ConnectionEnd::Dropped;

    while let Some(message) = source.next().await {
        let text = match message {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                warn!("Push channel read failed: {}", e);
                break;
            }
        };

        let reply = match decode_packet(&text) {
            Some(Packet::Open(handshake)) => {
                debug!("Engine.IO handshake: {}", handshake);
                Some("40")
            }
            Some(Packet::Ping) => Some("3"),
            Some(Packet::Event { name, data }) if name == FRAME_FEEDBACK_EVENT => {
                match serde_json::from_value::<FrameFeedback>(data) {
                    Ok(feedback) => {
                        if events.send(feedback).await.is_err() {
                            end = ConnectionEnd::SubscriberGone;
                            break;
                        }
                    }
                    Err(e) => warn!("Malformed {} payload: {}", FRAME_FEEDBACK_EVENT, e),
                }
                None
            }
            Some(Packet::Close) | Some(Packet::Disconnect) => break,
            Some(other) => {
                debug!("Ignoring push packet: {:?}", other);
                None
            }
            None => None,
        };

        if let Some(reply) = reply {
            if let Err(e) = sink.send(Message::Text(reply.into())).await {
                warn!("Push channel write failed: {}", e);
                break;
            }
        }
    }

    let _ = sink.close().await;
    info!("Push channel closed");
    end
}

/// Owned subscription to the push channel.
///
/// Dropping it tears down the underlying connection.
pub struct PushSubscription {
    events: mpsc::Receiver<FrameFeedback>,
    task: Option<JoinHandle<()>>,
}

impl PushSubscription {
    /// Wrap an existing event stream, e.g. from another transport.
    pub fn from_receiver(events: mpsc::Receiver<FrameFeedback>) -> Self {
        Self { events, task: None }
    }

    fn with_task(events: mpsc::Receiver<FrameFeedback>, task: JoinHandle<()>) -> Self {
        Self {
            events,
            task: Some(task),
        }
    }

    /// Next pushed feedback, or `None` once the channel is gone.
    pub async fn next(&mut self) -> Option<FrameFeedback> {
        self.events.recv().await
    }
}

impl Drop for PushSubscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_engine_packets() {
        assert_eq!(
            decode_packet(r#"0{"sid":"abc","pingInterval":25000}"#),
            Some(Packet::Open(r#"{"sid":"abc","pingInterval":25000}"#.to_string()))
        );
        assert_eq!(decode_packet("2"), Some(Packet::Ping));
        assert_eq!(decode_packet("1"), Some(Packet::Close));
        assert_eq!(decode_packet(r#"40{"sid":"xyz"}"#), Some(Packet::Connect));
        assert_eq!(decode_packet(""), None);
    }

    #[test]
    fn test_decode_feedback_event() {
        let packet =
            decode_packet(r#"42["video_frame_feedback",{"frame":7,"feedback":["Leaning forward"]}]"#)
                .unwrap();
        assert_eq!(
            packet,
            Packet::Event {
                name: FRAME_FEEDBACK_EVENT.to_string(),
                data: json!({"frame": 7, "feedback": ["Leaning forward"]}),
            }
        );
    }

    #[test]
    fn test_decode_event_with_namespace_and_ack() {
        let packet = decode_packet(r#"42/live,12["video_frame_feedback",{"frame":1,"feedback":[]}]"#)
            .unwrap();
        assert!(matches!(packet, Packet::Event { ref name, .. } if name == FRAME_FEEDBACK_EVENT));

        assert!(matches!(decode_packet("42not-json"), Some(Packet::Other(_))));
    }

    #[test]
    fn test_socket_endpoint() {
        assert_eq!(
            socket_endpoint("http://localhost:5000/"),
            "ws://localhost:5000/socket.io/?EIO=4&transport=websocket"
        );
        assert_eq!(
            socket_endpoint("https://api.example.com"),
            "wss://api.example.com/socket.io/?EIO=4&transport=websocket"
        );
    }

    #[test]
    fn test_reconnect_delay_bounds() {
        let channel = PushChannel::new("http://localhost:5000")
            .with_reconnect_delay(Duration::from_millis(200), Duration::from_millis(50));
        assert_eq!(channel.initial_delay, Duration::from_millis(200));
        assert_eq!(channel.max_delay, Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_subscription_from_receiver() {
        let (tx, rx) = mpsc::channel(4);
        let mut subscription = PushSubscription::from_receiver(rx);

        tx.send(FrameFeedback::new(3, vec![])).await.unwrap();
        drop(tx);

        assert_eq!(subscription.next().await, Some(FrameFeedback::new(3, vec![])));
        assert_eq!(subscription.next().await, None);
    }
}
