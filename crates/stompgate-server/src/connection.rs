//! Per-connection STOMP handling
//!
//! ```text
//! client ──ws──► receive loop ──► interceptor ──► broker / replies
//!                                                    │
//! client ◄─ws── send loop ◄── outbound channel ◄─────┘
//!                    ▲
//!                    └── one forwarder task per subscription
//! ```
//!
//! Each connection owns exactly one [`Session`]. Every inbound frame passes the
//! interceptor before anything else looks at it; a refusal is answered with
//! the `Forbidden` ERROR frame and the connection is closed.

use std::collections::HashMap;
use std::net::SocketAddr;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::{SinkExt, StreamExt, stream::SplitSink, stream::SplitStream};
use stompgate_auth::{Frame, Session, SessionState, StompCommand};
use tokio::sync::{broadcast::error::RecvError, mpsc};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::broker::Published;
use crate::server::AppState;

/// STOMP protocol version spoken by this server
pub const STOMP_VERSION: &str = "1.2";

/// What the receive loop does after a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Close,
}

/// Live subscription of this connection.
///
/// The forwarder owns the broker lease, so aborting it releases the topic.
#[derive(Debug)]
struct Subscription {
    destination: String,
    forwarder: JoinHandle<()>,
}

/// State of one WebSocket connection
struct Connection {
    state: AppState,
    session: Session,
    outbound: mpsc::UnboundedSender<WsMessage>,
    subscriptions: HashMap<String, Subscription>,
}

impl Drop for Connection {
    fn drop(&mut self) {
        for (_, subscription) in self.subscriptions.drain() {
            subscription.forwarder.abort();
        }
    }
}

/// Serve one upgraded WebSocket until either side closes it
pub async fn handle_socket(socket: WebSocket, state: AppState, peer: SocketAddr) {
    let (sink, stream) = socket.split();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<WsMessage>();

    let mut connection = Connection {
        state,
        session: Session::new(),
        outbound: outbound_tx,
        subscriptions: HashMap::new(),
    };
    let span = info_span!("connection", session = %connection.session.id(), peer = %peer);

    async move {
        info!("Connection opened");
        let mut send_task = tokio::spawn(send_loop(sink, outbound_rx));

        // Dropping the receive loop cancels any in-flight introspection
        let send_finished = tokio::select! {
            _ = &mut send_task => {
                debug!("WebSocket send loop terminated");
                true
            }
            _ = connection.receive_loop(stream) => {
                debug!("WebSocket receive loop terminated");
                false
            }
        };

        // Releases the outbound sender and aborts forwarders, ending the send loop
        drop(connection);
        if !send_finished {
            let _ = send_task.await;
        }
        info!("Connection closed");
    }
    .instrument(span)
    .await;
}

/// Forward queued messages to the socket; stops after a Close message
async fn send_loop(
    mut sink: SplitSink<WebSocket, WsMessage>,
    mut outbound_rx: mpsc::UnboundedReceiver<WsMessage>,
) {
    while let Some(message) = outbound_rx.recv().await {
        let closing = matches!(message, WsMessage::Close(_));
        if let Err(e) = sink.send(message).await {
            debug!(error = %e, "Failed to send WebSocket message");
            break;
        }
        if closing {
            break;
        }
    }
}

/// Wrap an encoded frame in a WebSocket message
fn to_ws_message(frame: &Frame) -> WsMessage {
    match String::from_utf8(frame.to_bytes()) {
        Ok(text) => WsMessage::Text(text.into()),
        Err(e) => WsMessage::Binary(e.into_bytes().into()),
    }
}

fn error_frame(message: &str) -> Frame {
    Frame::new(StompCommand::Error).with_header("message", message)
}

impl Connection {
    async fn receive_loop(&mut self, mut stream: SplitStream<WebSocket>) {
        while let Some(message) = stream.next().await {
            let flow = match message {
                Ok(WsMessage::Text(text)) => self.handle_bytes(text.as_str().as_bytes()).await,
                Ok(WsMessage::Binary(data)) => self.handle_bytes(&data).await,
                Ok(WsMessage::Ping(data)) => {
                    let _ = self.outbound.send(WsMessage::Pong(data));
                    Flow::Continue
                }
                Ok(WsMessage::Pong(_)) => Flow::Continue,
                Ok(WsMessage::Close(_)) => {
                    debug!("WebSocket connection closed by client");
                    Flow::Close
                }
                Err(e) => {
                    debug!(error = %e, "WebSocket error");
                    Flow::Close
                }
            };

            if flow == Flow::Close {
                let _ = self.outbound.send(WsMessage::Close(None));
                break;
            }
        }
    }

    async fn handle_bytes(&mut self, bytes: &[u8]) -> Flow {
        match Frame::parse(bytes) {
            Ok(Some(frame)) => self.handle_frame(frame).await,
            // Heart-beat
            Ok(None) => Flow::Continue,
            Err(e) => {
                warn!(error = %e, "Malformed frame");
                self.send_frame(&error_frame("Malformed frame"));
                Flow::Close
            }
        }
    }

    async fn handle_frame(&mut self, frame: Frame) -> Flow {
        let frame = match self
            .state
            .interceptor
            .pre_send(frame, &mut self.session)
            .await
        {
            Ok(frame) => frame,
            Err(forbidden) => {
                self.send_frame(&forbidden.into_error_frame());
                return Flow::Close;
            }
        };

        let command = frame.command();
        if !command.is_connect() && self.session.state() != SessionState::Authenticated {
            warn!(command = %command, "Frame before CONNECT");
            self.send_frame(&error_frame("Not connected"));
            return Flow::Close;
        }

        let flow = match command {
            StompCommand::Connect | StompCommand::Stomp => self.on_connected(),
            StompCommand::Subscribe => self.on_subscribe(&frame),
            StompCommand::Unsubscribe => self.on_unsubscribe(&frame),
            StompCommand::Send => self.on_send(&frame),
            StompCommand::Disconnect => {
                self.send_receipt(&frame);
                return Flow::Close;
            }
            StompCommand::Ack
            | StompCommand::Nack
            | StompCommand::Begin
            | StompCommand::Commit
            | StompCommand::Abort => {
                debug!(command = %command, "Ignored on a non-transactional broker");
                Flow::Continue
            }
            StompCommand::Connected
            | StompCommand::Message
            | StompCommand::Receipt
            | StompCommand::Error => {
                warn!(command = %command, "Server frame sent by client");
                self.send_frame(&error_frame("Unexpected frame"));
                Flow::Close
            }
        };

        if flow == Flow::Continue && !command.is_connect() {
            self.send_receipt(&frame);
        }
        flow
    }

    fn on_connected(&mut self) -> Flow {
        let user = self
            .session
            .principal()
            .map(|identity| identity.display_name().to_string())
            .unwrap_or_default();

        let connected = Frame::new(StompCommand::Connected)
            .with_header("version", STOMP_VERSION)
            .with_header("heart-beat", "0,0")
            .with_header("server", concat!("stompgate/", env!("CARGO_PKG_VERSION")))
            .with_header("session", self.session.id().to_string())
            .with_header("user-name", user);
        self.send_frame(&connected);
        Flow::Continue
    }

    fn on_subscribe(&mut self, frame: &Frame) -> Flow {
        let (Some(id), Some(destination)) =
            (frame.first_header("id"), frame.first_header("destination"))
        else {
            self.send_frame(&error_frame("SUBSCRIBE requires id and destination"));
            return Flow::Close;
        };
        if self.subscriptions.contains_key(id) {
            self.send_frame(&error_frame("Duplicate subscription id"));
            return Flow::Close;
        }

        let mut lease = self.state.broker.lease(destination);
        let outbound = self.outbound.clone();
        let subscription_id = id.to_string();
        let forwarder = tokio::spawn(
            async move {
                loop {
                    match lease.recv().await {
                        Ok(published) => {
                            let frame = published.to_message_frame(&subscription_id);
                            if outbound.send(to_ws_message(&frame)).is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "Subscriber lagging, messages dropped");
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            }
            .in_current_span(),
        );

        debug!(id, destination, "Subscribed");
        self.subscriptions.insert(
            id.to_string(),
            Subscription {
                destination: destination.to_string(),
                forwarder,
            },
        );
        Flow::Continue
    }

    fn on_unsubscribe(&mut self, frame: &Frame) -> Flow {
        let Some(id) = frame.first_header("id") else {
            self.send_frame(&error_frame("UNSUBSCRIBE requires id"));
            return Flow::Close;
        };
        match self.subscriptions.remove(id) {
            Some(subscription) => {
                subscription.forwarder.abort();
                debug!(id, destination = %subscription.destination, "Unsubscribed");
            }
            None => debug!(id, "Unsubscribe for unknown id"),
        }
        Flow::Continue
    }

    fn on_send(&mut self, frame: &Frame) -> Flow {
        let destination = match frame.first_header("destination") {
            Some(destination) if destination.starts_with(self.state.topic_prefix.as_str()) => {
                destination
            }
            _ => {
                self.send_frame(&error_frame("Unsupported destination"));
                return Flow::Close;
            }
        };

        self.state.broker.publish(Published {
            destination: destination.to_string(),
            content_type: frame.first_header("content-type").map(str::to_string),
            body: frame.body().clone(),
        });
        Flow::Continue
    }

    fn send_receipt(&self, frame: &Frame) {
        if let Some(receipt) = frame.first_header("receipt") {
            self.send_frame(&Frame::new(StompCommand::Receipt).with_header("receipt-id", receipt));
        }
    }

    fn send_frame(&self, frame: &Frame) {
        if self.outbound.send(to_ws_message(frame)).is_err() {
            debug!(command = %frame.command(), "Outbound channel closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_frames_stay_text() {
        let frame = Frame::new(StompCommand::Receipt).with_header("receipt-id", "7");
        match to_ws_message(&frame) {
            WsMessage::Text(text) => assert_eq!(text.as_str(), "RECEIPT\nreceipt-id:7\n\n\0"),
            other => panic!("expected text, got {:?}", other),
        }
    }

    #[test]
    fn test_non_utf8_bodies_go_binary() {
        let frame = Frame::new(StompCommand::Message).with_body(vec![0xff, 0xfe]);
        assert!(matches!(to_ws_message(&frame), WsMessage::Binary(_)));
    }
}
