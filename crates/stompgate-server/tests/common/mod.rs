//! Common test utilities for end-to-end tests
//!
//! Starts the server on an ephemeral port and speaks STOMP to it over a real
//! WebSocket.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::json;
use stompgate_auth::{AuthConfig, Frame, StompCommand};
use stompgate_server::{AppState, DEFAULT_WS_PATH, router, serve};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

pub const TRUSTED_ISSUER: &str = "https://trusted.example";
pub const CLIENT_ID: &str = "notification-client";
pub const CLIENT_SECRET: &str = "notification-secret";

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Token from `issuer` for audience `aud`
pub fn token_for(issuer: &str, aud: &str) -> String {
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &json!({
            "iss": issuer,
            "aud": aud,
            "email": format!("{}@example.com", aud),
            "name": format!("{}-name", aud),
            "surname": format!("{}-surname", aud),
        }),
        &EncodingKey::from_secret(b"test-signing-key"),
    )
    .expect("Failed to mint token")
}

/// Start a server trusting [`TRUSTED_ISSUER`]
pub async fn start_server() -> SocketAddr {
    start_server_with(AuthConfig::new(TRUSTED_ISSUER, CLIENT_ID, CLIENT_SECRET)).await
}

pub async fn start_server_with(config: AuthConfig) -> SocketAddr {
    start_server_with_state(config).await.0
}

/// Start a server and keep a handle on its shared state
pub async fn start_server_with_state(config: AuthConfig) -> (SocketAddr, AppState) {
    let state = AppState::from_config(&config).expect("Failed to build state");
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().expect("No local address");

    tokio::spawn(serve(
        listener,
        router(state.clone(), DEFAULT_WS_PATH),
        std::future::pending(),
    ));
    (addr, state)
}

/// Wait until `condition` holds, polling every 10 ms
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(RECV_TIMEOUT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("Condition never held");
}

/// Minimal STOMP client
pub struct StompClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl StompClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        let (ws, _) = connect_async(format!("ws://{}{}", addr, DEFAULT_WS_PATH))
            .await
            .expect("WebSocket handshake failed");
        Self { ws }
    }

    /// Open a socket and send CONNECT with `token`
    pub async fn login(addr: SocketAddr, token: &str) -> (Self, Option<Frame>) {
        let mut client = Self::connect(addr).await;
        client
            .send(
                &Frame::new(StompCommand::Connect)
                    .with_header("accept-version", "1.2")
                    .with_header("host", "localhost")
                    .with_header("token", token),
            )
            .await;
        let reply = client.recv().await;
        (client, reply)
    }

    pub async fn send(&mut self, frame: &Frame) {
        let text = String::from_utf8(frame.to_bytes()).expect("Frame is not UTF-8");
        self.send_raw(&text).await;
    }

    pub async fn send_raw(&mut self, text: &str) {
        self.ws
            .send(Message::text(text.to_string()))
            .await
            .expect("Failed to send");
    }

    /// Next STOMP frame, or `None` once the server has closed the socket
    pub async fn recv(&mut self) -> Option<Frame> {
        self.recv_within(RECV_TIMEOUT)
            .await
            .expect("Timed out waiting for a frame")
    }

    /// Like [`recv`](Self::recv), returning `Err` if nothing arrives in `timeout`
    pub async fn recv_within(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<Frame>, tokio::time::error::Elapsed> {
        tokio::time::timeout(timeout, async {
            while let Some(message) = self.ws.next().await {
                match message {
                    Ok(Message::Text(text)) => {
                        let parsed = Frame::parse(text.as_str().as_bytes());
                        if let Some(frame) = parsed.expect("Bad frame") {
                            return Some(frame);
                        }
                    }
                    Ok(Message::Binary(data)) => {
                        if let Some(frame) = Frame::parse(&data).expect("Bad frame") {
                            return Some(frame);
                        }
                    }
                    Ok(Message::Close(_)) | Err(_) => return None,
                    Ok(_) => {}
                }
            }
            None
        })
        .await
    }
}

pub fn subscribe(id: &str, destination: &str) -> Frame {
    Frame::new(StompCommand::Subscribe)
        .with_header("id", id)
        .with_header("destination", destination)
        .with_header("receipt", format!("sub-{}", id))
}

pub fn unsubscribe(id: &str) -> Frame {
    Frame::new(StompCommand::Unsubscribe)
        .with_header("id", id)
        .with_header("receipt", format!("unsub-{}", id))
}

pub fn send(destination: &str, body: &'static str) -> Frame {
    Frame::new(StompCommand::Send)
        .with_header("destination", destination)
        .with_header("content-type", "text/plain")
        .with_body(body)
}

/// Assert `frame` is the bare Forbidden ERROR frame
pub fn assert_forbidden(frame: Option<Frame>) {
    let frame = frame.expect("Expected an ERROR frame");
    assert_eq!(frame.command(), StompCommand::Error);
    assert_eq!(frame.first_header("message"), Some("Forbidden"));
    assert!(frame.body().is_empty());
}
