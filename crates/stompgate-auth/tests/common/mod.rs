//! Common test utilities for integration tests
//!
//! Provides token minting and a mock introspection authority.

#![allow(dead_code)]

use std::time::Duration;

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::{Value, json};
use stompgate_auth::credentials::basic_authorization;
use stompgate_auth::{Frame, StompCommand};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_string, header, method, path},
};

pub const TRUSTED_ISSUER: &str = "https://trusted.example";
pub const CLIENT_ID: &str = "notification-client";
pub const CLIENT_SECRET: &str = "notification-secret";
pub const INTROSPECT_PATH: &str = "/oauth2/introspect";

/// Mint a well-formed HS256 token. The key is irrelevant to the code under
/// test, which never checks signatures.
pub fn mint_token(claims: &Value) -> String {
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(b"test-signing-key"),
    )
    .expect("Failed to mint token")
}

/// Token from `issuer` for audience `aud`, with identity claims
pub fn token_for(issuer: &str, aud: &str) -> String {
    mint_token(&json!({
        "iss": issuer,
        "aud": aud,
        "email": format!("{}@example.com", aud),
        "name": format!("{}-name", aud),
        "surname": format!("{}-surname", aud),
    }))
}

pub fn connect_frame(token: &str) -> Frame {
    Frame::new(StompCommand::Connect)
        .with_header("accept-version", "1.2")
        .with_header("host", "localhost")
        .with_header("token", token)
}

pub fn subscribe_frame(id: &str, destination: &str) -> Frame {
    Frame::new(StompCommand::Subscribe)
        .with_header("id", id)
        .with_header("destination", destination)
}

/// Mock introspection authority
pub struct MockAuthority {
    pub server: MockServer,
}

impl MockAuthority {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Issuer URI served by this authority
    pub fn issuer(&self) -> String {
        self.server.uri()
    }

    /// Answer introspection of `token` with `active`, expecting exactly
    /// `calls` requests carrying the interceptor's client credentials.
    pub async fn mock_active(&self, token: &str, active: bool, calls: u64) {
        self.mock_response(
            token,
            ResponseTemplate::new(200).set_body_json(json!({
                "active": active,
                "client_id": CLIENT_ID,
                "token_type": "Bearer",
            })),
            calls,
        )
        .await;
    }

    /// Same as [`mock_active`](Self::mock_active), delaying each answer
    pub async fn mock_active_delayed(&self, token: &str, active: bool, delay: Duration) {
        self.mock_response(
            token,
            ResponseTemplate::new(200)
                .set_body_json(json!({ "active": active }))
                .set_delay(delay),
            1,
        )
        .await;
    }

    pub async fn mock_response(&self, token: &str, response: ResponseTemplate, calls: u64) {
        Mock::given(method("POST"))
            .and(path(INTROSPECT_PATH))
            .and(header(
                "authorization",
                basic_authorization(CLIENT_ID, CLIENT_SECRET).as_str(),
            ))
            .and(header("content-type", "application/x-www-form-urlencoded"))
            .and(body_string(format!("token={}", token)))
            .respond_with(response)
            .expect(calls)
            .mount(&self.server)
            .await;
    }

    /// Fail the test if any introspection request arrives
    pub async fn expect_no_calls(&self) {
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&self.server)
            .await;
    }
}
