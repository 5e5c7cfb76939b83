//! WebSocket Upgrade Handler
//!
//! Validates the handshake token, upgrades the connection and hands the
//! socket halves to [`Connection::serve`].

use std::net::SocketAddr;

use axum::{
    extract::{
        ws::{WebSocket, WebSocketUpgrade},
        ConnectInfo, Query, State,
    },
    http::{header::USER_AGENT, HeaderMap},
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use super::client::ConnectionInfo;
use super::connection::{Connection, ConnectionConfig};
use crate::shared::error::AppError;
use crate::startup::AppState;

/// Handshake token claims
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    pub token: Option<String>,
}

/// Validate an HS256 token and return the user id in its `sub` claim.
pub fn validate_token(token: &str, secret: &str) -> Result<i64, AppError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
            AppError::Unauthorized("Token expired".into())
        }
        _ => AppError::Unauthorized("Invalid token".into()),
    })?;

    token_data
        .claims
        .sub
        .parse()
        .map_err(|_| AppError::Unauthorized("Invalid token claims".into()))
}

/// `GET /ws?token=...`
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<ConnectParams>,
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    let token = match params.token.as_deref() {
        Some(token) if !token.is_empty() => token,
        _ => return AppError::Unauthorized("Missing token".into()).into_response(),
    };
    let user_id = match validate_token(token, &state.settings.jwt.secret) {
        Ok(user_id) => user_id,
        Err(e) => {
            tracing::debug!(%remote_addr, error = %e, "Rejected realtime handshake");
            return e.into_response();
        }
    };

    let user_agent = headers
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let info = ConnectionInfo::new(Some(remote_addr), user_agent);

    ws.max_message_size(state.settings.websocket.max_message_size)
        .on_upgrade(move |socket| handle_socket(socket, state, user_id, info))
}

async fn handle_socket(socket: WebSocket, state: AppState, user_id: i64, info: ConnectionInfo) {
    let (sink, stream) = socket.split();
    let config = ConnectionConfig::from(&state.settings.websocket);

    let reason = Connection::serve(
        state.hub.clone(),
        state.channels.clone(),
        user_id,
        info,
        config,
        sink,
        stream,
        state.shutdown.clone(),
    )
    .await;

    tracing::debug!(user_id, reason = reason.as_str(), "Realtime session ended");
}
