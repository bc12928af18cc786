//! Extracts who is calling from request headers and the peer address.

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use std::convert::Infallible;
use std::net::SocketAddr;

use crate::models::Requester;

/// Username used when the caller does not give one.
pub const ANONYMOUS: &str = "anonymous";

/// Caller identity as seen by the HTTP layer.
#[derive(Debug, Clone)]
pub struct ClientInfo {
    /// From the `X-Username` header.
    pub username: Option<String>,
    /// First `X-Forwarded-For` hop, else the socket peer.
    pub ip_address: String,
    pub user_agent: Option<String>,
}

impl ClientInfo {
    /// Builds the log requester. A username from the request body wins over
    /// the header.
    pub fn requester(&self, body_username: Option<&str>) -> Requester {
        let username = body_username
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .or(self.username.as_deref())
            .unwrap_or(ANONYMOUS);
        Requester {
            username: username.to_string(),
            ip_address: self.ip_address.clone(),
            user_agent: self.user_agent.clone(),
        }
    }
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl<S: Send + Sync> FromRequestParts<S> for ClientInfo {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let forwarded = header_str(&parts.headers, "x-forwarded-for")
            .and_then(|v| v.split(',').next().map(|hop| hop.trim().to_string()))
            .filter(|hop| !hop.is_empty());
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());

        Ok(ClientInfo {
            username: header_str(&parts.headers, "x-username"),
            ip_address: forwarded.or(peer).unwrap_or_else(|| "unknown".to_string()),
            user_agent: header_str(&parts.headers, "user-agent"),
        })
    }
}
