//! Session identity cookie
//!
//! A session is an opaque random id in the `relform_sid` cookie. It only
//! keys the pending confirmation slot; nothing else is stored client-side.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
};
use std::convert::Infallible;
use tracing::warn;
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "relform_sid";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    pub id: Uuid,
    /// Issued on this request; the response must set the cookie
    pub is_new: bool,
}

impl Session {
    /// Session from the request cookies, or a fresh one
    pub fn from_headers(headers: &HeaderMap) -> Self {
        match cookie_session_id(headers) {
            Some(id) => Self { id, is_new: false },
            None => Self {
                id: Uuid::new_v4(),
                is_new: true,
            },
        }
    }

    pub fn cookie_value(&self) -> String {
        format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax",
            SESSION_COOKIE,
            self.id.as_hyphenated()
        )
    }

    /// Add `Set-Cookie` to `response` for newly issued sessions
    pub fn attach(&self, response: impl IntoResponse) -> Response {
        let mut response = response.into_response();
        if self.is_new {
            match HeaderValue::from_str(&self.cookie_value()) {
                Ok(value) => {
                    response.headers_mut().append(header::SET_COOKIE, value);
                }
                Err(e) => warn!("Could not encode session cookie: {}", e),
            }
        }
        response
    }
}

fn cookie_session_id(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .and_then(|(_, value)| Uuid::parse_str(value.trim()).ok())
}

#[async_trait]
impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Session::from_headers(&parts.headers))
    }
}
