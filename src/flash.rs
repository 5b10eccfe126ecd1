//! One-shot notices shown on the next rendered page.
//!
//! Notices travel in a cookie between an action (which redirects) and the
//! page it redirects to. Reading a page drains them.

use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue, header};
use axum::response::{IntoResponseParts, ResponseParts};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};

pub const FLASH_COOKIE: &str = "flash";

/// Severity of a [`Notice`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Info,
    Success,
    Warning,
    Error,
}

/// Message displayed to the user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub level: Level,
    pub message: String,
}

/// Pending notices of the current visitor.
#[derive(Debug, Default)]
pub struct Flash {
    notices: Vec<Notice>,
    changed: bool,
}

impl Flash {
    /// Queue a notice.
    pub fn push(&mut self, level: Level, message: impl Into<String>) {
        self.notices.push(Notice {
            level,
            message: message.into(),
        });
        self.changed = true;
    }

    pub fn info(mut self, message: impl Into<String>) -> Self {
        self.push(Level::Info, message);
        self
    }

    pub fn success(mut self, message: impl Into<String>) -> Self {
        self.push(Level::Success, message);
        self
    }

    pub fn warning(mut self, message: impl Into<String>) -> Self {
        self.push(Level::Warning, message);
        self
    }

    pub fn error(mut self, message: impl Into<String>) -> Self {
        self.push(Level::Error, message);
        self
    }

    /// Drain every pending notice. The cookie is cleared on response.
    pub fn take(&mut self) -> Vec<Notice> {
        self.changed = true;
        std::mem::take(&mut self.notices)
    }

    /// Pending notices, without draining them.
    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    /// Notices pending in the request cookie.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let notices = CookieJar::from_headers(headers)
            .get(FLASH_COOKIE)
            .and_then(|cookie| Self::decode(cookie.value()))
            .unwrap_or_default();

        Self {
            notices,
            changed: false,
        }
    }

    fn encode(notices: &[Notice]) -> Option<String> {
        serde_json::to_vec(notices)
            .ok()
            .map(|json| URL_SAFE_NO_PAD.encode(json))
    }

    fn decode(value: &str) -> Option<Vec<Notice>> {
        let json = URL_SAFE_NO_PAD.decode(value).ok()?;
        serde_json::from_slice(&json).ok()
    }
}

impl<S> FromRequestParts<S> for Flash
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        Ok(Self::from_headers(&parts.headers))
    }
}

impl IntoResponseParts for Flash {
    type Error = Infallible;

    fn into_response_parts(
        self,
        mut res: ResponseParts,
    ) -> Result<ResponseParts, Self::Error> {
        if !self.changed {
            return Ok(res);
        }

        let cookie = match Self::encode(&self.notices) {
            Some(value) if !self.notices.is_empty() => {
                Cookie::build((FLASH_COOKIE, value))
                    .path("/")
                    .http_only(true)
                    .same_site(SameSite::Lax)
                    .build()
            },
            _ => Cookie::build((FLASH_COOKIE, ""))
                .path("/")
                .max_age(time::Duration::ZERO)
                .build(),
        };

        match HeaderValue::from_str(&cookie.to_string()) {
            Ok(value) => {
                res.headers_mut().append(header::SET_COOKIE, value);
            },
            Err(err) => {
                tracing::error!(error = %err, "flash cookie is not a valid header")
            },
        }

        Ok(res)
    }
}
