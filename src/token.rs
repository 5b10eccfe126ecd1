//! Signed, time-limited links sent by email.
//!
//! A token is `{timestamp_b36}-{hmac_hex}`. The HMAC covers the state of the
//! user it was issued for, so once the state moves (account activated, login
//! recorded, password or email changed) every older token stops matching.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

use crate::crypto::Hasher;
use crate::user::User;

/// Action a token authorizes. Tokens never cross purposes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenPurpose {
    Activation,
    EmailChange,
    PasswordReset,
}

impl fmt::Display for TokenPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TokenPurpose::Activation => "activation",
            TokenPurpose::EmailChange => "email-change",
            TokenPurpose::PasswordReset => "password-reset",
        })
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token is malformed")]
    Malformed,
    #[error("token expired")]
    Expired,
    #[error("token does not match user state")]
    Mismatch,
}

/// Issue and check confirmation tokens.
pub struct ConfirmationTokens {
    hasher: Hasher,
    /// Validity in seconds.
    window: u64,
}

impl ConfirmationTokens {
    pub fn new(secret: impl AsRef<[u8]>, window: u64) -> Self {
        // Separate the key from the one signing sessions.
        let key = [b"hearth.token:".as_slice(), secret.as_ref()].concat();

        Self {
            hasher: Hasher::new(key),
            window,
        }
    }

    pub fn make_token(&self, user: &User, purpose: TokenPurpose) -> String {
        self.make_token_at(user, purpose, now())
    }

    pub fn make_token_at(
        &self,
        user: &User,
        purpose: TokenPurpose,
        timestamp: u64,
    ) -> String {
        let digest = self.hasher.digest(state(user, purpose, timestamp));
        format!("{}-{digest}", to_base36(timestamp))
    }

    pub fn check_token(
        &self,
        user: &User,
        purpose: TokenPurpose,
        token: &str,
    ) -> Result<(), TokenError> {
        self.check_token_at(user, purpose, token, now())
    }

    pub fn check_token_at(
        &self,
        user: &User,
        purpose: TokenPurpose,
        token: &str,
        now: u64,
    ) -> Result<(), TokenError> {
        let (timestamp, digest) =
            token.split_once('-').ok_or(TokenError::Malformed)?;
        let timestamp = u64::from_str_radix(timestamp, 36)
            .map_err(|_| TokenError::Malformed)?;

        if !self.hasher.verify(state(user, purpose, timestamp), digest) {
            return Err(TokenError::Mismatch);
        }

        if now.saturating_sub(timestamp) > self.window {
            return Err(TokenError::Expired);
        }

        Ok(())
    }
}

fn state(user: &User, purpose: TokenPurpose, timestamp: u64) -> String {
    let last_login = user
        .last_login
        .map(|date| date.timestamp_micros().to_string())
        .unwrap_or_default();

    format!(
        "{purpose}:{}:{}:{last_login}:{}:{}:{}:{timestamp}",
        user.id, user.password, user.email, user.is_active, user.is_blocked
    )
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .unwrap_or_default()
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

    let mut out = Vec::new();
    loop {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
        if value == 0 {
            break;
        }
    }
    out.reverse();

    String::from_utf8(out).unwrap_or_default()
}

/// Encode a user id for use in a URL.
pub fn encode_uid(id: i64) -> String {
    URL_SAFE_NO_PAD.encode(id.to_string())
}

/// Decode what [`encode_uid`] produced. Anything else yields `None`.
pub fn decode_uid(uidb64: &str) -> Option<i64> {
    let bytes = URL_SAFE_NO_PAD.decode(uidb64).ok()?;
    std::str::from_utf8(&bytes).ok()?.parse().ok()
}
