//! Manage session cookies carrying a json web token.

use std::time::{SystemTime, UNIX_EPOCH};

use axum_extra::extract::cookie::{Cookie, SameSite};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
};
use serde::{Deserialize, Serialize};

use crate::config::Session as SessionConfig;
use crate::crypto::Hasher;
use crate::user::User;

pub const SESSION_COOKIE: &str = "session";
const DEFAULT_AUDIENCE: &str = "hearth.session";

type Result<T> = std::result::Result<T, jsonwebtoken::errors::Error>;

/// Pieces of information asserted on a session JWT.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Claims {
    /// Recipients that the JWT is intended for.
    pub aud: String,
    /// Expiration time, in seconds since epoch.
    pub exp: u64,
    /// Issue time, in seconds since epoch.
    pub iat: u64,
    /// Instance that issued the JWT.
    pub iss: String,
    /// User ID.
    pub sub: String,
    /// Session auth hash, keyed digest of the password hash.
    pub sah: String,
}

impl Claims {
    /// Parsed `sub` claim.
    pub fn user_id(&self) -> Option<i64> {
        self.sub.parse().ok()
    }
}

/// Issue, read and revoke session cookies.
pub struct SessionManager {
    encoding: EncodingKey,
    decoding: DecodingKey,
    hasher: Hasher,
    name: String,
    lifetime: u64,
    secure: bool,
}

impl SessionManager {
    /// Create a new [`SessionManager`].
    pub fn new(
        name: &str,
        config: &SessionConfig,
        secret: impl AsRef<[u8]>,
    ) -> Self {
        let secret = secret.as_ref();
        let key = [b"hearth.session:".as_slice(), secret].concat();

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            hasher: Hasher::new(key),
            name: name.to_owned(),
            lifetime: config.lifetime,
            secure: config.secure,
        }
    }

    /// Create a new session token for `user`.
    pub fn create(&self, user: &User) -> Result<String> {
        let time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|duration| duration.as_secs())
            .unwrap_or_default();
        let claims = Claims {
            aud: DEFAULT_AUDIENCE.to_owned(),
            exp: time + self.lifetime,
            iat: time,
            iss: self.name.clone(),
            sub: user.id.to_string(),
            sah: self.hasher.digest(&user.password),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
    }

    /// Decode and check signature, issuer, audience and expiration.
    pub fn decode(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[DEFAULT_AUDIENCE]);
        validation.set_issuer(&[&self.name]);

        Ok(decode::<Claims>(token, &self.decoding, &validation)?.claims)
    }

    /// Whether the session was issued for the current password of `user`.
    pub fn is_current(&self, claims: &Claims, user: &User) -> bool {
        claims.user_id() == Some(user.id)
            && self.hasher.verify(&user.password, &claims.sah)
    }

    /// Cookie carrying `token`.
    pub fn cookie(&self, token: String) -> Cookie<'static> {
        Cookie::build((SESSION_COOKIE, token))
            .path("/")
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .max_age(time::Duration::seconds(
                i64::try_from(self.lifetime).unwrap_or(i64::MAX),
            ))
            .build()
    }

    /// Cookie removing the session on the client.
    pub fn removal(&self) -> Cookie<'static> {
        Cookie::build((SESSION_COOKIE, "")).path("/").build()
    }
}
