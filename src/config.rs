//! Configuration manager for Hearth.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::FromRef;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::AppState;

const DEFAULT_CONFIG_PATH: &str = "config.yaml";
const DEFAULT_URL: &str = "http://localhost:8000/";
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// Instance name.
    pub name: String,
    /// Public URL of current instance, used to build emailed links.
    pub url: String,
    #[serde(skip_deserializing)]
    pub version: String,
    #[serde(skip)]
    path: PathBuf,
    /// Related to PostgreSQL configuration.
    #[serde(skip_serializing)]
    pub postgres: Option<Postgres>,
    /// Related to Argon2 configuration.
    #[serde(skip_serializing)]
    pub argon2: Option<Argon2>,
    /// Related to SMTP mail sending.
    #[serde(skip_serializing)]
    pub mail: Option<Mail>,
    /// Confirmation links.
    #[serde(skip_serializing)]
    pub token: Token,
    /// Session cookie.
    #[serde(skip_serializing)]
    pub session: Session,
    /// Avatar files.
    #[serde(skip_serializing)]
    pub storage: Storage,
    #[serde(skip_serializing)]
    pub login: Login,
}

/// PostgreSQL configuration.
#[derive(Debug, Default, PartialEq, Clone, Serialize, Deserialize)]
pub struct Postgres {
    /// Hostname:(?port) for PostgreSQL instance.
    pub address: String,
    /// Database name.
    pub database: Option<String>,
    /// Username credential to connect.
    pub username: Option<String>,
    /// Password credential to connect.
    pub password: Option<String>,
    /// Maximum pool connections.
    pub pool_size: Option<u32>,
}

/// Argon2 configuration.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Argon2 {
    /// Memory used while hashing.
    pub memory_cost: u32,
    /// Iterations of hash.
    pub iterations: u32,
    /// Parallelism degree.
    pub parallelism: u32,
    /// Output hash length.
    pub hash_length: usize,
}

impl Default for Argon2 {
    fn default() -> Self {
        Self {
            memory_cost: 1024 * 64, // 64 MiB.
            iterations: 4,
            parallelism: 2,
            hash_length: 32,
        }
    }
}

/// SMTP configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mail {
    /// SMTP relay hostname.
    pub host: String,
    /// Relay port, 587 when missing.
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// `From` header of every email.
    pub from: String,
    /// Capacity of the outgoing queue.
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
    /// Number of sending attempts before an email is dropped.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_queue_size() -> usize {
    256
}

fn default_max_attempts() -> u32 {
    3
}

/// Confirmation token configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Token {
    /// Seconds during which an emailed link stays valid.
    pub window: u64,
}

impl Default for Token {
    fn default() -> Self {
        Self {
            window: 60 * 60 * 24 * 3, // 3 days.
        }
    }
}

/// Session cookie configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Session {
    /// Session lifetime in seconds.
    pub lifetime: u64,
    /// Only send the cookie over HTTPS.
    pub secure: bool,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            lifetime: 60 * 60 * 24 * 14, // 2 weeks.
            secure: false,
        }
    }
}

/// Avatar storage configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Storage {
    /// Directory receiving uploaded files.
    pub media_root: PathBuf,
    /// URL prefix under which `media_root` is served.
    pub media_url: String,
}

impl Default for Storage {
    fn default() -> Self {
        Self {
            media_root: PathBuf::from("media"),
            media_url: "/media/".into(),
        }
    }
}

/// Login behaviour.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Login {
    /// Tell apart unknown users, blocked accounts and wrong passwords.
    /// Leaks account existence, disabled unless explicitly wanted.
    pub detailed_errors: bool,
}

impl FromRef<AppState> for Arc<Configuration> {
    fn from_ref(state: &AppState) -> Arc<Configuration> {
        Arc::clone(&state.config)
    }
}

impl Configuration {
    pub fn path(mut self, path: PathBuf) -> Self {
        self.path = path;
        self
    }

    /// Normalizes a URL string by ensuring it starts with a valid scheme
    /// (`http` or `https`).
    fn normalize_url(url: &str) -> Result<String, url::ParseError> {
        if url.is_empty() {
            return Ok(DEFAULT_URL.to_owned());
        }

        let url_with_scheme =
            if url.starts_with("http://") || url.starts_with("https://") {
                url.to_string()
            } else {
                format!("https://{url}")
            };

        let parsed_url = Url::parse(&url_with_scheme)?;
        Ok(parsed_url.to_string())
    }

    /// Reads the `config.yaml` file from the specified path or the default
    /// location.
    pub fn read(self) -> Result<Arc<Self>, url::ParseError> {
        let file_path = if self.path.is_file() {
            &self.path
        } else {
            &Path::new(DEFAULT_CONFIG_PATH).to_path_buf()
        };

        match File::open(file_path) {
            Ok(file) => {
                let mut config: Configuration =
                    match serde_yaml::from_reader(file) {
                        Ok(config) => config,
                        Err(err) => {
                            return Ok(Arc::new(Self::fallback(err)));
                        },
                    };

                config.version = VERSION.to_owned();
                config.url = Self::normalize_url(&config.url)?;

                Ok(Arc::new(config))
            },
            Err(err) => Ok(Arc::new(Self::fallback(err))),
        }
    }

    /// Return a default configuration as fallback.
    fn fallback(err: impl std::error::Error) -> Self {
        tracing::error!(error = %err, "`config.yaml` file not readable");
        Self::defaults()
    }

    /// Configuration used when no file is provided.
    pub fn defaults() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_owned(),
            url: DEFAULT_URL.to_owned(),
            version: VERSION.to_owned(),
            ..Default::default()
        }
    }

    /// Build an absolute link to `path` on this instance.
    pub fn link(&self, path: &str) -> String {
        match Url::parse(&self.url).and_then(|base| base.join(path)) {
            Ok(url) => url.to_string(),
            Err(_) => format!("{}{}", self.url, path.trim_start_matches('/')),
        }
    }
}
