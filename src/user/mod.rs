mod builder;

pub use builder::*;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User as saved on database.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip)]
    pub password: String,
    /// Cleared until the activation link is visited, and on block.
    pub is_active: bool,
    pub is_blocked: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub date_joined: DateTime<Utc>,
}

impl User {
    /// Admin console requires both role flags.
    pub fn is_admin(&self) -> bool {
        self.is_staff && self.is_superuser
    }

    /// Whether the account may hold a session.
    pub fn can_login(&self) -> bool {
        self.is_active && !self.is_blocked
    }
}

/// User waiting to be inserted, see [`UserBuilder`].
#[derive(Clone, Debug, PartialEq)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
    pub is_active: bool,
}
