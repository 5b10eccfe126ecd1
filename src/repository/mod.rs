//! Row-level access to users and their profile rows.
mod memory;
mod postgres;

pub use memory::MemoryRepository;
pub use postgres::PgRepository;

use async_trait::async_trait;

use crate::error::Result;
use crate::profile::{EditEmail, ThemeChanger, UserAvatar};
use crate::user::{NewUser, User};

/// Persistence port.
///
/// Every operation touches a single row. Email comparisons ignore ASCII
/// case, username comparisons do not.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Insert a user and return it with its generated `id`.
    ///
    /// Fails with [`crate::error::ServerError::UsernameTaken`] when the
    /// username exists.
    async fn insert_user(&self, user: NewUser) -> Result<User>;

    async fn find_user(&self, id: i64) -> Result<Option<User>>;

    async fn find_user_by_username(&self, username: &str)
    -> Result<Option<User>>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;

    async fn username_exists(&self, username: &str) -> Result<bool>;

    /// Whether a user, other than `except`, owns `email`.
    async fn email_taken(&self, email: &str, except: Option<i64>)
    -> Result<bool>;

    /// Users ordered by id, optionally only those whose username contains
    /// `needle`.
    async fn search_users(&self, needle: Option<&str>) -> Result<Vec<User>>;

    async fn count_users(&self) -> Result<i64>;

    /// Persist every mutable column of `user`.
    async fn update_user(&self, user: &User) -> Result<()>;

    async fn find_theme(&self, user_id: i64) -> Result<Option<ThemeChanger>>;

    /// Read the preference, creating the default row when absent.
    async fn get_or_create_theme(&self, user_id: i64) -> Result<ThemeChanger>;

    /// Insert or overwrite the preference of `theme.user_id`.
    async fn save_theme(&self, theme: &ThemeChanger) -> Result<()>;

    async fn find_avatar(&self, user_id: i64) -> Result<Option<UserAvatar>>;

    /// Insert or overwrite the avatar, returning the replaced one.
    async fn replace_avatar(
        &self,
        avatar: &UserAvatar,
    ) -> Result<Option<UserAvatar>>;

    /// Delete the avatar row, returning it.
    async fn delete_avatar(&self, user_id: i64) -> Result<Option<UserAvatar>>;

    async fn find_pending_email(&self, user_id: i64)
    -> Result<Option<EditEmail>>;

    /// Insert or supersede the pending email of `pending.user_id`.
    async fn save_pending_email(&self, pending: &EditEmail) -> Result<()>;

    /// Returns whether a row was deleted.
    async fn delete_pending_email(&self, user_id: i64) -> Result<bool>;
}
