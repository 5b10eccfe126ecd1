//! In-process repository, used when no PostgreSQL instance is configured.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::error::{Result, ServerError};
use crate::profile::{EditEmail, ThemeChanger, UserAvatar};
use crate::repository::Repository;
use crate::user::{NewUser, User};

#[derive(Debug, Default)]
struct Inner {
    users: BTreeMap<i64, User>,
    next_id: i64,
    themes: HashMap<i64, ThemeChanger>,
    avatars: HashMap<i64, UserAvatar>,
    pending: HashMap<i64, EditEmail>,
}

/// [`Repository`] keeping every row in memory.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    inner: RwLock<Inner>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn insert_user(&self, user: NewUser) -> Result<User> {
        let mut inner = self.inner.write().await;
        if inner.users.values().any(|row| row.username == user.username) {
            return Err(ServerError::UsernameTaken);
        }
        inner.next_id += 1;

        let user = User {
            id: inner.next_id,
            username: user.username,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            password: user.password,
            is_active: user.is_active,
            is_blocked: false,
            is_staff: false,
            is_superuser: false,
            last_login: None,
            date_joined: Utc::now(),
        };
        inner.users.insert(user.id, user.clone());

        Ok(user)
    }

    async fn find_user(&self, id: i64) -> Result<Option<User>> {
        Ok(self.inner.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_username(
        &self,
        username: &str,
    ) -> Result<Option<User>> {
        Ok(self
            .inner
            .read()
            .await
            .users
            .values()
            .find(|user| user.username == username)
            .cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self
            .inner
            .read()
            .await
            .users
            .values()
            .find(|user| user.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn username_exists(&self, username: &str) -> Result<bool> {
        Ok(self.find_user_by_username(username).await?.is_some())
    }

    async fn email_taken(
        &self,
        email: &str,
        except: Option<i64>,
    ) -> Result<bool> {
        Ok(self.inner.read().await.users.values().any(|user| {
            Some(user.id) != except && user.email.eq_ignore_ascii_case(email)
        }))
    }

    async fn search_users(&self, needle: Option<&str>) -> Result<Vec<User>> {
        Ok(self
            .inner
            .read()
            .await
            .users
            .values()
            .filter(|user| needle.is_none_or(|n| user.username.contains(n)))
            .cloned()
            .collect())
    }

    async fn count_users(&self) -> Result<i64> {
        Ok(self.inner.read().await.users.len() as i64)
    }

    async fn update_user(&self, user: &User) -> Result<()> {
        if let Some(row) = self.inner.write().await.users.get_mut(&user.id) {
            *row = user.clone();
        }

        Ok(())
    }

    async fn find_theme(&self, user_id: i64) -> Result<Option<ThemeChanger>> {
        Ok(self.inner.read().await.themes.get(&user_id).cloned())
    }

    async fn get_or_create_theme(&self, user_id: i64) -> Result<ThemeChanger> {
        Ok(self
            .inner
            .write()
            .await
            .themes
            .entry(user_id)
            .or_insert_with(|| ThemeChanger::new(user_id))
            .clone())
    }

    async fn save_theme(&self, theme: &ThemeChanger) -> Result<()> {
        self.inner
            .write()
            .await
            .themes
            .insert(theme.user_id, theme.clone());

        Ok(())
    }

    async fn find_avatar(&self, user_id: i64) -> Result<Option<UserAvatar>> {
        Ok(self.inner.read().await.avatars.get(&user_id).cloned())
    }

    async fn replace_avatar(
        &self,
        avatar: &UserAvatar,
    ) -> Result<Option<UserAvatar>> {
        Ok(self
            .inner
            .write()
            .await
            .avatars
            .insert(avatar.user_id, avatar.clone()))
    }

    async fn delete_avatar(&self, user_id: i64) -> Result<Option<UserAvatar>> {
        Ok(self.inner.write().await.avatars.remove(&user_id))
    }

    async fn find_pending_email(
        &self,
        user_id: i64,
    ) -> Result<Option<EditEmail>> {
        Ok(self.inner.read().await.pending.get(&user_id).cloned())
    }

    async fn save_pending_email(&self, pending: &EditEmail) -> Result<()> {
        self.inner
            .write()
            .await
            .pending
            .insert(pending.user_id, pending.clone());

        Ok(())
    }

    async fn delete_pending_email(&self, user_id: i64) -> Result<bool> {
        Ok(self.inner.write().await.pending.remove(&user_id).is_some())
    }
}
