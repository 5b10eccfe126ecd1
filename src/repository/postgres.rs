//! Handle database requests.

use async_trait::async_trait;

use crate::database::Database;
use crate::error::{Result, ServerError};
use crate::profile::{EditEmail, ThemeChanger, UserAvatar};
use crate::repository::Repository;
use crate::user::{NewUser, User};

const USER_COLUMNS: &str = r#"id, username, email, first_name, last_name, password,
    is_active, is_blocked, is_staff, is_superuser, last_login, date_joined"#;

/// [`Repository`] backed by PostgreSQL.
#[derive(Clone, Debug)]
pub struct PgRepository {
    db: Database,
}

impl PgRepository {
    /// Create a new [`PgRepository`].
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    async fn find_user_by(
        &self,
        field: Field,
        value: &str,
    ) -> Result<Option<User>> {
        let query = get_by_field_query(field);

        Ok(sqlx::query_as::<_, User>(&query)
            .bind(value)
            .fetch_optional(&self.db.postgres)
            .await?)
    }
}

fn theme_from_row(
    (user_id, theme, background_theme): (i64, String, String),
) -> Result<ThemeChanger> {
    Ok(ThemeChanger {
        user_id,
        theme: theme
            .parse()
            .map_err(|err| ServerError::internal("corrupted theme row", err))?,
        background_theme: background_theme
            .parse()
            .map_err(|err| ServerError::internal("corrupted theme row", err))?,
    })
}

fn avatar_from_row((user_id, url, key): (i64, String, String)) -> UserAvatar {
    UserAvatar { user_id, url, key }
}

#[async_trait]
impl Repository for PgRepository {
    async fn insert_user(&self, user: NewUser) -> Result<User> {
        let query = format!(
            r#"INSERT INTO users (username, email, first_name, last_name, password, is_active)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING {USER_COLUMNS}"#
        );

        let inserted = sqlx::query_as::<_, User>(&query)
            .bind(user.username)
            .bind(user.email)
            .bind(user.first_name)
            .bind(user.last_name)
            .bind(user.password)
            .bind(user.is_active)
            .fetch_one(&self.db.postgres)
            .await;

        match inserted {
            Err(sqlx::Error::Database(err)) if err.is_unique_violation() => {
                Err(ServerError::UsernameTaken)
            },
            result => Ok(result?),
        }
    }

    async fn find_user(&self, id: i64) -> Result<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");

        Ok(sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(&self.db.postgres)
            .await?)
    }

    async fn find_user_by_username(
        &self,
        username: &str,
    ) -> Result<Option<User>> {
        self.find_user_by(Field::Username, username).await
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.find_user_by(Field::Email, email).await
    }

    async fn username_exists(&self, username: &str) -> Result<bool> {
        Ok(sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM users WHERE username = $1)",
        )
        .bind(username)
        .fetch_one(&self.db.postgres)
        .await?)
    }

    async fn email_taken(
        &self,
        email: &str,
        except: Option<i64>,
    ) -> Result<bool> {
        Ok(sqlx::query_scalar::<_, bool>(
            r#"SELECT EXISTS (
                SELECT 1 FROM users
                WHERE LOWER(email) = LOWER($1) AND ($2::BIGINT IS NULL OR id <> $2)
            )"#,
        )
        .bind(email)
        .bind(except)
        .fetch_one(&self.db.postgres)
        .await?)
    }

    async fn search_users(&self, needle: Option<&str>) -> Result<Vec<User>> {
        let query = format!(
            r#"SELECT {USER_COLUMNS} FROM users
                WHERE $1::TEXT IS NULL OR STRPOS(username, $1) > 0
                ORDER BY id"#
        );

        Ok(sqlx::query_as::<_, User>(&query)
            .bind(needle)
            .fetch_all(&self.db.postgres)
            .await?)
    }

    async fn count_users(&self) -> Result<i64> {
        Ok(sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(&self.db.postgres)
            .await?)
    }

    async fn update_user(&self, user: &User) -> Result<()> {
        sqlx::query(
            r#"UPDATE users
                SET username = $1, email = $2, first_name = $3, last_name = $4, password = $5,
                    is_active = $6, is_blocked = $7, is_staff = $8, is_superuser = $9, last_login = $10
                WHERE id = $11"#,
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.password)
        .bind(user.is_active)
        .bind(user.is_blocked)
        .bind(user.is_staff)
        .bind(user.is_superuser)
        .bind(user.last_login)
        .bind(user.id)
        .execute(&self.db.postgres)
        .await?;

        Ok(())
    }

    async fn find_theme(&self, user_id: i64) -> Result<Option<ThemeChanger>> {
        sqlx::query_as::<_, (i64, String, String)>(
            "SELECT user_id, theme, background_theme FROM theme_changers WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.db.postgres)
        .await?
        .map(theme_from_row)
        .transpose()
    }

    async fn get_or_create_theme(&self, user_id: i64) -> Result<ThemeChanger> {
        let default = ThemeChanger::new(user_id);

        sqlx::query(
            r#"INSERT INTO theme_changers (user_id, theme, background_theme)
                VALUES ($1, $2, $3)
                ON CONFLICT (user_id) DO NOTHING"#,
        )
        .bind(user_id)
        .bind(default.theme.as_str())
        .bind(default.background_theme.as_str())
        .execute(&self.db.postgres)
        .await?;

        Ok(self.find_theme(user_id).await?.unwrap_or(default))
    }

    async fn save_theme(&self, theme: &ThemeChanger) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO theme_changers (user_id, theme, background_theme)
                VALUES ($1, $2, $3)
                ON CONFLICT (user_id) DO UPDATE
                SET theme = EXCLUDED.theme, background_theme = EXCLUDED.background_theme"#,
        )
        .bind(theme.user_id)
        .bind(theme.theme.as_str())
        .bind(theme.background_theme.as_str())
        .execute(&self.db.postgres)
        .await?;

        Ok(())
    }

    async fn find_avatar(&self, user_id: i64) -> Result<Option<UserAvatar>> {
        Ok(sqlx::query_as::<_, (i64, String, String)>(
            "SELECT user_id, url, storage_key FROM user_avatars WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.db.postgres)
        .await?
        .map(avatar_from_row))
    }

    async fn replace_avatar(
        &self,
        avatar: &UserAvatar,
    ) -> Result<Option<UserAvatar>> {
        let mut tx = self.db.postgres.begin().await?;

        let previous = sqlx::query_as::<_, (i64, String, String)>(
            "SELECT user_id, url, storage_key FROM user_avatars WHERE user_id = $1 FOR UPDATE",
        )
        .bind(avatar.user_id)
        .fetch_optional(&mut *tx)
        .await?
        .map(avatar_from_row);

        sqlx::query(
            r#"INSERT INTO user_avatars (user_id, url, storage_key)
                VALUES ($1, $2, $3)
                ON CONFLICT (user_id) DO UPDATE
                SET url = EXCLUDED.url, storage_key = EXCLUDED.storage_key"#,
        )
        .bind(avatar.user_id)
        .bind(&avatar.url)
        .bind(&avatar.key)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(previous)
    }

    async fn delete_avatar(&self, user_id: i64) -> Result<Option<UserAvatar>> {
        Ok(sqlx::query_as::<_, (i64, String, String)>(
            "DELETE FROM user_avatars WHERE user_id = $1 RETURNING user_id, url, storage_key",
        )
        .bind(user_id)
        .fetch_optional(&self.db.postgres)
        .await?
        .map(avatar_from_row))
    }

    async fn find_pending_email(
        &self,
        user_id: i64,
    ) -> Result<Option<EditEmail>> {
        Ok(sqlx::query_as::<_, (i64, String)>(
            "SELECT user_id, email FROM edit_emails WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.db.postgres)
        .await?
        .map(|(user_id, email)| EditEmail { user_id, email }))
    }

    async fn save_pending_email(&self, pending: &EditEmail) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO edit_emails (user_id, email) VALUES ($1, $2)
                ON CONFLICT (user_id) DO UPDATE SET email = EXCLUDED.email"#,
        )
        .bind(pending.user_id)
        .bind(&pending.email)
        .execute(&self.db.postgres)
        .await?;

        Ok(())
    }

    async fn delete_pending_email(&self, user_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM edit_emails WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.db.postgres)
            .await?;

        Ok(result.rows_affected() == 1)
    }
}

#[derive(Debug, Clone, Copy)]
enum Field {
    Username,
    Email,
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Field::Username => write!(f, "username = $1"),
            Field::Email => write!(f, "LOWER(email) = LOWER($1)"),
        }
    }
}

fn get_by_field_query(field: Field) -> String {
    format!("SELECT {USER_COLUMNS} FROM users WHERE {field} ORDER BY id LIMIT 1")
}
