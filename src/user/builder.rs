//! Typed builder for User.

use crate::user::NewUser;

/// [`NewUser`] builder.
///
/// `username` and `email` are mandatory: `build` only exists once both are
/// [`Present`].
#[derive(Debug, Clone)]
pub struct UserBuilder<Username, Email> {
    username: Username,
    email: Email,
    first_name: String,
    last_name: String,
    password: String,
    is_active: bool,
}

/// Value is missing on [`UserBuilder`].
#[derive(Debug, Clone)]
pub struct Missing;

/// Value is present on [`UserBuilder`].
#[derive(Debug, Clone)]
pub struct Present<T>(pub T);

impl UserBuilder<Missing, Missing> {
    /// Create a new [`UserBuilder`].
    pub fn new() -> Self {
        Self {
            username: Missing,
            email: Missing,
            first_name: String::default(),
            last_name: String::default(),
            password: String::default(),
            is_active: false,
        }
    }
}

impl Default for UserBuilder<Missing, Missing> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Email> UserBuilder<Missing, Email> {
    /// Update `username` field on [`UserBuilder`].
    pub fn username(
        self,
        username: impl Into<String>,
    ) -> UserBuilder<Present<String>, Email> {
        UserBuilder {
            username: Present(username.into()),
            email: self.email,
            first_name: self.first_name,
            last_name: self.last_name,
            password: self.password,
            is_active: self.is_active,
        }
    }
}

impl<Username> UserBuilder<Username, Missing> {
    /// Update `email` field on [`UserBuilder`].
    pub fn email(
        self,
        email: impl Into<String>,
    ) -> UserBuilder<Username, Present<String>> {
        UserBuilder {
            username: self.username,
            email: Present(email.into().trim().to_owned()),
            first_name: self.first_name,
            last_name: self.last_name,
            password: self.password,
            is_active: self.is_active,
        }
    }
}

impl<Username, Email> UserBuilder<Username, Email> {
    /// Update `password` field on [`UserBuilder`]. Expects a PHC hash.
    pub fn password(mut self, password: impl ToString) -> Self {
        self.password = password.to_string();
        self
    }

    /// Update `first_name` field on [`UserBuilder`].
    pub fn first_name(mut self, first_name: Option<String>) -> Self {
        self.first_name = first_name.unwrap_or_default();
        self
    }

    /// Update `last_name` field on [`UserBuilder`].
    pub fn last_name(mut self, last_name: Option<String>) -> Self {
        self.last_name = last_name.unwrap_or_default();
        self
    }

    /// Accounts are inactive until confirmed by email.
    pub fn active(mut self, is_active: bool) -> Self {
        self.is_active = is_active;
        self
    }
}

impl UserBuilder<Present<String>, Present<String>> {
    /// Build a [`NewUser`].
    pub fn build(self) -> NewUser {
        NewUser {
            username: self.username.0,
            email: self.email.0,
            first_name: self.first_name,
            last_name: self.last_name,
            password: self.password,
            is_active: self.is_active,
        }
    }
}
