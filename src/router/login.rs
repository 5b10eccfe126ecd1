//! Sign in and sign out.

use axum::extract::State;
use axum::response::{IntoResponse, Redirect};
use axum_extra::extract::CookieJar;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use crate::error::Result;
use crate::flash::Flash;
use crate::router::{Submission, ValidForm};

pub const INVALID_CREDENTIALS: &str = "Invalid username or password.";
const UNKNOWN_USER: &str =
    "No user with this username exists, but you can become one :)";
const BLOCKED: &str = "This user is blocked.";
const NOT_ACTIVATED: &str = "This account is not activated yet.";
const LOGGED_IN: &str = "Login successful.";
const LOGGED_OUT: &str = "You have successfully logged out.";

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct Body {
    #[validate(length(
        min = 1,
        max = 20,
        message = "Username must contain between 1 and 20 characters."
    ))]
    pub username: String,
    #[validate(length(
        min = 3,
        max = 20,
        message = "Password must contain between 3 and 20 characters."
    ))]
    pub password: String,
}

impl Submission for Body {
    fn back(_path: &str) -> String {
        "/".into()
    }
}

/// Why a login attempt was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Refusal {
    UnknownUser,
    BadCredentials,
    Blocked,
    NotActivated,
}

impl Refusal {
    fn label(self) -> &'static str {
        match self {
            Refusal::UnknownUser => "unknown_user",
            Refusal::BadCredentials => "bad_credentials",
            Refusal::Blocked => "blocked",
            Refusal::NotActivated => "not_activated",
        }
    }

    fn notify(self, flash: Flash) -> Flash {
        match self {
            Refusal::UnknownUser => flash.warning(UNKNOWN_USER),
            Refusal::BadCredentials => flash.error(INVALID_CREDENTIALS),
            Refusal::Blocked => flash.error(BLOCKED),
            Refusal::NotActivated => flash.error(NOT_ACTIVATED),
        }
    }
}

/// Handler to sign a user in.
pub async fn handler(
    State(state): State<AppState>,
    jar: CookieJar,
    flash: Flash,
    ValidForm(body): ValidForm<Body>,
) -> Result<impl IntoResponse> {
    let user = state.repo.find_user_by_username(&body.username).await?;

    let refusal = match &user {
        None => Some(Refusal::UnknownUser),
        Some(user)
            if !state.crypto.pwd.verify_password(&body.password, &user.password) =>
        {
            Some(Refusal::BadCredentials)
        },
        Some(user) if user.is_blocked => Some(Refusal::Blocked),
        Some(user) if !user.is_active => Some(Refusal::NotActivated),
        Some(_) => None,
    };

    let (Some(mut user), None) = (user, refusal) else {
        let refusal = refusal.unwrap_or(Refusal::UnknownUser);
        metrics::counter!("logins_total", "result" => refusal.label())
            .increment(1);
        tracing::debug!(username = %body.username, reason = refusal.label(), "login refused");

        let flash = if state.config.login.detailed_errors {
            refusal.notify(flash)
        } else {
            flash.error(INVALID_CREDENTIALS)
        };
        return Ok((jar, flash, Redirect::to("/")));
    };

    user.last_login = Some(Utc::now());
    state.repo.update_user(&user).await?;

    metrics::counter!("logins_total", "result" => "ok").increment(1);
    tracing::info!(user_id = user.id, "user logged in");

    let jar = jar.add(state.session.cookie(state.session.create(&user)?));

    Ok((jar, flash.success(LOGGED_IN), Redirect::to("/")))
}

/// Handler to sign the current user out.
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
    flash: Flash,
) -> impl IntoResponse {
    (
        jar.remove(state.session.removal()),
        flash.success(LOGGED_OUT),
        Redirect::to("/"),
    )
}
