//! Password change of the signed in user.

use axum::extract::{Extension, State};
use axum::response::{IntoResponse, Redirect};
use axum_extra::extract::CookieJar;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use crate::error::Result;
use crate::flash::Flash;
use crate::router::{Submission, ValidForm, render};
use crate::user::User;

pub const INCORRECT_PASSWORD: &str = "Incorrect current password.";
pub const PASSWORDS_MISMATCH: &str = "Passwords do not match.";
pub const SAME_PASSWORD: &str = "The new password matches the old one.";
const CHANGED: &str = "Your password was changed successfully.";

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct Body {
    #[validate(length(
        min = 3,
        max = 20,
        message = "Password must contain between 3 and 20 characters."
    ))]
    pub old_password: String,
    #[validate(length(
        min = 3,
        max = 20,
        message = "Password must contain between 3 and 20 characters."
    ))]
    pub new_password: String,
    #[validate(length(
        min = 3,
        max = 20,
        message = "Password must contain between 3 and 20 characters."
    ))]
    pub password_confirmation: String,
}

impl Submission for Body {}

pub async fn page(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    flash: Flash,
) -> Result<impl IntoResponse> {
    render(&state, Some(&user), flash, "password", ()).await
}

/// Handler to change password, keeping the current session alive.
pub async fn handler(
    State(state): State<AppState>,
    Extension(mut user): Extension<User>,
    jar: CookieJar,
    flash: Flash,
    ValidForm(body): ValidForm<Body>,
) -> Result<impl IntoResponse> {
    let back = Redirect::to("/profile/password/");

    if !state
        .crypto
        .pwd
        .verify_password(&body.old_password, &user.password)
    {
        return Ok((jar, flash.error(INCORRECT_PASSWORD), back));
    }

    if body.new_password != body.password_confirmation {
        return Ok((jar, flash.error(PASSWORDS_MISMATCH), back));
    }

    if body.new_password == body.old_password {
        return Ok((jar, flash.warning(SAME_PASSWORD), back));
    }

    user.password = state.crypto.pwd.hash_password(&body.new_password)?;
    state.repo.update_user(&user).await?;

    tracing::info!(user_id = user.id, "password changed");

    // Sessions hash the password: only this one survives.
    let jar = jar.add(state.session.cookie(state.session.create(&user)?));

    Ok((jar, flash.success(CHANGED), back))
}
