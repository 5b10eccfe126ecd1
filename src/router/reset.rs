//! Password reset by emailed link.

use axum::Router;
use axum::extract::{Extension, Path, State};
use axum::response::{IntoResponse, Redirect};
use axum::routing::get;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use crate::error::Result;
use crate::flash::Flash;
use crate::mail::Email;
use crate::middleware::Visitor;
use crate::router::profile::password::PASSWORDS_MISMATCH;
use crate::router::{Submission, ValidForm, render, send_mail};
use crate::token::{TokenPurpose, decode_uid, encode_uid};
use crate::user::User;

pub const INVALID_LINK: &str =
    "The password reset link was invalid, possibly because it has already been used.";
const RESET_SENT: &str = "If an account uses this address, we sent it \
     instructions to reset the password.";
const RESET_DONE: &str = "Your password has been set. You may go ahead and log in now.";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/reset-password/", get(page).post(handler))
        .route("/reset-password/done", get(sent))
        .route("/reset/{uidb64}/{token}/", get(link).post(confirm))
        .route("/reset/done/", get(done))
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct ResetRequest {
    #[validate(
        email(message = "Enter a valid email address."),
        length(max = 40, message = "Email is too long.")
    )]
    pub email: String,
}

impl Submission for ResetRequest {}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct NewPassword {
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

impl Submission for NewPassword {}

#[derive(Debug, Serialize)]
struct LinkContent {
    valid_link: bool,
}

async fn page(
    State(state): State<AppState>,
    Extension(Visitor(visitor)): Extension<Visitor>,
    flash: Flash,
) -> Result<impl IntoResponse> {
    render(&state, visitor.as_ref(), flash, "password_reset", ()).await
}

/// Send a reset link. Answers the same whether the address is known or not.
async fn handler(
    State(state): State<AppState>,
    flash: Flash,
    ValidForm(body): ValidForm<ResetRequest>,
) -> Result<impl IntoResponse> {
    let user = state
        .repo
        .find_user_by_email(body.email.trim())
        .await?
        .filter(User::can_login);

    let flash = match user {
        Some(user) => {
            tracing::info!(user_id = user.id, "password reset requested");
            send_mail(&state, flash, reset_email(&state, &user))
        },
        None => {
            tracing::debug!("password reset requested for unknown address");
            flash
        },
    };

    Ok((flash.info(RESET_SENT), Redirect::to("/reset-password/done")))
}

fn reset_email(state: &AppState, user: &User) -> Email {
    let token = state.tokens.make_token(user, TokenPurpose::PasswordReset);
    let link = state
        .config
        .link(&format!("reset/{}/{token}/", encode_uid(user.id)));

    Email {
        to: user.email.clone(),
        subject: format!("Password reset on {}", state.config.name),
        body: format!(
            "Hello {},\n\nfollow this link to choose a new password:\n{link}\n\n\
             Ignore this email if you did not ask for it.\n",
            user.username
        ),
    }
}

async fn sent(
    State(state): State<AppState>,
    Extension(Visitor(visitor)): Extension<Visitor>,
    flash: Flash,
) -> Result<impl IntoResponse> {
    render(&state, visitor.as_ref(), flash, "password_reset_done", ()).await
}

/// User designated by a reset link, if the link still holds.
async fn link_owner(
    state: &AppState,
    uidb64: &str,
    token: &str,
) -> Result<Option<User>> {
    let user = match decode_uid(uidb64) {
        Some(id) => state.repo.find_user(id).await?,
        None => None,
    };

    Ok(user.filter(|user| {
        user.can_login()
            && state
                .tokens
                .check_token(user, TokenPurpose::PasswordReset, token)
                .is_ok()
    }))
}

async fn link(
    State(state): State<AppState>,
    Extension(Visitor(visitor)): Extension<Visitor>,
    Path((uidb64, token)): Path<(String, String)>,
    flash: Flash,
) -> Result<impl IntoResponse> {
    let valid_link = link_owner(&state, &uidb64, &token).await?.is_some();

    render(
        &state,
        visitor.as_ref(),
        flash,
        "password_reset_confirm",
        LinkContent { valid_link },
    )
    .await
}

/// Set the new password. The token dies with the old password hash.
async fn confirm(
    State(state): State<AppState>,
    Path((uidb64, token)): Path<(String, String)>,
    flash: Flash,
    ValidForm(body): ValidForm<NewPassword>,
) -> Result<impl IntoResponse> {
    let Some(mut user) = link_owner(&state, &uidb64, &token).await? else {
        return Ok((flash.error(INVALID_LINK), Redirect::to("/")));
    };

    if body.new_password != body.password_confirmation {
        return Ok((
            flash.error(PASSWORDS_MISMATCH),
            Redirect::to(&format!("/reset/{uidb64}/{token}/")),
        ));
    }

    user.password = state.crypto.pwd.hash_password(&body.new_password)?;
    state.repo.update_user(&user).await?;

    tracing::info!(user_id = user.id, "password reset");

    Ok((flash.success(RESET_DONE), Redirect::to("/reset/done/")))
}

async fn done(
    State(state): State<AppState>,
    Extension(Visitor(visitor)): Extension<Visitor>,
    flash: Flash,
) -> Result<impl IntoResponse> {
    render(&state, visitor.as_ref(), flash, "password_reset_complete", ()).await
}
