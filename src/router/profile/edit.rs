//! Profile edition, with email changes confirmed by link.

use axum::extract::{Extension, Path, State};
use axum::response::{IntoResponse, Redirect};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use crate::error::Result;
use crate::flash::Flash;
use crate::mail::Email;
use crate::profile::EditEmail;
use crate::router::register::EMAIL_TAKEN;
use crate::router::{Submission, ValidForm, render, send_mail};
use crate::token::{TokenPurpose, decode_uid, encode_uid};
use crate::user::User;

pub const NO_CHANGES: &str = "The new profile data matches the old one.";
pub const EMAIL_CHANGE_FAILED: &str = "Unable to change email.";
const UPDATED: &str = "Your profile was updated successfully.";
const EMAIL_CHANGE_SENT: &str = "We sent you an email with instructions to change your email address. \
     Other data was updated successfully.";
const EMAIL_CHANGED: &str = "Your email address was changed successfully.";

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct Body {
    #[serde(default)]
    #[validate(length(max = 20, message = "First name is too long."))]
    pub first_name: String,
    #[serde(default)]
    #[validate(length(max = 40, message = "Last name is too long."))]
    pub last_name: String,
    #[validate(
        email(message = "Enter a valid email address."),
        length(max = 40, message = "Email is too long.")
    )]
    pub email: String,
}

impl Submission for Body {}

#[derive(Debug, Serialize)]
pub struct Content {
    first_name: String,
    last_name: String,
    email: String,
    /// Address waiting for confirmation.
    pending_email: Option<String>,
}

/// Profile page with current values.
pub async fn page(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    flash: Flash,
) -> Result<impl IntoResponse> {
    let pending = state.repo.find_pending_email(user.id).await?;
    let content = Content {
        first_name: user.first_name.clone(),
        last_name: user.last_name.clone(),
        email: user.email.clone(),
        pending_email: pending.map(|pending| pending.email),
    };

    render(&state, Some(&user), flash, "profile", content).await
}

/// Handler to update names and request an email change.
pub async fn handler(
    State(state): State<AppState>,
    Extension(mut user): Extension<User>,
    flash: Flash,
    ValidForm(body): ValidForm<Body>,
) -> Result<impl IntoResponse> {
    let back = Redirect::to("/profile/");
    let email = body.email.trim();

    if user.first_name == body.first_name
        && user.last_name == body.last_name
        && user.email == email
    {
        return Ok((flash.warning(NO_CHANGES), back));
    }

    let email_changed = user.email != email;
    if email_changed && state.repo.email_taken(email, Some(user.id)).await? {
        return Ok((flash.error(EMAIL_TAKEN), back));
    }

    user.first_name = body.first_name;
    user.last_name = body.last_name;
    state.repo.update_user(&user).await?;

    if !email_changed {
        return Ok((flash.success(UPDATED), back));
    }

    let pending = EditEmail {
        user_id: user.id,
        email: email.to_owned(),
    };
    state.repo.save_pending_email(&pending).await?;

    tracing::info!(user_id = user.id, "email change requested");

    let flash = send_mail(
        &state,
        flash.info(EMAIL_CHANGE_SENT),
        confirmation_email(&state, &user, pending.email),
    );

    Ok((flash, back))
}

fn confirmation_email(state: &AppState, user: &User, to: String) -> Email {
    let token = state.tokens.make_token(user, TokenPurpose::EmailChange);
    let link = state.config.link(&format!(
        "profile/edit/confirm/{}/{token}/",
        encode_uid(user.id)
    ));

    Email {
        to,
        subject: format!("Change of email address on {}", state.config.name),
        body: format!(
            "Hello {},\n\nfollow this link to confirm your new email address:\n{link}\n",
            user.username
        ),
    }
}

/// Redeem an email change link.
pub async fn confirm(
    State(state): State<AppState>,
    Path((uidb64, token)): Path<(String, String)>,
    flash: Flash,
) -> Result<impl IntoResponse> {
    let back = Redirect::to("/profile/");

    let user = match decode_uid(&uidb64) {
        Some(id) => state.repo.find_user(id).await?,
        None => None,
    };
    let Some(mut user) = user.filter(|user| {
        state
            .tokens
            .check_token(user, TokenPurpose::EmailChange, &token)
            .is_ok()
    }) else {
        return Ok((flash.error(EMAIL_CHANGE_FAILED), back));
    };

    let Some(pending) = state.repo.find_pending_email(user.id).await? else {
        return Ok((flash.error(EMAIL_CHANGE_FAILED), back));
    };

    // Another account may have claimed the address since the request.
    if state.repo.email_taken(&pending.email, Some(user.id)).await? {
        tracing::info!(user_id = user.id, "pending email claimed by another account");
        return Ok((flash.error(EMAIL_CHANGE_FAILED), back));
    }

    user.email = pending.email;
    state.repo.update_user(&user).await?;
    state.repo.delete_pending_email(user.id).await?;

    tracing::info!(user_id = user.id, "email changed");

    Ok((flash.success(EMAIL_CHANGED), back))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};

    use super::*;
    use crate::flash::Level;
    use crate::flash::tests::notices_of;
    use crate::repository::Repository;
    use crate::router::tests::*;
    use crate::{app, make_request};

    #[tokio::test]
    async fn test_page() {
        let test = state();
        let user = create_user(&test.state, "sasha", true).await;
        test.state
            .repo
            .save_pending_email(&EditEmail {
                user_id: user.id,
                email: "new@example.com".into(),
            })
            .await
            .unwrap();
        let cookie = session_cookie(&test.state, &user);

        let response = make_request(
            app(test.state.clone()),
            Method::GET,
            "/profile/",
            Some(&cookie),
            "",
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["content"]["email"], "sasha@example.com");
        assert_eq!(body["content"]["pending_email"], "new@example.com");
    }

    #[tokio::test]
    async fn test_unchanged_profile() {
        let test = state();
        let user = create_user(&test.state, "sasha", true).await;
        let cookie = session_cookie(&test.state, &user);

        let response = make_request(
            app(test.state.clone()),
            Method::POST,
            "/profile/",
            Some(&cookie),
            "first_name=&last_name=&email=sasha%40example.com",
        )
        .await;

        assert_eq!(location(&response), "/profile/");
        let notices = notices_of(&response);
        assert_eq!(notices[0].level, Level::Warning);
        assert_eq!(notices[0].message, NO_CHANGES);
        assert_eq!(
            test.state.repo.find_user(user.id).await.unwrap().unwrap(),
            user
        );
    }

    #[tokio::test]
    async fn test_names_only() {
        let test = state();
        let user = create_user(&test.state, "sasha", true).await;
        let cookie = session_cookie(&test.state, &user);

        make_request(
            app(test.state.clone()),
            Method::POST,
            "/profile/",
            Some(&cookie),
            "first_name=Sasha&last_name=Grey&email=sasha%40example.com",
        )
        .await;

        let stored = test.state.repo.find_user(user.id).await.unwrap().unwrap();
        assert_eq!(stored.first_name, "Sasha");
        assert_eq!(stored.last_name, "Grey");
        assert!(
            test.state
                .repo
                .find_pending_email(user.id)
                .await
                .unwrap()
                .is_none()
        );
        assert!(test.mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn test_email_taken() {
        let test = state();
        let user = create_user(&test.state, "sasha", true).await;
        create_user(&test.state, "kim", true).await;
        let cookie = session_cookie(&test.state, &user);

        let response = make_request(
            app(test.state.clone()),
            Method::POST,
            "/profile/",
            Some(&cookie),
            "first_name=Sasha&last_name=&email=kim%40example.com",
        )
        .await;

        assert_eq!(notices_of(&response)[0].message, EMAIL_TAKEN);
        let stored = test.state.repo.find_user(user.id).await.unwrap().unwrap();
        assert_eq!(stored, user);
        assert!(
            test.state
                .repo
                .find_pending_email(user.id)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_email_change_flow() {
        let test = state();
        let user = create_user(&test.state, "sasha", true).await;
        let cookie = session_cookie(&test.state, &user);

        for email in ["first%40example.com", "second%40example.com"] {
            let response = make_request(
                app(test.state.clone()),
                Method::POST,
                "/profile/",
                Some(&cookie),
                &format!("first_name=&last_name=&email={email}"),
            )
            .await;
            assert_eq!(notices_of(&response)[0].level, Level::Info);
        }

        // Pending, not applied.
        let stored = test.state.repo.find_user(user.id).await.unwrap().unwrap();
        assert_eq!(stored.email, "sasha@example.com");
        assert_eq!(
            test.state
                .repo
                .find_pending_email(user.id)
                .await
                .unwrap()
                .unwrap()
                .email,
            "second@example.com"
        );

        let sent = test.mailer.wait_for(2).await;
        let mail = sent
            .iter()
            .find(|mail| mail.to == "second@example.com")
            .unwrap();
        let (uid, token) = link_parts(&mail.body, "/profile/edit/confirm/");
        let link = format!("/profile/edit/confirm/{uid}/{token}/");

        // Links work while signed out.
        let response =
            make_request(app(test.state.clone()), Method::GET, &link, None, "")
                .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/profile/");
        assert_eq!(notices_of(&response)[0].message, EMAIL_CHANGED);

        let stored = test.state.repo.find_user(user.id).await.unwrap().unwrap();
        assert_eq!(stored.email, "second@example.com");
        assert!(
            test.state
                .repo
                .find_pending_email(user.id)
                .await
                .unwrap()
                .is_none()
        );

        let response =
            make_request(app(test.state.clone()), Method::GET, &link, None, "")
                .await;
        assert_eq!(notices_of(&response)[0].message, EMAIL_CHANGE_FAILED);
    }

    #[tokio::test]
    async fn test_confirm_failures() {
        let test = state();
        let user = create_user(&test.state, "sasha", true).await;
        let uid = encode_uid(user.id);
        let token =
            test.state.tokens.make_token(&user, TokenPurpose::EmailChange);

        // No pending row.
        let response = make_request(
            app(test.state.clone()),
            Method::GET,
            &format!("/profile/edit/confirm/{uid}/{token}/"),
            None,
            "",
        )
        .await;
        assert_eq!(notices_of(&response)[0].message, EMAIL_CHANGE_FAILED);

        // Address claimed meanwhile.
        test.state
            .repo
            .save_pending_email(&EditEmail {
                user_id: user.id,
                email: "kim@example.com".into(),
            })
            .await
            .unwrap();
        create_user(&test.state, "kim", true).await;

        for link in [
            format!("/profile/edit/confirm/{uid}/{token}/"),
            format!("/profile/edit/confirm/{uid}/0-00/"),
            format!("/profile/edit/confirm/bad!uid/{token}/"),
        ] {
            let response = make_request(
                app(test.state.clone()),
                Method::GET,
                &link,
                None,
                "",
            )
            .await;
            assert_eq!(notices_of(&response)[0].message, EMAIL_CHANGE_FAILED);
        }

        let stored = test.state.repo.find_user(user.id).await.unwrap().unwrap();
        assert_eq!(stored.email, "sasha@example.com");
    }

    #[tokio::test]
    async fn test_requires_login() {
        let test = state();
        let response = make_request(
            app(test.state.clone()),
            Method::POST,
            "/profile/",
            None,
            "first_name=&last_name=&email=sasha%40example.com",
        )
        .await;

        assert_eq!(location(&response), "/");
        assert_eq!(notices_of(&response)[0].level, Level::Warning);
    }
}
