//! Account registration and activation.

use axum::extract::{Extension, Path, State};
use axum::response::{IntoResponse, Redirect, Response};
use axum_extra::extract::CookieJar;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::AppState;
use crate::error::{Result, ServerError};
use crate::flash::Flash;
use crate::mail::Email;
use crate::middleware::Visitor;
use crate::profile::ThemeChanger;
use crate::router::{Submission, ValidForm, render, send_mail};
use crate::token::{TokenPurpose, decode_uid, encode_uid};
use crate::user::{User, UserBuilder};

pub const ALREADY_REGISTERED: &str = "You are already registered.";
pub const USERNAME_TAKEN: &str = "A user with this username already exists.";
pub const EMAIL_TAKEN: &str = "This email is linked to another account.";
pub const ACTIVATION_FAILED: &str = "Unable to confirm account registration.";
const ACTIVATION_SENT: &str = "We sent you an email with instructions to activate your account. \
     Access to your account is limited until then.";
const ACTIVATED: &str = "You have successfully registered.";

/// Letters, digits and `@.+-_`.
pub fn validate_username(username: &str) -> std::result::Result<(), ValidationError> {
    if username
        .chars()
        .all(|c| c.is_alphanumeric() || "@.+-_".contains(c))
    {
        Ok(())
    } else {
        Err(ValidationError::new("username"))
    }
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct Body {
    #[validate(
        length(
            min = 1,
            max = 20,
            message = "Username must contain between 1 and 20 characters."
        ),
        custom(
            function = "validate_username",
            message = "Username may only contain letters, digits and @/./+/-/_."
        )
    )]
    pub username: String,
    #[validate(length(
        min = 3,
        max = 20,
        message = "Password must contain between 3 and 20 characters."
    ))]
    pub password: String,
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

/// Registration page.
pub async fn page(
    State(state): State<AppState>,
    Extension(Visitor(visitor)): Extension<Visitor>,
    flash: Flash,
) -> Result<Response> {
    if visitor.is_some() {
        return Ok(
            (flash.warning(ALREADY_REGISTERED), Redirect::to("/")).into_response()
        );
    }

    Ok(render(&state, None, flash, "registration", ())
        .await?
        .into_response())
}

/// Handler to create an inactive account and send the activation link.
pub async fn handler(
    State(state): State<AppState>,
    Extension(Visitor(visitor)): Extension<Visitor>,
    flash: Flash,
    ValidForm(body): ValidForm<Body>,
) -> Result<impl IntoResponse> {
    if visitor.is_some() {
        return Ok((flash.warning(ALREADY_REGISTERED), Redirect::to("/")));
    }

    let back = Redirect::to("/profile/reg/");

    if state.repo.username_exists(&body.username).await? {
        return Ok((flash.error(USERNAME_TAKEN), back));
    }

    if state.repo.email_taken(body.email.trim(), None).await? {
        return Ok((flash.error(EMAIL_TAKEN), back));
    }

    let password = state.crypto.pwd.hash_password(&body.password)?;
    let new_user = UserBuilder::new()
        .username(body.username)
        .email(body.email)
        .password(password)
        .first_name(Some(body.first_name))
        .last_name(Some(body.last_name))
        .active(false)
        .build();

    let user = match state.repo.insert_user(new_user).await {
        // Lost a race with a concurrent registration.
        Err(ServerError::UsernameTaken) => {
            return Ok((flash.error(USERNAME_TAKEN), back));
        },
        result => result?,
    };
    state.repo.save_theme(&ThemeChanger::new(user.id)).await?;

    metrics::counter!("accounts_created_total").increment(1);
    tracing::info!(user_id = user.id, username = %user.username, "account created");

    let flash = send_mail(
        &state,
        flash.info(ACTIVATION_SENT),
        activation_email(&state, &user),
    );

    Ok((flash, Redirect::to("/")))
}

fn activation_email(state: &AppState, user: &User) -> Email {
    let token = state.tokens.make_token(user, TokenPurpose::Activation);
    let link = state.config.link(&format!(
        "profile/activate/{}/{token}/",
        encode_uid(user.id)
    ));

    Email {
        to: user.email.clone(),
        subject: format!("Activate your account on {}", state.config.name),
        body: format!(
            "Hello {},\n\nfollow this link to activate your account:\n{link}\n",
            user.username
        ),
    }
}

/// Redeem an activation link and sign the user in.
pub async fn activate(
    State(state): State<AppState>,
    Path((uidb64, token)): Path<(String, String)>,
    jar: CookieJar,
    flash: Flash,
) -> Result<Response> {
    let user = match decode_uid(&uidb64) {
        Some(id) => state.repo.find_user(id).await?,
        None => None,
    };

    let Some(mut user) = user.filter(|user| {
        !user.is_blocked
            && state
                .tokens
                .check_token(user, TokenPurpose::Activation, &token)
                .is_ok()
    }) else {
        tracing::debug!(%uidb64, "activation link refused");
        return Ok(
            (flash.error(ACTIVATION_FAILED), Redirect::to("/")).into_response()
        );
    };

    user.is_active = true;
    user.last_login = Some(Utc::now());
    state.repo.update_user(&user).await?;

    tracing::info!(user_id = user.id, "account activated");

    let jar = jar.add(state.session.cookie(state.session.create(&user)?));

    Ok((jar, flash.success(ACTIVATED), Redirect::to("/")).into_response())
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};

    use super::*;
    use crate::error::INVALID_FORM;
    use crate::flash::Level;
    use crate::flash::tests::notices_of;
    use crate::repository::Repository;
    use crate::router::tests::*;
    use crate::{app, make_request};

    const FORM: &str = "username=sasha&password=secret&first_name=Sasha&last_name=&email=sasha%40example.com";

    #[test]
    fn test_validate_username() {
        assert!(validate_username("sasha.b+1@home-x_y").is_ok());
        assert!(validate_username("Саша").is_ok());
        assert!(validate_username("sasha b").is_err());
        assert!(validate_username("sasha!").is_err());
    }

    #[tokio::test]
    async fn test_register_and_activate_once() {
        let test = state();

        let response = make_request(
            app(test.state.clone()),
            Method::POST,
            "/profile/reg/",
            None,
            FORM,
        )
        .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/");
        assert_eq!(notices_of(&response)[0].level, Level::Info);

        let user = test
            .state
            .repo
            .find_user_by_username("sasha")
            .await
            .unwrap()
            .unwrap();
        assert!(!user.is_active);
        assert_eq!(user.first_name, "Sasha");
        assert!(test.state.repo.find_theme(user.id).await.unwrap().is_some());

        let sent = test.mailer.wait_for(1).await;
        assert_eq!(sent[0].to, "sasha@example.com");
        let (uid, token) = link_parts(&sent[0].body, "/profile/activate/");
        let link = format!("/profile/activate/{uid}/{token}/");

        let response =
            make_request(app(test.state.clone()), Method::GET, &link, None, "")
                .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(notices_of(&response)[0].message, ACTIVATED);
        assert!(issued_session(&response).is_some());

        let user = test.state.repo.find_user(user.id).await.unwrap().unwrap();
        assert!(user.is_active);
        assert!(user.last_login.is_some());

        // Activation changed the state the token was bound to.
        let response =
            make_request(app(test.state.clone()), Method::GET, &link, None, "")
                .await;
        assert_eq!(notices_of(&response)[0].message, ACTIVATION_FAILED);
        assert!(issued_session(&response).is_none());
    }

    #[tokio::test]
    async fn test_mail_queue_full() {
        let test = stalled_state();

        let mut last = Vec::new();
        for name in ["sasha", "kim", "malik"] {
            let response = make_request(
                app(test.state.clone()),
                Method::POST,
                "/profile/reg/",
                None,
                &format!("username={name}&password=secret&email={name}%40example.com"),
            )
            .await;
            assert_eq!(location(&response), "/");
            last = notices_of(&response);
        }

        // The account exists even though its email could not be queued.
        assert_eq!(test.state.repo.count_users().await.unwrap(), 3);
        assert_eq!(last[0].message, ACTIVATION_SENT);
        assert_eq!(last[1].level, Level::Warning);
        assert_eq!(last[1].message, crate::router::MAIL_DELAYED);
    }

    #[tokio::test]
    async fn test_duplicate_username() {
        let test = state();
        create_user(&test.state, "sasha", true).await;

        let response = make_request(
            app(test.state.clone()),
            Method::POST,
            "/profile/reg/",
            None,
            "username=sasha&password=secret&email=other%40example.com",
        )
        .await;

        assert_eq!(location(&response), "/profile/reg/");
        assert_eq!(notices_of(&response)[0].message, USERNAME_TAKEN);
        assert_eq!(test.state.repo.count_users().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_email() {
        let test = state();
        create_user(&test.state, "kim", true).await;

        let response = make_request(
            app(test.state.clone()),
            Method::POST,
            "/profile/reg/",
            None,
            "username=sasha&password=secret&email=KIM%40example.com",
        )
        .await;

        assert_eq!(notices_of(&response)[0].message, EMAIL_TAKEN);
        assert_eq!(test.state.repo.count_users().await.unwrap(), 1);
        assert!(test.mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_form() {
        let test = state();

        for form in [
            "username=sasha&password=pw&email=sasha%40example.com",
            "username=sasha&password=secret&email=not-an-email",
            "username=with%20space&password=secret&email=sasha%40example.com",
            "username=aaaaaaaaaaaaaaaaaaaaa&password=secret&email=sasha%40example.com",
        ] {
            let response = make_request(
                app(test.state.clone()),
                Method::POST,
                "/profile/reg/",
                None,
                form,
            )
            .await;

            assert_eq!(location(&response), "/profile/reg/");
            assert_eq!(notices_of(&response)[0].message, INVALID_FORM);
        }

        assert_eq!(test.state.repo.count_users().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_missing_field_is_bad_request() {
        let test = state();
        let response = make_request(
            app(test.state.clone()),
            Method::POST,
            "/profile/reg/",
            None,
            "username=sasha",
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_already_registered() {
        let test = state();
        let user = create_user(&test.state, "sasha", true).await;
        let cookie = session_cookie(&test.state, &user);

        for method in [Method::GET, Method::POST] {
            let response = make_request(
                app(test.state.clone()),
                method,
                "/profile/reg/",
                Some(&cookie),
                FORM,
            )
            .await;

            assert_eq!(location(&response), "/");
            assert_eq!(notices_of(&response)[0].message, ALREADY_REGISTERED);
        }
        assert_eq!(test.state.repo.count_users().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_activation_refused() {
        let test = state();
        let mut user = create_user(&test.state, "sasha", false).await;
        let token = test.state.tokens.make_token(&user, TokenPurpose::Activation);
        let uid = encode_uid(user.id);

        for link in [
            format!("/profile/activate/{uid}/{token}x/"),
            format!("/profile/activate/garbage!/{token}/"),
            format!("/profile/activate/{}/{token}/", encode_uid(999)),
            format!(
                "/profile/activate/{uid}/{}/",
                test.state.tokens.make_token(&user, TokenPurpose::EmailChange)
            ),
        ] {
            let response = make_request(
                app(test.state.clone()),
                Method::GET,
                &link,
                None,
                "",
            )
            .await;
            assert_eq!(notices_of(&response)[0].message, ACTIVATION_FAILED);
        }

        user.is_blocked = true;
        test.state.repo.update_user(&user).await.unwrap();
        let token = test.state.tokens.make_token(&user, TokenPurpose::Activation);
        let response = make_request(
            app(test.state.clone()),
            Method::GET,
            &format!("/profile/activate/{uid}/{token}/"),
            None,
            "",
        )
        .await;
        assert_eq!(notices_of(&response)[0].message, ACTIVATION_FAILED);
        assert!(
            !test
                .state
                .repo
                .find_user(user.id)
                .await
                .unwrap()
                .unwrap()
                .is_active
        );
    }
}
