//! HTTP handlers.
pub mod admin;
pub mod login;
pub mod pages;
pub mod profile;
pub mod register;
pub mod reset;
pub mod status;

use axum::Json;
use axum::extract::{Form, FromRequest, Request};
use serde::Serialize;
use serde::de::DeserializeOwned;
use validator::Validate;

use crate::AppState;
use crate::error::{Result, ServerError};
use crate::flash::{Flash, Notice};
use crate::mail::Email;
use crate::profile::{Background, Theme};
use crate::user::User;

pub const DEFAULT_AVATAR: &str = "/static/default.jpg";
const MAIL_DELAYED: &str = "The email may be delayed.";

/// Form body decoded from `application/x-www-form-urlencoded`.
pub trait Submission: DeserializeOwned + Validate {
    /// Page the visitor returns to when validation fails.
    fn back(path: &str) -> String {
        path.to_owned()
    }
}

/// Decoded and validated form.
///
/// Undecodable bodies are rejected with a problem document; rule violations
/// redirect back with error notices.
#[derive(Debug)]
pub struct ValidForm<T>(pub T);

impl<T, S> FromRequest<S> for ValidForm<T>
where
    T: Submission,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request(
        req: Request,
        state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        let path = req.uri().path().to_owned();
        let flash = Flash::from_headers(req.headers());
        let Form(value) = Form::<T>::from_request(req, state)
            .await
            .map_err(|err| ServerError::ParsingForm(Box::new(err)))?;

        value.validate().map_err(|errors| ServerError::InvalidForm {
            back: T::back(&path),
            errors,
            flash,
        })?;

        Ok(Self(value))
    }
}

/// Values shared by every page.
#[derive(Debug, Serialize)]
pub struct BaseContext {
    pub user: Option<User>,
    pub theme: Theme,
    pub bg_theme: Background,
    /// Avatar URL, only for signed in visitors.
    pub avatar: Option<String>,
    pub default_avatar: Option<bool>,
    pub notices: Vec<Notice>,
}

/// Document returned by page endpoints.
#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub page: &'static str,
    #[serde(flatten)]
    pub context: BaseContext,
    pub content: T,
}

/// Build the base context, draining pending notices.
pub async fn base_context(
    state: &AppState,
    user: Option<&User>,
    flash: &mut Flash,
) -> Result<BaseContext> {
    let mut context = BaseContext {
        user: user.cloned(),
        theme: Theme::default(),
        bg_theme: Background::default(),
        avatar: None,
        default_avatar: None,
        notices: flash.take(),
    };

    if let Some(user) = user {
        let preference = state.repo.get_or_create_theme(user.id).await?;
        context.theme = preference.theme;
        context.bg_theme = preference.background_theme;

        let avatar = state.repo.find_avatar(user.id).await?;
        context.default_avatar = Some(avatar.is_none());
        context.avatar = Some(
            avatar
                .map(|avatar| avatar.url)
                .unwrap_or_else(|| DEFAULT_AVATAR.to_owned()),
        );
    }

    Ok(context)
}

/// Render a page document.
pub async fn render<T: Serialize>(
    state: &AppState,
    user: Option<&User>,
    mut flash: Flash,
    page: &'static str,
    content: T,
) -> Result<(Flash, Json<Page<T>>)> {
    let context = base_context(state, user, &mut flash).await?;

    Ok((
        flash,
        Json(Page {
            page,
            context,
            content,
        }),
    ))
}

/// Queue an email, warning the visitor when it cannot be queued.
pub fn send_mail(state: &AppState, flash: Flash, email: Email) -> Flash {
    match state.mail.dispatch(email) {
        Ok(()) => flash,
        Err(_) => flash.warning(MAIL_DELAYED),
    }
}
