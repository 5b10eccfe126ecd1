//! Theme preference.

use axum::extract::{Extension, State};
use axum::response::{IntoResponse, Redirect};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::AppState;
use crate::error::{Result, ServerError};
use crate::flash::Flash;
use crate::profile::{Background, Theme, ThemeChanger};
use crate::router::{Submission, ValidForm, render};
use crate::user::User;

const SAVED: &str = "Your theme was saved.";

fn validate_theme(theme: &str) -> std::result::Result<(), ValidationError> {
    theme
        .parse::<Theme>()
        .map(|_| ())
        .map_err(|_| ValidationError::new("theme"))
}

fn validate_background(
    background: &str,
) -> std::result::Result<(), ValidationError> {
    background
        .parse::<Background>()
        .map(|_| ())
        .map_err(|_| ValidationError::new("bg_theme"))
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct Body {
    #[validate(custom(function = "validate_theme", message = "Unknown theme."))]
    pub theme: String,
    #[validate(custom(
        function = "validate_background",
        message = "Unknown background."
    ))]
    pub bg_theme: String,
}

impl Submission for Body {}

#[derive(Debug, Serialize)]
pub struct Content {
    current: ThemeChanger,
    themes: [Theme; 8],
    backgrounds: [Background; 2],
}

pub async fn page(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    flash: Flash,
) -> Result<impl IntoResponse> {
    let content = Content {
        current: state.repo.get_or_create_theme(user.id).await?,
        themes: Theme::ALL,
        backgrounds: Background::ALL,
    };

    render(&state, Some(&user), flash, "themes", content).await
}

/// Handler to overwrite both theme values.
pub async fn handler(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    flash: Flash,
    ValidForm(body): ValidForm<Body>,
) -> Result<impl IntoResponse> {
    let preference = ThemeChanger {
        user_id: user.id,
        theme: body
            .theme
            .parse()
            .map_err(|err| ServerError::internal("unchecked theme", err))?,
        background_theme: body
            .bg_theme
            .parse()
            .map_err(|err| ServerError::internal("unchecked background", err))?,
    };
    state.repo.save_theme(&preference).await?;

    tracing::debug!(user_id = user.id, theme = %preference.theme, "theme saved");

    Ok((flash.success(SAVED), Redirect::to("/profile/themes/")))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};

    use super::*;
    use crate::error::INVALID_FORM;
    use crate::flash::tests::notices_of;
    use crate::repository::Repository;
    use crate::router::tests::*;
    use crate::{app, make_request};

    #[tokio::test]
    async fn test_page_creates_default() {
        let test = state();
        let user = create_user(&test.state, "sasha", true).await;
        let cookie = session_cookie(&test.state, &user);

        let response = make_request(
            app(test.state.clone()),
            Method::GET,
            "/profile/themes/",
            Some(&cookie),
            "",
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["content"]["current"]["theme"], "primary");
        assert_eq!(body["content"]["current"]["background_theme"], "light");
        assert_eq!(body["content"]["themes"].as_array().unwrap().len(), 8);
        assert!(test.state.repo.find_theme(user.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_update_in_place() {
        let test = state();
        let user = create_user(&test.state, "sasha", true).await;
        let cookie = session_cookie(&test.state, &user);

        for (theme, background) in [("red", "dark"), ("aqua", "light")] {
            let response = make_request(
                app(test.state.clone()),
                Method::POST,
                "/profile/themes/",
                Some(&cookie),
                &format!("theme={theme}&bg_theme={background}"),
            )
            .await;
            assert_eq!(location(&response), "/profile/themes/");
        }

        assert_eq!(
            test.state.repo.find_theme(user.id).await.unwrap(),
            Some(ThemeChanger {
                user_id: user.id,
                theme: Theme::Aqua,
                background_theme: Background::Light,
            })
        );
    }

    #[tokio::test]
    async fn test_unknown_choice() {
        let test = state();
        let user = create_user(&test.state, "sasha", true).await;
        let cookie = session_cookie(&test.state, &user);

        let response = make_request(
            app(test.state.clone()),
            Method::POST,
            "/profile/themes/",
            Some(&cookie),
            "theme=purple&bg_theme=dark",
        )
        .await;

        assert_eq!(location(&response), "/profile/themes/");
        let notices = notices_of(&response);
        assert_eq!(notices[0].message, INVALID_FORM);
        assert_eq!(notices[1].message, "Unknown theme.");
        assert!(test.state.repo.find_theme(user.id).await.unwrap().is_none());
    }
}
