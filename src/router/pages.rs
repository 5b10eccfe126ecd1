//! Content pages without forms.

use axum::extract::{Extension, State};
use axum::response::IntoResponse;

use crate::AppState;
use crate::error::Result;
use crate::flash::Flash;
use crate::middleware::Visitor;
use crate::router::render;
use crate::user::User;

/// Landing page, open to everyone.
pub async fn index(
    State(state): State<AppState>,
    Extension(Visitor(visitor)): Extension<Visitor>,
    flash: Flash,
) -> Result<impl IntoResponse> {
    render(&state, visitor.as_ref(), flash, "index", ()).await
}

pub async fn works(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    flash: Flash,
) -> Result<impl IntoResponse> {
    render(&state, Some(&user), flash, "works", ()).await
}

pub async fn equations(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    flash: Flash,
) -> Result<impl IntoResponse> {
    render(&state, Some(&user), flash, "equations", ()).await
}

pub async fn show(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    flash: Flash,
) -> Result<impl IntoResponse> {
    render(&state, Some(&user), flash, "show", ()).await
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};

    use crate::flash::Level;
    use crate::flash::tests::notices_of;
    use crate::profile::{Background, Theme, ThemeChanger};
    use crate::router::tests::*;
    use crate::*;

    #[tokio::test]
    async fn test_index_anonymous() {
        let test = state();
        let response =
            make_request(app(test.state.clone()), Method::GET, "/", None, "")
                .await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["page"], "index");
        assert_eq!(body["user"], serde_json::Value::Null);
        assert_eq!(body["theme"], "primary");
        assert_eq!(body["bg_theme"], "light");
        assert_eq!(body["avatar"], serde_json::Value::Null);
    }

    #[tokio::test]
    async fn test_index_creates_theme_lazily() {
        let test = state();
        let user = create_user(&test.state, "sasha", true).await;
        assert!(test.state.repo.find_theme(user.id).await.unwrap().is_none());

        let cookie = session_cookie(&test.state, &user);
        let response = make_request(
            app(test.state.clone()),
            Method::GET,
            "/",
            Some(&cookie),
            "",
        )
        .await;

        let body = json_body(response).await;
        assert_eq!(body["user"]["username"], "sasha");
        assert_eq!(body["avatar"], router::DEFAULT_AVATAR);
        assert_eq!(body["default_avatar"], true);
        assert_eq!(
            test.state.repo.find_theme(user.id).await.unwrap(),
            Some(ThemeChanger::new(user.id))
        );
    }

    #[tokio::test]
    async fn test_index_uses_saved_theme() {
        let test = state();
        let user = create_user(&test.state, "sasha", true).await;
        test.state
            .repo
            .save_theme(&ThemeChanger {
                user_id: user.id,
                theme: Theme::Claret,
                background_theme: Background::Dark,
            })
            .await
            .unwrap();

        let cookie = session_cookie(&test.state, &user);
        let body = json_body(
            make_request(
                app(test.state.clone()),
                Method::GET,
                "/",
                Some(&cookie),
                "",
            )
            .await,
        )
        .await;

        assert_eq!(body["theme"], "claret");
        assert_eq!(body["bg_theme"], "dark");
    }

    #[tokio::test]
    async fn test_members_pages_require_login() {
        let test = state();

        for path in ["/works/", "/equations/", "/works/show/"] {
            let response = make_request(
                app(test.state.clone()),
                Method::GET,
                path,
                None,
                "",
            )
            .await;

            assert_eq!(response.status(), StatusCode::SEE_OTHER);
            assert_eq!(location(&response), "/");
            assert_eq!(notices_of(&response)[0].level, Level::Warning);
        }

        let user = create_user(&test.state, "sasha", true).await;
        let cookie = session_cookie(&test.state, &user);
        let response = make_request(
            app(test.state.clone()),
            Method::GET,
            "/works/show/",
            Some(&cookie),
            "",
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["page"], "show");
    }

    #[tokio::test]
    async fn test_pending_notices_are_drained() {
        let test = state();
        let response = make_request(
            app(test.state.clone()),
            Method::GET,
            "/",
            // [{"level":"info","message":"hello"}]
            Some("flash=W3sibGV2ZWwiOiJpbmZvIiwibWVzc2FnZSI6ImhlbGxvIn1d"),
            "",
        )
        .await;

        assert!(notices_of(&response).is_empty());
        let body = json_body(response).await;
        assert_eq!(body["notices"][0]["message"], "hello");
    }
}
