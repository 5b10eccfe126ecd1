//! Profile pages of the signed in user.
pub mod avatar;
pub mod edit;
pub mod password;
pub mod theme;

use axum::Router;
use axum::routing::{get, post};

use crate::AppState;

/// Routes behind the login guard. Email confirmation is routed apart since
/// links may be opened while signed out.
pub fn router() -> Router<AppState> {
    Router::new()
        // `GET|POST /profile/` goes to `edit`.
        .route("/profile/", get(edit::page).post(edit::handler))
        .route(
            "/profile/password/",
            get(password::page).post(password::handler),
        )
        .route("/profile/themes/", get(theme::page).post(theme::handler))
        .route("/profile/avatar/", post(avatar::upload))
        .route("/profile/avatar/remove/", post(avatar::remove))
}
