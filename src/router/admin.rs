//! Admin console, reserved to staff superusers.

use axum::extract::{Extension, Path, Query, State};
use axum::middleware;
use axum::response::{IntoResponse, Redirect};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use crate::error::Result;
use crate::flash::Flash;
use crate::middleware::require_admin;
use crate::router::{Page, Submission, ValidForm, render};
use crate::user::User;

pub const USER_NOT_FOUND: &str = "User not found.";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/admin/", get(index))
        .route("/admin/users/", get(users).post(search))
        .route("/admin/make-admin/{user_id}", post(make_admin))
        .route("/admin/make-user/{user_id}", post(make_user))
        .route("/admin/block-user/{user_id}", post(block_user))
        .route("/admin/unblock-user/{user_id}", post(unblock_user))
        .route_layer(middleware::from_fn(require_admin))
}

#[derive(Debug, Serialize)]
struct Section {
    name: &'static str,
    url: &'static str,
}

const SECTIONS: [Section; 1] = [Section {
    name: "User management",
    url: "/admin/users/",
}];

async fn index(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    flash: Flash,
) -> Result<impl IntoResponse> {
    render(&state, Some(&user), flash, "admin", SECTIONS).await
}

#[derive(Debug, Default, Serialize, Deserialize, Validate)]
pub struct Search {
    /// Part of a username.
    #[serde(default)]
    #[validate(length(max = 20, message = "Search is too long."))]
    pub user: Option<String>,
}

impl Submission for Search {}

#[derive(Debug, Serialize)]
struct UserList {
    query: Option<String>,
    users: Vec<User>,
}

async fn list(
    state: &AppState,
    admin: &User,
    flash: Flash,
    query: Option<String>,
) -> Result<(Flash, Json<Page<UserList>>)> {
    let query = query
        .map(|needle| needle.trim().to_owned())
        .filter(|needle| !needle.is_empty());
    let users = state.repo.search_users(query.as_deref()).await?;

    render(state, Some(admin), flash, "admin_users", UserList { query, users })
        .await
}

async fn users(
    State(state): State<AppState>,
    Extension(admin): Extension<User>,
    flash: Flash,
    Query(search): Query<Search>,
) -> Result<impl IntoResponse> {
    list(&state, &admin, flash, search.user).await
}

async fn search(
    State(state): State<AppState>,
    Extension(admin): Extension<User>,
    flash: Flash,
    ValidForm(search): ValidForm<Search>,
) -> Result<impl IntoResponse> {
    list(&state, &admin, flash, search.user).await
}

/// Change applied to a target account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    MakeAdmin,
    MakeUser,
    Block,
    Unblock,
}

impl Action {
    fn label(self) -> &'static str {
        match self {
            Action::MakeAdmin => "make_admin",
            Action::MakeUser => "make_user",
            Action::Block => "block",
            Action::Unblock => "unblock",
        }
    }

    fn apply(self, user: &mut User) {
        match self {
            Action::MakeAdmin | Action::MakeUser => {
                let admin = self == Action::MakeAdmin;
                user.is_staff = admin;
                user.is_superuser = admin;
            },
            Action::Block => {
                user.is_blocked = true;
                user.is_active = false;
            },
            // Activation stamps `last_login`: never-activated accounts stay
            // inactive.
            Action::Unblock => {
                user.is_blocked = false;
                user.is_active = user.last_login.is_some();
            },
        }
    }

    fn done(self, username: &str) -> String {
        match self {
            Action::MakeAdmin => format!("{username} is now an administrator."),
            Action::MakeUser => format!("{username} is now a regular user."),
            Action::Block => format!("{username} was blocked."),
            Action::Unblock => format!("{username} was unblocked."),
        }
    }
}

async fn act(
    state: AppState,
    admin: User,
    flash: Flash,
    user_id: i64,
    action: Action,
) -> Result<(Flash, Redirect)> {
    let back = Redirect::to("/admin/users/");

    let Some(mut target) = state.repo.find_user(user_id).await? else {
        return Ok((flash.error(USER_NOT_FOUND), back));
    };

    action.apply(&mut target);
    state.repo.update_user(&target).await?;

    tracing::info!(
        actor = admin.id,
        target = target.id,
        action = action.label(),
        "admin action"
    );

    Ok((flash.success(action.done(&target.username)), back))
}

async fn make_admin(
    State(state): State<AppState>,
    Extension(admin): Extension<User>,
    flash: Flash,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse> {
    act(state, admin, flash, user_id, Action::MakeAdmin).await
}

async fn make_user(
    State(state): State<AppState>,
    Extension(admin): Extension<User>,
    flash: Flash,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse> {
    act(state, admin, flash, user_id, Action::MakeUser).await
}

async fn block_user(
    State(state): State<AppState>,
    Extension(admin): Extension<User>,
    flash: Flash,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse> {
    act(state, admin, flash, user_id, Action::Block).await
}

async fn unblock_user(
    State(state): State<AppState>,
    Extension(admin): Extension<User>,
    flash: Flash,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse> {
    act(state, admin, flash, user_id, Action::Unblock).await
}
