//! Session resolution and access guards.

use axum::extract::{Extension, Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum_extra::extract::CookieJar;

use crate::error::{Result, ServerError};
use crate::flash::Flash;
use crate::session::SESSION_COOKIE;
use crate::user::User;
use crate::AppState;

/// Visitor of the current request, `None` when anonymous.
#[derive(Clone, Debug, Default)]
pub struct Visitor(pub Option<User>);

/// Outcome of reading the session cookie.
enum Resolved {
    Anonymous,
    User(User),
    /// Cookie present but no longer valid.
    Stale,
}

async fn resolve(state: &AppState, token: &str) -> Result<Resolved> {
    let Ok(claims) = state.session.decode(token) else {
        return Ok(Resolved::Stale);
    };
    let Some(user_id) = claims.user_id() else {
        return Ok(Resolved::Stale);
    };

    match state.repo.find_user(user_id).await? {
        Some(user)
            if user.can_login() && state.session.is_current(&claims, &user) =>
        {
            Ok(Resolved::User(user))
        },
        _ => {
            tracing::debug!(user_id, "session dropped");
            Ok(Resolved::Stale)
        },
    }
}

/// Attach a [`Visitor`] to every request.
pub async fn session(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Result<Response> {
    let resolved = match jar.get(SESSION_COOKIE) {
        Some(cookie) => resolve(&state, cookie.value()).await?,
        None => Resolved::Anonymous,
    };

    let (visitor, stale) = match resolved {
        Resolved::User(user) => (Some(user), false),
        Resolved::Anonymous => (None, false),
        Resolved::Stale => (None, true),
    };
    req.extensions_mut().insert(Visitor(visitor));

    let response = next.run(req).await;

    // Keep any session the handler just issued.
    if stale && !sets_session(&response) {
        return Ok(
            (jar.remove(state.session.removal()), response).into_response()
        );
    }

    Ok(response)
}

fn sets_session(response: &Response) -> bool {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .any(|value| value.starts_with(&format!("{SESSION_COOKIE}=")))
}

/// Reject anonymous visitors, expose the [`User`] as an extension.
pub async fn require_login(
    Extension(visitor): Extension<Visitor>,
    flash: Flash,
    mut req: Request,
    next: Next,
) -> Result<Response> {
    let Visitor(Some(user)) = visitor else {
        return Err(ServerError::Unauthorized(flash));
    };

    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

/// Only staff superusers may go further.
pub async fn require_admin(
    Extension(visitor): Extension<Visitor>,
    flash: Flash,
    mut req: Request,
    next: Next,
) -> Result<Response> {
    let Visitor(Some(user)) = visitor else {
        return Err(ServerError::Unauthorized(flash));
    };

    if !user.is_admin() {
        tracing::warn!(user_id = user.id, path = %req.uri().path(), "admin access denied");
        return Err(ServerError::Forbidden(flash));
    }

    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}
