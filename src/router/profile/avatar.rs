//! Avatar upload and removal.

use axum::extract::{Extension, Multipart, State};
use axum::response::{IntoResponse, Redirect};

use crate::AppState;
use crate::avatar::{self, AvatarError, Upload};
use crate::error::Result;
use crate::flash::Flash;
use crate::profile::UserAvatar;
use crate::user::User;

const FIELD: &str = "image";
const UPLOADED: &str = "Your avatar was updated.";
const REMOVED: &str = "Your avatar was removed.";
const NOTHING_TO_REMOVE: &str = "You do not have an avatar.";

/// Read the `image` field, skipping any other.
async fn read_upload(multipart: &mut Multipart) -> Result<Option<Upload>> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FIELD) {
            continue;
        }

        let content_type = field
            .content_type()
            .map(|mime| mime.to_ascii_lowercase())
            .unwrap_or_default();
        let bytes = field.bytes().await?;

        if bytes.is_empty() {
            return Ok(None);
        }

        return Ok(Some(Upload {
            content_type,
            bytes: bytes.to_vec(),
        }));
    }

    Ok(None)
}

/// Handler to replace the avatar of the current user.
pub async fn upload(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    flash: Flash,
    mut multipart: Multipart,
) -> Result<impl IntoResponse> {
    let back = Redirect::to("/profile/");

    let checked = read_upload(&mut multipart)
        .await?
        .ok_or(AvatarError::Missing)
        .and_then(|upload| avatar::check(&upload).map(|_| upload));
    let upload = match checked {
        Ok(upload) => upload,
        Err(err) => {
            tracing::debug!(user_id = user.id, error = ?err, "avatar refused");
            return Ok((flash.error(err.to_string()), back));
        },
    };

    let stored = state
        .storage
        .put(&upload.bytes, &upload.content_type)
        .await?;
    let previous = state
        .repo
        .replace_avatar(&UserAvatar {
            user_id: user.id,
            url: stored.url,
            key: stored.key,
        })
        .await?;

    if let Some(previous) = previous {
        if let Err(err) = state.storage.delete(&previous.key).await {
            tracing::warn!(key = %previous.key, error = %err, "previous avatar left in storage");
        }
    }

    tracing::info!(user_id = user.id, "avatar updated");

    Ok((flash.success(UPLOADED), back))
}

/// Handler to go back to the default avatar.
pub async fn remove(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    flash: Flash,
) -> Result<impl IntoResponse> {
    let back = Redirect::to("/profile/");

    let Some(avatar) = state.repo.delete_avatar(user.id).await? else {
        return Ok((flash.info(NOTHING_TO_REMOVE), back));
    };

    if let Err(err) = state.storage.delete(&avatar.key).await {
        tracing::warn!(key = %avatar.key, error = %err, "removed avatar left in storage");
    }

    Ok((flash.success(REMOVED), back))
}

#[cfg(test)]
mod tests {
    use axum::Router;
    use axum::body::Body;
    use axum::extract::Request;
    use axum::http::{Method, Response, StatusCode, header};
    use tower::util::ServiceExt;

    use super::*;
    use crate::avatar::tests::png;
    use crate::flash::Level;
    use crate::flash::tests::notices_of;
    use crate::repository::Repository;
    use crate::router::DEFAULT_AVATAR;
    use crate::router::tests::*;
    use crate::{app, make_request};

    const BOUNDARY: &str = "hearth-boundary";

    async fn send_file(
        app: Router,
        cookie: &str,
        name: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> Response<Body> {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; \
             filename=\"avatar\"\r\nContent-Type: {content_type}\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        let request = Request::builder()
            .method(Method::POST)
            .uri("/profile/avatar/")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .header(header::COOKIE, cookie)
            .body(Body::from(body))
            .unwrap();

        app.oneshot(request).await.unwrap()
    }

    #[tokio::test]
    async fn test_upload_replaces_previous() {
        let test = state();
        let user = create_user(&test.state, "sasha", true).await;
        let cookie = session_cookie(&test.state, &user);

        let response = send_file(
            app(test.state.clone()),
            &cookie,
            "image",
            "image/png",
            &png(32, 32),
        )
        .await;
        assert_eq!(location(&response), "/profile/");
        assert_eq!(notices_of(&response)[0].message, UPLOADED);
        let first = test.state.repo.find_avatar(user.id).await.unwrap().unwrap();
        assert!(test.media.path().join(&first.key).is_file());

        send_file(
            app(test.state.clone()),
            &cookie,
            "image",
            "image/png",
            &png(16, 16),
        )
        .await;
        let second =
            test.state.repo.find_avatar(user.id).await.unwrap().unwrap();
        assert_ne!(first.key, second.key);
        assert!(!test.media.path().join(&first.key).exists());
        assert!(test.media.path().join(&second.key).is_file());

        // Pages now point at the upload.
        let response = make_request(
            app(test.state.clone()),
            Method::GET,
            "/profile/",
            Some(&cookie),
            "",
        )
        .await;
        let body = json_body(response).await;
        assert_eq!(body["avatar"], second.url.as_str());
        assert_eq!(body["default_avatar"], false);
    }

    #[tokio::test]
    async fn test_refused_uploads() {
        let test = state();
        let user = create_user(&test.state, "sasha", true).await;
        let cookie = session_cookie(&test.state, &user);

        for (name, content_type, bytes, error) in [
            ("image", "image/gif", png(8, 8), AvatarError::UnsupportedType),
            ("image", "image/png", png(1601, 1), AvatarError::Dimensions),
            ("other", "image/png", png(8, 8), AvatarError::Missing),
        ] {
            let response = send_file(
                app(test.state.clone()),
                &cookie,
                name,
                content_type,
                &bytes,
            )
            .await;

            assert_eq!(response.status(), StatusCode::SEE_OTHER);
            let notices = notices_of(&response);
            assert_eq!(notices[0].level, Level::Error);
            assert_eq!(notices[0].message, error.to_string());
        }

        assert!(test.state.repo.find_avatar(user.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remove() {
        let test = state();
        let user = create_user(&test.state, "sasha", true).await;
        let cookie = session_cookie(&test.state, &user);

        let response = make_request(
            app(test.state.clone()),
            Method::POST,
            "/profile/avatar/remove/",
            Some(&cookie),
            "",
        )
        .await;
        assert_eq!(notices_of(&response)[0].message, NOTHING_TO_REMOVE);

        send_file(
            app(test.state.clone()),
            &cookie,
            "image",
            "image/png",
            &png(8, 8),
        )
        .await;
        let stored =
            test.state.repo.find_avatar(user.id).await.unwrap().unwrap();

        let response = make_request(
            app(test.state.clone()),
            Method::POST,
            "/profile/avatar/remove/",
            Some(&cookie),
            "",
        )
        .await;
        assert_eq!(notices_of(&response)[0].message, REMOVED);
        assert!(test.state.repo.find_avatar(user.id).await.unwrap().is_none());
        assert!(!test.media.path().join(&stored.key).exists());

        let response = make_request(
            app(test.state.clone()),
            Method::GET,
            "/profile/",
            Some(&cookie),
            "",
        )
        .await;
        let body = json_body(response).await;
        assert_eq!(body["avatar"], DEFAULT_AVATAR);
        assert_eq!(body["default_avatar"], true);
    }
}
