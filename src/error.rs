//! Error handler for hearth.

use axum::extract::multipart::MultipartError;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Redirect, Response};
use serde::Serialize;
use sqlx::Error as SQLxError;
use thiserror::Error;
use validator::ValidationErrors;

use crate::flash::{Flash, Level};

pub const INVALID_FORM: &str = "Invalid data in the form.";

pub type Result<T> = std::result::Result<T, ServerError>;

/// Enum representing server-side errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid form data")]
    InvalidForm {
        /// Page the visitor is sent back to.
        back: String,
        errors: ValidationErrors,
        /// Notices already pending, kept ahead of the form errors.
        flash: Flash,
    },

    #[error("error parsing form data")]
    ParsingForm(Box<dyn std::error::Error + Send + Sync>),

    #[error(transparent)]
    Multipart(#[from] MultipartError),

    #[error("SQL request failed: {0}")]
    Sql(#[from] SQLxError),

    #[error(transparent)]
    Crypto(#[from] crate::crypto::CryptoError),

    #[error(transparent)]
    Session(#[from] jsonwebtoken::errors::Error),

    #[error(transparent)]
    Storage(#[from] crate::storage::StorageError),

    #[error("internal server error, {details}")]
    Internal {
        details: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("username already exists")]
    UsernameTaken,

    #[error("authentication required")]
    Unauthorized(Flash),

    #[error("insufficient permissions")]
    Forbidden(Flash),
}

impl ServerError {
    /// Create an [`ServerError::Internal`] from any error.
    pub fn internal<E>(details: impl Into<String>, err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Internal {
            details: details.into(),
            source: Some(Box::new(err)),
        }
    }
}

/// Structure for detailed error responses.
#[derive(Debug, Serialize)]
pub struct ResponseError {
    r#type: Option<String>,
    title: String,
    status: u16,
    detail: String,
    instance: Option<String>,
}

impl ResponseError {
    /// Update error status code.
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code.as_u16();
        self
    }

    /// Update `title` field.
    pub fn title(mut self, title: &str) -> Self {
        self.title = title.into();
        self
    }

    /// Add detailed error.
    pub fn details(mut self, description: &str) -> Self {
        self.detail = description.into();
        self
    }

    /// Transform [`ResponseError`] into axum [`Response`].
    pub fn into_response(
        self,
    ) -> std::result::Result<Response, axum::http::Error> {
        if let Ok(body) = serde_json::to_string(&self) {
            Response::builder()
                .status(self.status)
                .header(header::CONTENT_TYPE, "application/problem+json")
                .body(body.into())
        } else {
            Ok(internal_server_error())
        }
    }
}

impl Default for ResponseError {
    fn default() -> Self {
        Self {
            r#type: None,
            title: "Internal server error.".to_owned(),
            status: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            detail: String::default(),
            instance: None,
        }
    }
}

/// Human readable messages attached to validation rules.
fn validation_messages(errors: &ValidationErrors) -> Vec<String> {
    let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
    fields.sort_by(|(a, _), (b, _)| a.cmp(b));

    fields
        .into_iter()
        .flat_map(|(_, issues)| issues.iter())
        .filter_map(|issue| issue.message.as_ref().map(|m| m.to_string()))
        .collect()
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let response = ResponseError::default()
            .title("Invalid data in the form.")
            .details(&self.to_string())
            .status(StatusCode::BAD_REQUEST);

        let response = match self {
            ServerError::InvalidForm {
                back,
                errors,
                mut flash,
            } => {
                tracing::debug!(%errors, "invalid form submitted");

                flash.push(Level::Error, INVALID_FORM);
                for message in validation_messages(&errors) {
                    flash.push(Level::Error, message);
                }

                return (flash, Redirect::to(&back)).into_response();
            },

            ServerError::ParsingForm(err) => response.details(&err.to_string()),

            ServerError::Multipart(err) => response
                .title("Invalid upload.")
                .details(&err.body_text())
                .status(err.status()),

            ServerError::UsernameTaken => response
                .title("Conflict.")
                .status(StatusCode::CONFLICT),

            ServerError::Unauthorized(flash) => {
                return (
                    flash.warning("Please log in to access this page."),
                    Redirect::to("/"),
                )
                    .into_response();
            },

            ServerError::Forbidden(flash) => {
                return (
                    flash.error("Insufficient permissions."),
                    Redirect::to("/"),
                )
                    .into_response();
            },

            ServerError::Internal { details, source } => {
                tracing::error!(err = ?source, %details, "server returned 500 status");

                ResponseError::default()
            },

            err => {
                tracing::error!(error = %err, "server returned 500 status");

                ResponseError::default()
            },
        };

        response
            .into_response()
            .unwrap_or_else(|_| internal_server_error())
    }
}

fn internal_server_error() -> Response {
    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .header(header::CONTENT_TYPE, "application/problem+json")
        .body(
            serde_json::json!({
                "type": null,
                "title": "Internal server error.",
                "status": StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
                "detail": null,
                "instance": null,
            })
            .to_string()
            .into(),
        )
        .unwrap_or_else(|_| Response::new("Internal server error".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flash::tests::notices_of;
    use validator::ValidationError;

    #[test]
    fn test_invalid_form_redirects_back() {
        let mut errors = ValidationErrors::new();
        errors.add(
            "email",
            ValidationError::new("email")
                .with_message("Enter a valid email address.".into()),
        );

        let response = ServerError::InvalidForm {
            back: "/profile/reg/".into(),
            errors,
            flash: Flash::default(),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/profile/reg/");

        let notices = notices_of(&response);
        assert_eq!(notices.len(), 2);
        assert_eq!(notices[0].message, INVALID_FORM);
        assert_eq!(notices[1].message, "Enter a valid email address.");
    }

    #[test]
    fn test_parsing_form_is_bad_request() {
        let response =
            ServerError::ParsingForm("missing field `email`".into())
                .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_forbidden_redirects() {
        let response = ServerError::Forbidden(Flash::default()).into_response();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/");

        let notices = notices_of(&response);
        assert_eq!(notices[0].level, Level::Error);
        assert_eq!(notices[0].message, "Insufficient permissions.");
    }

    #[test]
    fn test_guards_keep_pending_notices() {
        for err in [
            ServerError::Unauthorized(Flash::default().success("Saved.")),
            ServerError::Forbidden(Flash::default().success("Saved.")),
        ] {
            let notices = notices_of(&err.into_response());

            assert_eq!(notices.len(), 2);
            assert_eq!(notices[0].message, "Saved.");
            assert_ne!(notices[1].level, Level::Success);
        }
    }

    #[test]
    fn test_username_taken_is_conflict() {
        let response = ServerError::UsernameTaken.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_internal_hides_details() {
        let response = ServerError::Internal {
            details: "disk on fire".into(),
            source: None,
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
