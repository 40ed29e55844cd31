use axum::{
	body::Body,
	extract::rejection,
	http::{header, Response, StatusCode},
	response::IntoResponse,
	Json,
};
use serde::Serialize;

use crate::route::{auth, post};

/// Error type for the application.
///
/// The Display trait is not sent to the client for internal variants, so it
/// can show sensitive information.
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("validation error: {0}")]
	Validation(#[from] validator::ValidationErrors),
	#[error("form error: {0}")]
	Form(#[from] rejection::FormRejection),
	#[error("auth error: {0}")]
	Auth(#[from] auth::Error),
	#[error("post error: {0}")]
	Post(#[from] post::Error),
	#[error("rate limit exceeded: {ceiling} per {window}")]
	RateLimited {
		ceiling: i64,
		window: &'static str,
		retry_after: u64,
	},
	#[error("database error: {0}")]
	Database(#[from] sqlx::Error),
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
	pub success: bool,
	pub errors: Vec<String>,
}

impl ErrorResponse {
	fn one(message: String) -> Self {
		Self {
			success: false,
			errors: vec![message],
		}
	}
}

impl IntoResponse for Error {
	fn into_response(self) -> Response<Body> {
		match self {
			Error::Validation(errors) => (
				StatusCode::BAD_REQUEST,
				Json(ErrorResponse {
					errors: errors
						.field_errors()
						.into_iter()
						.flat_map(move |(field, errors)| {
							errors
								.iter()
								.map(move |error| format!("{field}: {error}"))
								.collect::<Vec<_>>()
						})
						.collect(),
					success: false,
				}),
			)
				.into_response(),
			Error::Form(error) => (
				StatusCode::BAD_REQUEST,
				Json(ErrorResponse::one(error.to_string())),
			)
				.into_response(),
			Error::Auth(error) => {
				(error.status(), Json(ErrorResponse::one(error.to_string()))).into_response()
			}
			Error::Post(error) => {
				(error.status(), Json(ErrorResponse::one(error.to_string()))).into_response()
			}
			Error::RateLimited {
				ceiling,
				window,
				retry_after,
			} => (
				StatusCode::TOO_MANY_REQUESTS,
				[(header::RETRY_AFTER, retry_after.to_string())],
				Json(ErrorResponse::one(format!(
					"rate limit exceeded: {ceiling} per {window}"
				))),
			)
				.into_response(),
			Error::Database(ref error) => {
				// full detail stays in the log, the client sees nothing
				tracing::error!(%error, "database error");

				(
					StatusCode::INTERNAL_SERVER_ERROR,
					Json(ErrorResponse {
						errors: Vec::new(),
						success: false,
					}),
				)
					.into_response()
			}
		}
	}
}
