use std::net::SocketAddr;

use axum::{
	extract::{ConnectInfo, FromRef, FromRequest, FromRequestParts, Request},
	http::{header, request, Extensions, HeaderMap, HeaderValue},
	response::{IntoResponse, Redirect, Response},
};
use serde::de;

use crate::{model, session, session::Sessions, store, Database, Error};

/// Extractor that deserializes a form body and validates it.
///
/// T must implement [`serde::de::DeserializeOwned`] and [`validator::Validate`]
/// in order to be used in an extractor.
pub struct Form<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for Form<T>
where
	T: de::DeserializeOwned + validator::Validate,
	S: Send + Sync,
{
	type Rejection = Error;

	async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
		let result = axum::extract::Form::<T>::from_request(req, state).await?.0;

		result.validate().map_err(Error::Validation)?;
		Ok(Self(result))
	}
}

/// Extracts the authenticated user from the signed session cookie.
///
/// A request with no live session is redirected to the login page, with the
/// intended destination preserved in the `next` parameter.
#[derive(Debug)]
pub struct Session {
	pub user: model::User,
}

#[derive(Debug)]
pub enum SessionRejection {
	Unauthenticated { next: String },
	Internal(Error),
}

impl IntoResponse for SessionRejection {
	fn into_response(self) -> Response {
		match self {
			Self::Unauthenticated { next } => {
				let mut response =
					Redirect::to(&format!("/login?next={next}")).into_response();

				// drop whatever stale or forged cookie got us here
				if let Ok(value) =
					HeaderValue::from_str(&session::clear_cookie().encoded().to_string())
				{
					response.headers_mut().append(header::SET_COOKIE, value);
				}

				response
			}
			Self::Internal(error) => error.into_response(),
		}
	}
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for Session
where
	Sessions: FromRef<S>,
	Database: FromRef<S>,
	S: Sync + Send,
{
	type Rejection = SessionRejection;

	async fn from_request_parts(
		parts: &mut request::Parts,
		state: &S,
	) -> Result<Self, Self::Rejection> {
		let next = parts.uri.path().to_owned();

		let sessions = Sessions::from_ref(state);

		let Some(user_id) = sessions.authenticate(&parts.headers) else {
			return Err(SessionRejection::Unauthenticated { next });
		};

		let database = Database::from_ref(state);
		let user = store::user_by_id(&database, user_id)
			.await
			.map_err(SessionRejection::Internal)?;

		let Some(user) = user else {
			return Err(SessionRejection::Unauthenticated { next });
		};

		Ok(Self { user })
	}
}

/// Network origin of the request, preferring `X-Forwarded-For` over the
/// socket peer. Multiple clients behind one origin share it.
#[derive(Debug)]
pub struct ClientAddr(pub Option<String>);

#[axum::async_trait]
impl<S> FromRequestParts<S> for ClientAddr
where
	S: Send + Sync,
{
	type Rejection = std::convert::Infallible;

	async fn from_request_parts(
		parts: &mut request::Parts,
		_state: &S,
	) -> Result<Self, Self::Rejection> {
		Ok(Self(client_addr(&parts.headers, &parts.extensions)))
	}
}

pub fn client_addr(headers: &HeaderMap, extensions: &Extensions) -> Option<String> {
	headers
		.get("x-forwarded-for")
		.and_then(|value| value.to_str().ok())
		.and_then(|value| value.split(',').next())
		.map(|ip| ip.trim().to_owned())
		.filter(|ip| !ip.is_empty())
		.or_else(|| {
			extensions
				.get::<ConnectInfo<SocketAddr>>()
				.map(|ConnectInfo(addr)| addr.ip().to_string())
		})
}
