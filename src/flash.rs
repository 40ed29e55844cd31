use axum::{
	http::{header, request, HeaderValue},
	response::{IntoResponse, Redirect, Response},
};

pub const COOKIE_NAME: &str = "flash";

/// One-shot notice carried across a redirect, cleared once rendered.
#[derive(Debug, Default)]
pub struct Flash(pub Option<String>);

#[axum::async_trait]
impl<S> axum::extract::FromRequestParts<S> for Flash
where
	S: Send + Sync,
{
	type Rejection = std::convert::Infallible;

	async fn from_request_parts(
		parts: &mut request::Parts,
		_state: &S,
	) -> Result<Self, Self::Rejection> {
		let notice = parts
			.headers
			.get_all(header::COOKIE)
			.into_iter()
			.filter_map(|value| value.to_str().ok())
			.flat_map(|value| cookie::Cookie::split_parse_encoded(value.to_owned()))
			.filter_map(Result::ok)
			.find(|cookie| cookie.name() == COOKIE_NAME)
			.map(|cookie| cookie.value().to_owned())
			.filter(|value| !value.is_empty());

		Ok(Self(notice))
	}
}

impl Flash {
	/// Header value that clears the notice once it has been rendered.
	pub fn clear(&self) -> Option<HeaderValue> {
		self.0.as_ref()?;

		let cookie = cookie::Cookie::build(COOKIE_NAME)
			.path("/")
			.max_age(cookie::time::Duration::ZERO)
			.build();

		HeaderValue::from_str(&cookie.encoded().to_string()).ok()
	}
}

/// Redirects with a one-shot notice attached.
pub fn notice(target: &str, message: &str) -> Response {
	let mut response = Redirect::to(target).into_response();

	let cookie = cookie::Cookie::build((COOKIE_NAME, message.to_owned()))
		.path("/")
		.build();

	if let Ok(value) = HeaderValue::from_str(&cookie.encoded().to_string()) {
		response.headers_mut().append(header::SET_COOKIE, value);
	}

	response
}

/// Converts a failed browser-flow operation into a redirect carrying a
/// notice. Database failures are logged here in full; the client only ever
/// sees a generic retry message.
pub fn or_notice(target: &str, error: crate::Error) -> Response {
	match error {
		crate::Error::Post(error) => notice(target, &error.to_string()),
		crate::Error::Database(error) => {
			tracing::error!(%error, "store operation failed");

			notice(target, "something went wrong, please try again")
		}
		error => error.into_response(),
	}
}
