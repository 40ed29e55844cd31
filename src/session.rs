use std::time::Duration;

use axum::{
	extract::{Request, State},
	http::{header, HeaderMap, HeaderValue},
	middleware::Next,
	response::Response,
};
use chrono::Utc;

pub const COOKIE_NAME: &str = "session";

/// Issues and validates signed, client-held session tokens.
///
/// A token binds a client to exactly one user id with an idle-timeout expiry.
/// Nothing session-shaped is persisted server-side; the cookie is the whole
/// session.
#[derive(Clone)]
pub struct Sessions {
	key: cookie::Key,
	ttl: Duration,
}

impl Sessions {
	pub fn new(secret: Option<&str>, ttl: Duration) -> Self {
		let key = match secret {
			Some(secret) => {
				assert!(
					secret.len() >= 32,
					"SECRET_KEY must be at least 32 bytes"
				);

				cookie::Key::derive_from(secret.as_bytes())
			}
			None => {
				tracing::warn!("SECRET_KEY not set, sessions will not survive a restart");
				cookie::Key::generate()
			}
		};

		Self { key, ttl }
	}

	/// Mints a session cookie bound to `user_id` with a fresh idle-timeout
	/// expiry, replacing whatever the client held before.
	pub fn issue(&self, user_id: i64) -> cookie::Cookie<'static> {
		let ttl = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
		let exp = Utc::now().timestamp().saturating_add(ttl);

		let mut jar = cookie::CookieJar::new();

		jar.signed_mut(&self.key).add(
			cookie::Cookie::build((COOKIE_NAME, format!("{user_id}:{exp}")))
				.http_only(true)
				.same_site(cookie::SameSite::Lax)
				.path("/")
				.build(),
		);

		jar.get(COOKIE_NAME).cloned().expect("cookie was just added")
	}

	/// Returns the bound user id if the request carries a session cookie with
	/// a valid signature and an unexpired idle timeout.
	pub fn authenticate(&self, headers: &HeaderMap) -> Option<i64> {
		let mut jar = cookie::CookieJar::new();

		for value in headers.get_all(header::COOKIE) {
			let Ok(value) = value.to_str() else { continue };

			for cookie in cookie::Cookie::split_parse_encoded(value.to_owned()) {
				if let Ok(cookie) = cookie {
					jar.add_original(cookie.into_owned());
				}
			}
		}

		let cookie = jar.signed(&self.key).get(COOKIE_NAME)?;

		decode(cookie.value())
	}
}

fn decode(value: &str) -> Option<i64> {
	let (user_id, exp) = value.split_once(':')?;
	let user_id = user_id.parse().ok()?;
	let exp: i64 = exp.parse().ok()?;

	(Utc::now().timestamp() < exp).then_some(user_id)
}

/// Creates an empty session cookie used to invalidate a previous one.
pub fn clear_cookie() -> cookie::Cookie<'static> {
	cookie::Cookie::build(COOKIE_NAME)
		.http_only(true)
		.path("/")
		.max_age(cookie::time::Duration::ZERO)
		.build()
}

/// Sliding idle timeout: a successful authenticated response renews the
/// token, unless the handler already set cookies of its own (login, logout
/// and flash redirects manage theirs explicitly).
pub async fn refresh(
	State(sessions): State<Sessions>,
	request: Request,
	next: Next,
) -> Response {
	let user_id = sessions.authenticate(request.headers());

	let mut response = next.run(request).await;

	if let Some(user_id) = user_id {
		let status = response.status();

		if (status.is_success() || status.is_redirection())
			&& !response.headers().contains_key(header::SET_COOKIE)
		{
			if let Ok(value) = HeaderValue::from_str(&sessions.issue(user_id).encoded().to_string())
			{
				response.headers_mut().append(header::SET_COOKIE, value);
			}
		}
	}

	response
}

#[cfg(test)]
mod test {
	use std::time::Duration;

	use axum::http::{header, HeaderMap, HeaderValue};

	use super::Sessions;

	fn headers_with(cookie: &cookie::Cookie<'_>) -> HeaderMap {
		let mut headers = HeaderMap::new();

		headers.insert(
			header::COOKIE,
			HeaderValue::from_str(&cookie.encoded().to_string()).unwrap(),
		);

		headers
	}

	#[test]
	fn test_issue_then_authenticate() {
		let sessions = Sessions::new(Some("an-adequately-long-test-secret-key"), Duration::from_secs(1800));
		let cookie = sessions.issue(42);

		assert_eq!(sessions.authenticate(&headers_with(&cookie)), Some(42));
	}

	#[test]
	fn test_expired_token_is_anonymous() {
		let sessions = Sessions::new(Some("an-adequately-long-test-secret-key"), Duration::ZERO);
		let cookie = sessions.issue(42);

		assert_eq!(sessions.authenticate(&headers_with(&cookie)), None);
	}

	#[test]
	fn test_tampered_token_is_anonymous() {
		let sessions = Sessions::new(Some("an-adequately-long-test-secret-key"), Duration::from_secs(1800));
		let mut cookie = sessions.issue(42);

		let mut value = cookie.value().to_owned();
		value.replace_range(0..1, if value.starts_with('A') { "B" } else { "A" });
		cookie.set_value(value);

		assert_eq!(sessions.authenticate(&headers_with(&cookie)), None);
	}

	#[test]
	fn test_foreign_key_is_anonymous() {
		let sessions = Sessions::new(Some("an-adequately-long-test-secret-key"), Duration::from_secs(1800));
		let other = Sessions::new(Some("a-completely-different-secret-key-00"), Duration::from_secs(1800));
		let cookie = other.issue(42);

		assert_eq!(sessions.authenticate(&headers_with(&cookie)), None);
	}

	#[test]
	fn test_missing_cookie_is_anonymous() {
		let sessions = Sessions::new(Some("an-adequately-long-test-secret-key"), Duration::from_secs(1800));

		assert_eq!(sessions.authenticate(&HeaderMap::new()), None);
	}
}
