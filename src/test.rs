//! Shared helpers for the in-crate integration tests.

pub use axum::http::StatusCode;
pub use axum_test::TestServer;

pub type Database = crate::Database;

use std::{sync::Arc, time::Duration};

use crate::{ratelimit, route, session, State};

pub fn state(pool: Database) -> State {
	State {
		database: pool,
		sessions: session::Sessions::new(Some("an-adequately-long-test-secret-key"), Duration::from_secs(1800)),
		limiter: ratelimit::Limiter::new(Arc::new(ratelimit::MemoryCounters::default())),
	}
}

/// A test server with its own cookie jar, sharing state through the pool.
pub fn app(pool: Database) -> TestServer {
	let config = axum_test::TestServerConfig::builder().save_cookies().build();

	TestServer::new_with_config(route::router(state(pool)), config)
		.expect("failed to start test server")
}

/// Registers and logs in, leaving the session cookie in the server's jar.
pub async fn signup(app: &TestServer, username: &str, password: &str) {
	let response = app
		.post("/register")
		.form(&[
			("username", username),
			("password", password),
			("confirm", password),
		])
		.await;

	assert_eq!(response.status_code(), StatusCode::SEE_OTHER);

	let response = app
		.post("/login")
		.form(&[("username", username), ("password", password)])
		.await;

	assert_eq!(response.status_code(), StatusCode::SEE_OTHER);
}
