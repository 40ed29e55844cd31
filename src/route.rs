pub mod auth;
pub mod post;

use axum::{
	http::header,
	middleware,
	response::{IntoResponse, Response},
	routing::get,
	Json, Router,
};
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::{
	flash::Flash,
	ratelimit::{self, RouteClass},
	session, AppState,
};

pub fn router(state: AppState) -> Router {
	let limiter = state.limiter.clone();
	let sessions = state.sessions.clone();
	let limited =
		move |class| middleware::from_fn_with_state((limiter.clone(), class), ratelimit::guard);

	Router::new()
		.route("/", get(home).layer(limited(RouteClass::Default)))
		.merge(auth::routes(&state.limiter))
		.merge(post::routes(&state.limiter))
		.layer(middleware::from_fn_with_state(sessions, session::refresh))
		// health checks sit outside every quota
		.route("/health", get(health))
		.layer(TraceLayer::new_for_http())
		.with_state(state)
}

/// The rendering seam: handlers produce plain view data, and an external
/// template layer turns it into a page. Any pending notice rides along and
/// is cleared once handed over.
pub(crate) fn render(view: &'static str, data: serde_json::Value, flash: &Flash) -> Response {
	let mut response = Json(json!({
		"view": view,
		"data": data,
		"notice": flash.0,
	}))
	.into_response();

	if let Some(clear) = flash.clear() {
		response.headers_mut().append(header::SET_COOKIE, clear);
	}

	response
}

async fn home(flash: Flash) -> Response {
	render("home", json!({}), &flash)
}

async fn health() -> Json<serde_json::Value> {
	tracing::debug!("got ping for health check");

	Json(json!({ "status": "OK" }))
}
