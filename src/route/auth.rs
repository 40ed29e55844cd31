use axum::{
	extract::{Query, State},
	http::{header, StatusCode},
	middleware,
	response::{IntoResponse, Redirect, Response},
	routing::get,
	Router,
};
use serde::Deserialize;
use serde_json::json;
use validator::Validate;

use crate::{
	extract::{ClientAddr, Form},
	flash::Flash,
	password,
	ratelimit::{self, Limiter, RouteClass},
	session,
	store, AppState,
};

use super::render;

pub fn routes(limiter: &Limiter) -> Router<AppState> {
	let limited =
		|class| middleware::from_fn_with_state((limiter.clone(), class), ratelimit::guard);

	Router::new()
		.route(
			"/register",
			get(register_page)
				.post(register)
				.layer(limited(RouteClass::Register)),
		)
		.route(
			"/login",
			get(login_page)
				.post(login)
				.layer(limited(RouteClass::Login)),
		)
		.route("/logout", get(logout).layer(limited(RouteClass::Default)))
}

/// An error that can occur during authentication.
///
/// Note that the messages are presented to the client, so they should not
/// contain sensitive information. In particular, an unknown username and a
/// wrong password are deliberately the same error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("invalid username or password")]
	InvalidUsernameOrPassword,
	#[error("username already taken")]
	UsernameTaken,
	#[error("password hashing failed")]
	PasswordHash(#[from] argon2::password_hash::Error),
}

impl Error {
	pub fn status(&self) -> StatusCode {
		match self {
			Self::InvalidUsernameOrPassword => StatusCode::UNAUTHORIZED,
			Self::UsernameTaken => StatusCode::CONFLICT,
			Self::PasswordHash(..) => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}
}

#[derive(Deserialize, Validate)]
pub struct RegisterInput {
	#[validate(length(min = 1, max = 64))]
	pub username: String,
	#[validate(length(min = 1, max = 128))]
	pub password: String,
	#[validate(must_match(other = "password", message = "passwords do not match"))]
	pub confirm: String,
}

#[derive(Deserialize, Validate)]
pub struct LoginInput {
	#[validate(length(min = 1, max = 64))]
	pub username: String,
	#[validate(length(min = 1, max = 128))]
	pub password: String,
}

#[derive(Deserialize)]
pub struct LoginTarget {
	pub next: Option<String>,
}

async fn register_page(flash: Flash) -> Response {
	render("register", json!({}), &flash)
}

/// Registers a new account and sends the client off to log in.
async fn register(
	State(state): State<AppState>,
	Form(input): Form<RegisterInput>,
) -> Result<impl IntoResponse, crate::Error> {
	let hash = password::hash(&input.password).map_err(Error::PasswordHash)?;
	let user = store::create_user(&state.database, &input.username, &hash).await?;

	tracing::info!(user = user.id, "account registered");

	Ok(Redirect::to("/login"))
}

async fn login_page(Query(target): Query<LoginTarget>, flash: Flash) -> Response {
	render("login", json!({ "next": target.next }), &flash)
}

/// Exchanges credentials for a fresh session cookie and redirects to the
/// remembered destination, or the shelf.
async fn login(
	State(state): State<AppState>,
	ClientAddr(addr): ClientAddr,
	Query(target): Query<LoginTarget>,
	Form(input): Form<LoginInput>,
) -> Result<impl IntoResponse, crate::Error> {
	let user = store::user_by_username(&state.database, &input.username).await?;

	let user = match user {
		Some(user) if password::verify(&input.password, &user.password) => user,
		Some(_) => return Err(Error::InvalidUsernameOrPassword.into()),
		None => {
			password::burn(&input.password);
			return Err(Error::InvalidUsernameOrPassword.into());
		}
	};

	let cookie = state.sessions.issue(user.id);

	// last-login bookkeeping is best effort and must not hold up the login
	let database = state.database.clone();
	let user_id = user.id;
	tokio::spawn(async move {
		if let Err(error) = store::record_login(&database, user_id, addr.as_deref()).await {
			tracing::warn!(%error, user = user_id, "failed to record last login");
		}
	});

	let target = target
		.next
		.as_deref()
		.filter(|next| next.starts_with('/') && !next.starts_with("//"))
		.unwrap_or("/shelf")
		.to_owned();

	Ok((
		[(header::SET_COOKIE, cookie.encoded().to_string())],
		Redirect::to(&target),
	))
}

/// Clears whatever session the client held. Succeeds whether or not one
/// existed, as many times as it is called.
async fn logout() -> impl IntoResponse {
	(
		[(header::SET_COOKIE, session::clear_cookie().encoded().to_string())],
		Redirect::to("/"),
	)
}
