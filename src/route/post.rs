use axum::{
	extract::{Path, State},
	http::StatusCode,
	middleware,
	response::{IntoResponse, Redirect, Response},
	routing::get,
	Router,
};
use serde::Deserialize;
use serde_json::json;
use validator::Validate;

use crate::{
	extract::{ClientAddr, Form, Session},
	flash::{self, Flash},
	ratelimit::{self, Limiter, RouteClass},
	store, AppState, Database,
};

use super::render;

pub fn routes(limiter: &Limiter) -> Router<AppState> {
	let limited =
		|class| middleware::from_fn_with_state((limiter.clone(), class), ratelimit::guard);

	Router::new()
		.route(
			"/write",
			get(compose_page)
				.post(create)
				.layer(limited(RouteClass::Write)),
		)
		.route("/shelf", get(shelf).layer(limited(RouteClass::Default)))
		.route("/posts/:id", get(view).layer(limited(RouteClass::Default)))
		.route(
			"/posts/:id/edit",
			get(edit_page)
				.post(edit)
				.layer(limited(RouteClass::Default)),
		)
		.route(
			"/posts/:id/delete",
			axum::routing::post(delete).layer(limited(RouteClass::Delete)),
		)
}

/// Failures surfaced to the author during post operations. The messages are
/// shown to the client as notices.
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("post {0} does not exist")]
	UnknownPost(i64),
	#[error("post {0} belongs to someone else")]
	NotYourPost(i64),
	#[error("write something first")]
	EmptyContent,
	#[error("posts are limited to {} characters", crate::store::MAX_CONTENT_CHARS)]
	ContentTooLong,
}

impl Error {
	pub fn status(&self) -> StatusCode {
		match self {
			Self::UnknownPost(..) => StatusCode::NOT_FOUND,
			Self::NotYourPost(..) => StatusCode::FORBIDDEN,
			Self::EmptyContent | Self::ContentTooLong => StatusCode::BAD_REQUEST,
		}
	}
}

#[derive(Deserialize, Validate)]
pub struct ComposeInput {
	pub content: String,
}

async fn compose_page(session: Session, flash: Flash) -> Response {
	render(
		"write",
		json!({ "username": session.user.username }),
		&flash,
	)
}

async fn create(
	session: Session,
	State(database): State<Database>,
	ClientAddr(addr): ClientAddr,
	Form(input): Form<ComposeInput>,
) -> Response {
	match store::create_post(&database, session.user.id, &input.content, addr.as_deref()).await {
		Ok(post) => {
			tracing::info!(post = post.id, user = session.user.id, "post created");

			Redirect::to("/shelf").into_response()
		}
		Err(error) => flash::or_notice("/write", error),
	}
}

/// The caller's own posts, newest first.
async fn shelf(
	session: Session,
	State(database): State<Database>,
	flash: Flash,
) -> Result<Response, crate::Error> {
	let posts =
		store::list_posts(&database, session.user.id, store::DEFAULT_SHELF_LIMIT).await?;

	Ok(render(
		"shelf",
		json!({ "username": session.user.username, "posts": posts }),
		&flash,
	))
}

async fn view(
	session: Session,
	State(database): State<Database>,
	Path(id): Path<i64>,
	flash: Flash,
) -> Response {
	match store::post_for_owner(&database, id, session.user.id).await {
		Ok(post) => render("post", json!({ "post": post }), &flash),
		Err(error) => flash::or_notice("/shelf", error),
	}
}

async fn edit_page(
	session: Session,
	State(database): State<Database>,
	Path(id): Path<i64>,
	flash: Flash,
) -> Response {
	match store::post_for_owner(&database, id, session.user.id).await {
		Ok(post) => render("edit", json!({ "post": post }), &flash),
		Err(error) => flash::or_notice("/shelf", error),
	}
}

async fn edit(
	session: Session,
	State(database): State<Database>,
	Path(id): Path<i64>,
	Form(input): Form<ComposeInput>,
) -> Response {
	match store::update_post(&database, id, session.user.id, &input.content).await {
		Ok(post) => Redirect::to(&format!("/posts/{}", post.id)).into_response(),
		Err(error) => {
			// bad content goes back to the editor, everything else to the shelf
			let target = match &error {
				crate::Error::Post(Error::EmptyContent | Error::ContentTooLong) => {
					format!("/posts/{id}/edit")
				}
				_ => "/shelf".to_owned(),
			};

			flash::or_notice(&target, error)
		}
	}
}

async fn delete(
	session: Session,
	State(database): State<Database>,
	Path(id): Path<i64>,
) -> Response {
	match store::delete_post(&database, id, session.user.id).await {
		Ok(()) => {
			tracing::info!(post = id, user = session.user.id, "post deleted");

			flash::notice("/shelf", "post deleted")
		}
		Err(error) => flash::or_notice("/shelf", error),
	}
}
