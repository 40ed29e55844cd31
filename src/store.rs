use std::time::Duration;

use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

use crate::{
	model::{Post, User},
	route::{auth, post},
	Database, Error,
};

pub const MAX_CONTENT_CHARS: usize = 30_000;
pub const DEFAULT_SHELF_LIMIT: i64 = 10;

/// Opens the database in WAL mode: writers append intent and are serialized
/// against each other, readers proceed without blocking on them.
pub async fn connect(url: &str) -> Result<Database, sqlx::Error> {
	let options = url
		.parse::<SqliteConnectOptions>()?
		.create_if_missing(true)
		.journal_mode(SqliteJournalMode::Wal)
		.foreign_keys(true)
		.busy_timeout(Duration::from_secs(5));

	SqlitePoolOptions::new()
		.max_connections(8)
		.connect_with(options)
		.await
}

pub async fn create_user(
	database: &Database,
	username: &str,
	password_hash: &str,
) -> Result<User, Error> {
	sqlx::query_as::<_, User>(
		"INSERT INTO user (username, password, created_at) VALUES (?, ?, ?) RETURNING *",
	)
	.bind(username)
	.bind(password_hash)
	.bind(Utc::now())
	.fetch_one(database)
	.await
	.map_err(|e| match &e {
		sqlx::Error::Database(d) if d.is_unique_violation() => {
			Error::Auth(auth::Error::UsernameTaken)
		}
		_ => Error::Database(e),
	})
}

/// Exact, case-sensitive lookup.
pub async fn user_by_username(database: &Database, username: &str) -> Result<Option<User>, Error> {
	Ok(
		sqlx::query_as::<_, User>("SELECT * FROM user WHERE username = ?")
			.bind(username)
			.fetch_optional(database)
			.await?,
	)
}

pub async fn user_by_id(database: &Database, id: i64) -> Result<Option<User>, Error> {
	Ok(sqlx::query_as::<_, User>("SELECT * FROM user WHERE id = ?")
		.bind(id)
		.fetch_optional(database)
		.await?)
}

pub async fn record_login(
	database: &Database,
	user_id: i64,
	addr: Option<&str>,
) -> Result<(), Error> {
	sqlx::query("UPDATE user SET last_login_at = ?, last_login_addr = ? WHERE id = ?")
		.bind(Utc::now())
		.bind(addr)
		.bind(user_id)
		.execute(database)
		.await?;

	Ok(())
}

/// Bounds are checked before anything is written; a rejected write leaves no
/// trace.
fn check_content(content: &str) -> Result<(), post::Error> {
	if content.trim().is_empty() {
		return Err(post::Error::EmptyContent);
	}

	if content.chars().count() > MAX_CONTENT_CHARS {
		return Err(post::Error::ContentTooLong);
	}

	Ok(())
}

pub async fn create_post(
	database: &Database,
	owner: i64,
	content: &str,
	addr: Option<&str>,
) -> Result<Post, Error> {
	check_content(content)?;

	let now = Utc::now();

	Ok(sqlx::query_as::<_, Post>(
		"INSERT INTO post (user_id, content, created_at, updated_at, created_addr)
		 VALUES (?, ?, ?, ?, ?) RETURNING *",
	)
	.bind(owner)
	.bind(content)
	.bind(now)
	.bind(now)
	.bind(addr)
	.fetch_one(database)
	.await?)
}

/// The ownership check: looks the post up and verifies the acting identity
/// in one step, before anything can be mutated. A missing post and a post
/// owned by someone else fail with distinct kinds.
pub async fn post_for_owner(database: &Database, id: i64, owner: i64) -> Result<Post, Error> {
	let post = sqlx::query_as::<_, Post>("SELECT * FROM post WHERE id = ?")
		.bind(id)
		.fetch_optional(database)
		.await?
		.ok_or(post::Error::UnknownPost(id))?;

	if post.user_id != owner {
		return Err(post::Error::NotYourPost(id).into());
	}

	Ok(post)
}

pub async fn update_post(
	database: &Database,
	id: i64,
	owner: i64,
	content: &str,
) -> Result<Post, Error> {
	post_for_owner(database, id, owner).await?;
	check_content(content)?;

	Ok(sqlx::query_as::<_, Post>(
		"UPDATE post SET content = ?, updated_at = ? WHERE id = ? AND user_id = ? RETURNING *",
	)
	.bind(content)
	.bind(Utc::now())
	.bind(id)
	.bind(owner)
	.fetch_one(database)
	.await?)
}

pub async fn delete_post(database: &Database, id: i64, owner: i64) -> Result<(), Error> {
	post_for_owner(database, id, owner).await?;

	sqlx::query("DELETE FROM post WHERE id = ? AND user_id = ?")
		.bind(id)
		.bind(owner)
		.execute(database)
		.await?;

	Ok(())
}

/// The owner's posts, newest first, capped at `limit`.
pub async fn list_posts(database: &Database, owner: i64, limit: i64) -> Result<Vec<Post>, Error> {
	Ok(sqlx::query_as::<_, Post>(
		"SELECT * FROM post WHERE user_id = ? ORDER BY created_at DESC, id DESC LIMIT ?",
	)
	.bind(owner)
	.bind(limit)
	.fetch_all(database)
	.await?)
}

#[cfg(test)]
pub async fn count_posts(database: &Database) -> i64 {
	sqlx::query_scalar("SELECT COUNT(*) FROM post")
		.fetch_one(database)
		.await
		.unwrap()
}

#[cfg(test)]
mod test {
	use crate::{route::post, Database, Error};

	async fn user(database: &Database, username: &str) -> i64 {
		super::create_user(database, username, "$argon2id$stub")
			.await
			.unwrap()
			.id
	}

	#[sqlx::test]
	async fn test_duplicate_username_conflicts(pool: Database) {
		user(&pool, "alice").await;

		let error = super::create_user(&pool, "alice", "$argon2id$other")
			.await
			.unwrap_err();

		assert!(matches!(
			error,
			Error::Auth(crate::route::auth::Error::UsernameTaken)
		));
	}

	#[sqlx::test]
	async fn test_username_lookup_is_case_sensitive(pool: Database) {
		user(&pool, "Alice").await;

		assert!(super::user_by_username(&pool, "alice")
			.await
			.unwrap()
			.is_none());
		assert!(super::user_by_username(&pool, "Alice")
			.await
			.unwrap()
			.is_some());
	}

	#[sqlx::test]
	async fn test_content_stored_verbatim(pool: Database) {
		let owner = user(&pool, "alice").await;
		let post = super::create_post(&pool, owner, "hello", None).await.unwrap();

		let read = super::post_for_owner(&pool, post.id, owner).await.unwrap();

		assert_eq!(read.content, "hello");
	}

	#[sqlx::test]
	async fn test_oversized_content_writes_nothing(pool: Database) {
		let owner = user(&pool, "alice").await;
		let content = "a".repeat(super::MAX_CONTENT_CHARS + 1);

		let error = super::create_post(&pool, owner, &content, None)
			.await
			.unwrap_err();

		assert!(matches!(error, Error::Post(post::Error::ContentTooLong)));
		assert_eq!(super::count_posts(&pool).await, 0);
	}

	#[sqlx::test]
	async fn test_content_at_limit_is_accepted(pool: Database) {
		let owner = user(&pool, "alice").await;
		let content = "a".repeat(super::MAX_CONTENT_CHARS);

		super::create_post(&pool, owner, &content, None).await.unwrap();

		assert_eq!(super::count_posts(&pool).await, 1);
	}

	#[sqlx::test]
	async fn test_missing_and_foreign_posts_are_distinct(pool: Database) {
		let alice = user(&pool, "alice").await;
		let bob = user(&pool, "bob").await;
		let post = super::create_post(&pool, alice, "mine", None).await.unwrap();

		assert!(matches!(
			super::post_for_owner(&pool, post.id + 1, alice).await,
			Err(Error::Post(post::Error::UnknownPost(..)))
		));
		assert!(matches!(
			super::post_for_owner(&pool, post.id, bob).await,
			Err(Error::Post(post::Error::NotYourPost(..)))
		));
	}

	#[sqlx::test]
	async fn test_list_caps_and_orders_newest_first(pool: Database) {
		let owner = user(&pool, "alice").await;

		for n in 1..=15 {
			super::create_post(&pool, owner, &format!("post {n}"), None)
				.await
				.unwrap();
		}

		let posts = super::list_posts(&pool, owner, super::DEFAULT_SHELF_LIMIT)
			.await
			.unwrap();

		assert_eq!(posts.len(), 10);
		assert_eq!(posts[0].content, "post 15");
		assert_eq!(posts[9].content, "post 6");
	}

	#[sqlx::test]
	async fn test_update_rejects_empty_content(pool: Database) {
		let owner = user(&pool, "alice").await;
		let post = super::create_post(&pool, owner, "hello", None).await.unwrap();

		let error = super::update_post(&pool, post.id, owner, "   ")
			.await
			.unwrap_err();

		assert!(matches!(error, Error::Post(post::Error::EmptyContent)));
		assert_eq!(
			super::post_for_owner(&pool, post.id, owner)
				.await
				.unwrap()
				.content,
			"hello"
		);
	}
}
