use serde::Serialize;

/// A registered account.
///
/// Use this when fetching from the database and returning to the client.
/// The hash and login bookkeeping are never serialized.
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct User {
	pub id: i64,
	pub username: String,
	/// Argon2id PHC string, salt embedded.
	#[serde(skip_serializing)]
	pub password: String,
	pub created_at: chrono::DateTime<chrono::Utc>,
	#[serde(skip_serializing)]
	#[allow(dead_code)]
	pub last_login_at: Option<chrono::DateTime<chrono::Utc>>,
	#[serde(skip_serializing)]
	#[allow(dead_code)]
	pub last_login_addr: Option<String>,
}

/// A single post. The owner is fixed at creation and never changes.
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct Post {
	pub id: i64,
	pub user_id: i64,
	pub content: String,
	pub created_at: chrono::DateTime<chrono::Utc>,
	pub updated_at: chrono::DateTime<chrono::Utc>,
	#[serde(skip_serializing)]
	#[allow(dead_code)]
	pub created_addr: Option<String>,
}
