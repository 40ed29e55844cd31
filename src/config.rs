use std::time::Duration;

/// Runtime configuration, collected from the environment once at startup.
#[derive(Debug, Clone)]
pub struct Config {
	pub port: u16,
	pub database_url: String,
	/// Signing secret for session cookies, at least 32 bytes. When absent, a
	/// random key is generated and sessions do not survive a restart.
	pub secret_key: Option<String>,
	/// Idle timeout for sessions, refreshed on every authenticated request.
	pub session_lifetime: Duration,
	pub ratelimit_store: RateLimitStore,
}

/// Where rate-limit counters live.
///
/// Memory counters are scoped to one process; the database store is shared by
/// every instance pointed at the same file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitStore {
	Memory,
	Database,
}

impl Config {
	pub fn from_env() -> Self {
		Self {
			port: std::env::var("PORT").map_or_else(
				|_| 3000,
				|port| port.parse().expect("PORT must be a number"),
			),
			database_url: std::env::var("DATABASE_URL")
				.unwrap_or_else(|_| "sqlite://flowrite.db".to_owned()),
			secret_key: std::env::var("SECRET_KEY").ok(),
			session_lifetime: Duration::from_secs(std::env::var("SESSION_LIFETIME_SECS").map_or_else(
				|_| 1800,
				|secs| secs.parse().expect("SESSION_LIFETIME_SECS must be a number"),
			)),
			ratelimit_store: match std::env::var("RATELIMIT_STORE").as_deref() {
				Ok("database") => RateLimitStore::Database,
				_ => RateLimitStore::Memory,
			},
		}
	}
}
