use std::{
	collections::HashMap,
	sync::{Arc, Mutex},
	time::Duration,
};

use axum::{
	extract::{Request, State},
	middleware::Next,
	response::{IntoResponse, Response},
};
use chrono::Utc;

use crate::{extract, Database, Error};

/// One named ceiling over a fixed window. A route class may carry several at
/// once; a request is admitted only when it is under every one of them.
#[derive(Debug, Clone, Copy)]
pub struct Quota {
	/// Unique within a route class, part of the bucket key.
	pub name: &'static str,
	pub ceiling: i64,
	pub window: Duration,
}

impl Quota {
	pub const fn per_minute(name: &'static str, ceiling: i64) -> Self {
		Self {
			name,
			ceiling,
			window: Duration::from_secs(60),
		}
	}

	pub const fn per_hour(name: &'static str, ceiling: i64) -> Self {
		Self {
			name,
			ceiling,
			window: Duration::from_secs(60 * 60),
		}
	}

	pub const fn per_day(name: &'static str, ceiling: i64) -> Self {
		Self {
			name,
			ceiling,
			window: Duration::from_secs(60 * 60 * 24),
		}
	}

	fn window_label(&self) -> &'static str {
		match self.window.as_secs() {
			60 => "minute",
			3600 => "hour",
			86_400 => "day",
			_ => "window",
		}
	}
}

/// Process-wide defaults, applied to every limited route on top of its own
/// overrides.
pub const DEFAULT_QUOTAS: &[Quota] = &[
	Quota::per_hour("default-hour", 500),
	Quota::per_day("default-day", 2000),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
	Default,
	Login,
	Register,
	Write,
	Delete,
}

impl RouteClass {
	fn name(self) -> &'static str {
		match self {
			Self::Default => "default",
			Self::Login => "login",
			Self::Register => "register",
			Self::Write => "write",
			Self::Delete => "delete",
		}
	}

	fn overrides(self) -> &'static [Quota] {
		const LOGIN: &[Quota] = &[Quota::per_minute("login-burst", 60)];
		const REGISTER: &[Quota] = &[Quota::per_hour("register-burst", 50)];
		const WRITE: &[Quota] = &[Quota::per_hour("write-burst", 120)];
		const DELETE: &[Quota] = &[Quota::per_minute("delete-burst", 50)];

		match self {
			Self::Default => &[],
			Self::Login => LOGIN,
			Self::Register => REGISTER,
			Self::Write => WRITE,
			Self::Delete => DELETE,
		}
	}
}

/// Result of one counter advance: the count including this hit, and the start
/// of the window it landed in.
#[derive(Debug, Clone, Copy)]
pub struct Hit {
	pub count: i64,
	pub window_start: i64,
}

/// Fixed-window counter storage.
///
/// Implementations must advance atomically: concurrent hits on one key must
/// not lose updates, or a request could slip past its ceiling under race.
#[axum::async_trait]
pub trait CounterStore: Send + Sync {
	/// Advances the counter for `key`, resetting it first when the window
	/// boundary has passed.
	async fn hit(&self, key: &str, window: Duration, now: i64) -> Result<Hit, Error>;

	/// Drops buckets whose window start is older than `retain`.
	async fn sweep(&self, now: i64, retain: Duration) -> Result<(), Error>;
}

/// Single-process counters. The mutex is the atomic-increment discipline.
#[derive(Default)]
pub struct MemoryCounters {
	buckets: Mutex<HashMap<String, (i64, i64)>>,
}

#[axum::async_trait]
impl CounterStore for MemoryCounters {
	async fn hit(&self, key: &str, window: Duration, now: i64) -> Result<Hit, Error> {
		let mut buckets = self.buckets.lock().unwrap();
		let (start, count) = buckets.entry(key.to_owned()).or_insert((now, 0));

		if now - *start >= window.as_secs() as i64 {
			*start = now;
			*count = 0;
		}

		*count += 1;

		Ok(Hit {
			count: *count,
			window_start: *start,
		})
	}

	async fn sweep(&self, now: i64, retain: Duration) -> Result<(), Error> {
		let mut buckets = self.buckets.lock().unwrap();

		buckets.retain(|_, (start, _)| now - *start < retain.as_secs() as i64);

		Ok(())
	}
}

/// Counters shared across processes through the database, for deployments
/// with more than one instance. One upsert per hit keeps the advance atomic.
pub struct DbCounters {
	database: Database,
}

impl DbCounters {
	pub fn new(database: Database) -> Self {
		Self { database }
	}
}

#[axum::async_trait]
impl CounterStore for DbCounters {
	async fn hit(&self, key: &str, window: Duration, now: i64) -> Result<Hit, Error> {
		let (count, window_start): (i64, i64) = sqlx::query_as(
			r#"
			INSERT INTO rate_limit (key, window_start, count) VALUES (?1, ?2, 1)
			ON CONFLICT (key) DO UPDATE SET
				count = CASE WHEN ?2 - window_start >= ?3 THEN 1 ELSE count + 1 END,
				window_start = CASE WHEN ?2 - window_start >= ?3 THEN ?2 ELSE window_start END
			RETURNING count, window_start
			"#,
		)
		.bind(key)
		.bind(now)
		.bind(window.as_secs() as i64)
		.fetch_one(&self.database)
		.await?;

		Ok(Hit {
			count,
			window_start,
		})
	}

	async fn sweep(&self, now: i64, retain: Duration) -> Result<(), Error> {
		sqlx::query("DELETE FROM rate_limit WHERE window_start < ?1 - ?2")
			.bind(now)
			.bind(retain.as_secs() as i64)
			.execute(&self.database)
			.await?;

		Ok(())
	}
}

/// Admits or rejects requests against per-key, per-window quotas. Callers
/// depend only on the [`CounterStore`] behind it.
#[derive(Clone)]
pub struct Limiter {
	counters: Arc<dyn CounterStore>,
}

impl Limiter {
	pub fn new(counters: Arc<dyn CounterStore>) -> Self {
		Self { counters }
	}

	/// Checks one request against every quota active for its route class:
	/// the class overrides plus the process-wide defaults.
	pub async fn check(&self, key: &str, class: RouteClass) -> Result<(), Error> {
		let now = Utc::now().timestamp();

		for quota in class.overrides().iter().chain(DEFAULT_QUOTAS) {
			let bucket = format!("{key}:{}:{}", class.name(), quota.name);
			let hit = self.counters.hit(&bucket, quota.window, now).await?;

			if hit.count > quota.ceiling {
				let window = quota.window.as_secs() as i64;
				let retry_after = (hit.window_start + window - now).max(0) as u64;

				return Err(Error::RateLimited {
					ceiling: quota.ceiling,
					window: quota.window_label(),
					retry_after,
				});
			}
		}

		Ok(())
	}
}

/// Route-layer guard: rejected requests never reach the handler, so a
/// rejection has no side effects.
pub async fn guard(
	State((limiter, class)): State<(Limiter, RouteClass)>,
	request: Request,
	next: Next,
) -> Response {
	let key = extract::client_addr(request.headers(), request.extensions())
		.unwrap_or_else(|| "unknown".to_owned());

	if let Err(error) = limiter.check(&key, class).await {
		return error.into_response();
	}

	next.run(request).await
}

/// Periodically drops buckets that have seen no hit for longer than the
/// largest configured window.
pub fn start_sweeper(counters: Arc<dyn CounterStore>) {
	let retain = Duration::from_secs(60 * 60 * 24);
	let interval = Duration::from_secs(60);

	tokio::spawn(async move {
		loop {
			tokio::time::sleep(interval).await;

			if let Err(error) = counters.sweep(Utc::now().timestamp(), retain).await {
				tracing::warn!(%error, "rate limit sweep failed");
			}
		}
	});
}

#[cfg(test)]
mod test {
	use std::{sync::Arc, time::Duration};

	use super::{CounterStore, Limiter, MemoryCounters, RouteClass};
	use crate::Error;

	#[tokio::test]
	async fn test_window_resets_after_boundary() {
		let counters = MemoryCounters::default();
		let window = Duration::from_secs(60);

		assert_eq!(counters.hit("k", window, 0).await.unwrap().count, 1);
		assert_eq!(counters.hit("k", window, 30).await.unwrap().count, 2);
		assert_eq!(counters.hit("k", window, 59).await.unwrap().count, 3);

		let hit = counters.hit("k", window, 60).await.unwrap();

		assert_eq!(hit.count, 1);
		assert_eq!(hit.window_start, 60);
	}

	#[tokio::test]
	async fn test_keys_are_independent() {
		let counters = MemoryCounters::default();
		let window = Duration::from_secs(60);

		counters.hit("a", window, 0).await.unwrap();
		counters.hit("a", window, 0).await.unwrap();

		assert_eq!(counters.hit("b", window, 0).await.unwrap().count, 1);
	}

	#[tokio::test]
	async fn test_sweep_drops_stale_buckets() {
		let counters = MemoryCounters::default();
		let window = Duration::from_secs(60);

		counters.hit("old", window, 0).await.unwrap();
		counters.hit("new", window, 500).await.unwrap();

		counters.sweep(600, Duration::from_secs(300)).await.unwrap();

		// the stale bucket restarts, the live one keeps counting
		assert_eq!(counters.hit("old", window, 600).await.unwrap().count, 1);
		assert_eq!(counters.hit("new", window, 540).await.unwrap().count, 2);
	}

	#[sqlx::test]
	async fn test_db_counters_match_memory_semantics(pool: crate::Database) {
		let counters = super::DbCounters::new(pool);
		let window = Duration::from_secs(60);

		assert_eq!(counters.hit("k", window, 0).await.unwrap().count, 1);
		assert_eq!(counters.hit("k", window, 30).await.unwrap().count, 2);

		let hit = counters.hit("k", window, 60).await.unwrap();

		assert_eq!(hit.count, 1);
		assert_eq!(hit.window_start, 60);

		counters.sweep(600, Duration::from_secs(300)).await.unwrap();

		assert_eq!(counters.hit("k", window, 600).await.unwrap().count, 1);
	}

	#[tokio::test]
	async fn test_limiter_rejects_over_ceiling() {
		let limiter = Limiter::new(Arc::new(MemoryCounters::default()));

		for _ in 0..60 {
			limiter.check("1.2.3.4", RouteClass::Login).await.unwrap();
		}

		let error = limiter.check("1.2.3.4", RouteClass::Login).await.unwrap_err();

		match error {
			Error::RateLimited {
				ceiling, window, ..
			} => {
				assert_eq!(ceiling, 60);
				assert_eq!(window, "minute");
			}
			error => panic!("expected a rate limit rejection, got {error:?}"),
		}
	}

	#[tokio::test]
	async fn test_default_quotas_apply_to_every_class() {
		let limiter = Limiter::new(Arc::new(MemoryCounters::default()));

		for _ in 0..500 {
			limiter.check("1.2.3.4", RouteClass::Default).await.unwrap();
		}

		assert!(matches!(
			limiter.check("1.2.3.4", RouteClass::Default).await,
			Err(Error::RateLimited { ceiling: 500, .. })
		));
	}
}
