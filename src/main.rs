#![warn(clippy::pedantic)]

mod config;
mod error;
mod extract;
mod flash;
mod model;
mod password;
mod ratelimit;
mod route;
mod session;
mod store;
#[cfg(test)]
mod test;

use std::{net::SocketAddr, sync::Arc};

pub use error::Error;

pub type Database = sqlx::Pool<sqlx::Sqlite>;
pub type AppState = State;

/// The shared application state.
///
/// This should contain all shared dependencies that handlers need to access,
/// such as the database pool, the session signer, and the rate limiter.
#[derive(Clone, axum::extract::FromRef)]
pub struct State {
	pub database: Database,
	pub sessions: session::Sessions,
	pub limiter: ratelimit::Limiter,
}

#[tokio::main]
async fn main() {
	tracing_subscriber::fmt::init();
	dotenvy::dotenv().ok();

	let config = config::Config::from_env();

	let database = store::connect(&config.database_url)
		.await
		.expect("failed to open database");

	sqlx::migrate!()
		.run(&database)
		.await
		.expect("failed to run migrations");

	let counters: Arc<dyn ratelimit::CounterStore> = match config.ratelimit_store {
		config::RateLimitStore::Memory => {
			let counters = Arc::new(ratelimit::MemoryCounters::default());
			ratelimit::start_sweeper(Arc::clone(&counters) as Arc<dyn ratelimit::CounterStore>);
			counters
		}
		config::RateLimitStore::Database => {
			let counters = Arc::new(ratelimit::DbCounters::new(database.clone()));
			ratelimit::start_sweeper(Arc::clone(&counters) as Arc<dyn ratelimit::CounterStore>);
			counters
		}
	};

	let state = State {
		database,
		sessions: session::Sessions::new(config.secret_key.as_deref(), config.session_lifetime),
		limiter: ratelimit::Limiter::new(counters),
	};

	let app = route::router(state);

	let listener = tokio::net::TcpListener::bind(("127.0.0.1", config.port))
		.await
		.expect("failed to bind to port");

	tracing::info!("listening on port {}", config.port);

	axum::serve(
		listener,
		app.into_make_service_with_connect_info::<SocketAddr>(),
	)
	.await
	.unwrap();
}
