use std::error::Error;
use std::sync::Arc;

use open_letter::config::Config;
use open_letter::mail::SmtpNotifier;
use open_letter::rate_limit::RateLimiter;
use open_letter::store::{run_migrations, PgSignatureStore};
use open_letter::AppState;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[rocket::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let config = Config::read_env()?;

    info!("Connecting to database...");
    let store = PgSignatureStore::connect(
        &config.database_url,
        config.database_pool_size,
        config.store_retry,
    )?;
    let applied = run_migrations(store.pool())?;
    info!(applied, "Migrations complete");

    let notifier = SmtpNotifier::new(&config.mail, &config.public_base_url)?;

    let state = AppState {
        store: Arc::new(store),
        notifier: Arc::new(notifier),
        limiter: RateLimiter::new(config.rate_limit_max, config.rate_limit_window),
    };

    info!("Starting server...");
    open_letter::rocket(state)
        .launch()
        .await
        .map_err(|e| e.to_string())?;

    info!("Server shut down");
    Ok(())
}
