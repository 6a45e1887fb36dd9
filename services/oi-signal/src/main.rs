use std::sync::Arc;
use tracing::{info, warn, Level};

use oi_signal::{
    router, spawn_poller, AppState, CoinGeckoClient, Coordinator, LogNotifier, MemoryStore,
    NotificationChannel, ObservationStore, PgStore, Settings, TelegramNotifier,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    info!("Starting OI Signal Service...");

    let settings = Settings::load()?;
    info!(
        symbol = %settings.symbol,
        poll_interval_secs = settings.poll_interval_secs,
        "✓ Configuration loaded"
    );

    // Observation logs
    let store: Arc<dyn ObservationStore> = match settings.database_url.as_deref() {
        Some(url) => {
            let pg = PgStore::connect(url).await?;
            pg.migrate().await?;
            info!("✓ Postgres observation store ready");
            Arc::new(pg)
        }
        None => {
            warn!("⚠ No database_url configured, observation logs are in-memory only");
            Arc::new(MemoryStore::new())
        }
    };

    let coingecko = Arc::new(CoinGeckoClient::new(&settings.coingecko)?);
    info!("✓ CoinGecko client initialized");

    // Alert and diagnostic channels
    let alerts: Arc<dyn NotificationChannel> = match TelegramNotifier::alerts(&settings.telegram)? {
        Some(notifier) => Arc::new(notifier),
        None => {
            warn!("⚠ Telegram alert chat not configured, alerts are logged only");
            Arc::new(LogNotifier::new("log_alerts"))
        }
    };
    let diagnostics: Arc<dyn NotificationChannel> =
        match TelegramNotifier::diagnostics(&settings.telegram)? {
            Some(notifier) => Arc::new(notifier),
            None => Arc::new(LogNotifier::new("log_diagnostics")),
        };

    let coordinator = Arc::new(Coordinator::new(
        &settings,
        store,
        coingecko,
        alerts,
        diagnostics,
    ));

    spawn_poller(
        Arc::clone(&coordinator),
        settings.poll_interval(),
        settings.run_on_startup,
    );

    let app = router(Arc::new(AppState { coordinator }));

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", settings.port)).await?;
    info!("🚀 OI Signal Service listening on port {}", settings.port);

    axum::serve(listener, app).await?;

    Ok(())
}
