pub mod types;
pub mod algorithms;
pub mod config;
pub mod coordinator;
pub mod handlers;
pub mod notify;
pub mod observability;
pub mod retention;
pub mod store;
pub mod sources {
    pub mod coingecko;
}

pub use types::*;
pub use algorithms::{AlertCategory, CandlePattern, Evaluation, SignalClassifier, SignalReport};
pub use config::Settings;
pub use coordinator::{spawn_poller, Coordinator, CycleOutcome, IngestOutcome};
pub use handlers::{router, AppState};
pub use notify::{LogNotifier, TelegramNotifier};
pub use observability::MetricsCollector;
pub use retention::RetentionTrimmer;
pub use sources::coingecko::CoinGeckoClient;
pub use store::{MemoryStore, PgStore};
