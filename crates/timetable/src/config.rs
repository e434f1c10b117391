/// Runtime configuration for the scraper and store
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Default browser-like user agent; the booking system rejects obvious bots.
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Configuration for a scrape run.
#[derive(Debug, Clone)]
pub struct ScrapeConfig {
    /// Path of the SQLite store for the current generation
    pub db_path: PathBuf,
    /// Pause between two consecutive room requests
    pub request_delay: Duration,
    /// Extra pause before every retry pass
    pub retry_backoff: Duration,
    /// Attempts per room before it is marked failed
    pub max_attempts: u32,
    /// Whole-request timeout
    pub request_timeout: Duration,
    /// TCP connect timeout
    pub connect_timeout: Duration,
    /// User agent string
    pub user_agent: String,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("timetable.db"),
            request_delay: Duration::from_secs(1),
            retry_backoff: Duration::from_secs(30),
            max_attempts: 3,
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl ScrapeConfig {
    /// Loads configuration from environment variables, falling back to the
    /// defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            db_path: std::env::var("TIMETABLE_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            request_delay: env_parse::<u64>("SCRAPE_REQUEST_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.request_delay),
            retry_backoff: env_parse::<u64>("SCRAPE_RETRY_BACKOFF_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_backoff),
            max_attempts: env_parse::<u32>("SCRAPE_MAX_ATTEMPTS")
                .filter(|&n| n > 0)
                .unwrap_or(defaults.max_attempts),
            request_timeout: env_parse::<u64>("SCRAPE_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            connect_timeout: defaults.connect_timeout,
            user_agent: std::env::var("SCRAPE_USER_AGENT").unwrap_or(defaults.user_agent),
        }
    }

    /// Configuration with no delays, for tests.
    pub fn for_test(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            request_delay: Duration::ZERO,
            retry_backoff: Duration::ZERO,
            ..Self::default()
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key = key, value = %raw, "Ignoring unparseable configuration value");
            None
        }
    }
}
