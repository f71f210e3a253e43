use serde::Deserialize;
use std::env;
use std::time::Duration;

const DEFAULT_API_BASE_URL: &str = "http://localhost:8000/api/v1";
const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 15;
const DEFAULT_AUTOSAVE_DEBOUNCE_MS: u64 = 400;
const DEFAULT_LOW_TIME_THRESHOLD_SECONDS: u32 = 300;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub api_base_url: String,
    pub request_timeout_seconds: u64,
    pub autosave_debounce_ms: u64,
    pub low_time_threshold_seconds: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout_seconds: DEFAULT_REQUEST_TIMEOUT_SECONDS,
            autosave_debounce_ms: DEFAULT_AUTOSAVE_DEBOUNCE_MS,
            low_time_threshold_seconds: DEFAULT_LOW_TIME_THRESHOLD_SECONDS,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();

        // Determine environment (defaults to dev)
        let env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // config/*.toml first, APP__* variables override
        let settings = config::Config::builder()
            .add_source(config::File::with_name(&format!("config/{}", env)).required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        let api_base_url = settings
            .get_string("api.base_url")
            .or_else(|_| env::var("API_BASE_URL"))
            .map(|url| normalize_base_url(&url))
            .ok()
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());

        let request_timeout_seconds = positive_setting(
            &settings,
            "api.request_timeout_seconds",
            "REQUEST_TIMEOUT_SECONDS",
        )
        .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECONDS);

        let autosave_debounce_ms =
            positive_setting(&settings, "attempt.autosave_debounce_ms", "AUTOSAVE_DEBOUNCE_MS")
                .unwrap_or(DEFAULT_AUTOSAVE_DEBOUNCE_MS);

        let low_time_threshold_seconds = positive_setting(
            &settings,
            "attempt.low_time_threshold_seconds",
            "LOW_TIME_THRESHOLD_SECONDS",
        )
        .and_then(|value| u32::try_from(value).ok())
        .unwrap_or(DEFAULT_LOW_TIME_THRESHOLD_SECONDS);

        Ok(Config {
            api_base_url,
            request_timeout_seconds,
            autosave_debounce_ms,
            low_time_threshold_seconds,
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            autosave_debounce: Duration::from_millis(self.autosave_debounce_ms),
            low_time_threshold_seconds: self.low_time_threshold_seconds,
        }
    }
}

/// Timing knobs of a single attempt screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerSettings {
    pub autosave_debounce: Duration,
    pub low_time_threshold_seconds: u32,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Config::default().controller_settings()
    }
}

fn positive_setting(settings: &config::Config, key: &str, env_key: &str) -> Option<u64> {
    settings
        .get_string(key)
        .or_else(|_| env::var(env_key))
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
}

fn normalize_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}
