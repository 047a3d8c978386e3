use std::time::Duration;

const DEFAULT_PROVIDER_URL: &str = "https://api.bland.ai/v1/calls";
const DEFAULT_PUBLIC_URL: &str = "http://localhost:3000";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;
const DEFAULT_TRIGGER_TOLERANCE_SECS: u64 = 60;
const DEFAULT_DUPLICATE_LOOKBACK_SECS: u64 = 600;
const MAX_WINDOW_SECS: u64 = 7 * 24 * 60 * 60;

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} must be a whole number of seconds between 1 and 604800 (got '{value}')")]
    InvalidNumber { name: &'static str, value: String },
    #[error(
        "duplicate look-back ({lookback_secs}s) must exceed both the poll interval ({poll_secs}s) and the trigger tolerance ({tolerance_secs}s)"
    )]
    LookbackTooShort {
        lookback_secs: u64,
        poll_secs: u64,
        tolerance_secs: u64,
    },
}

/// Credentials and knobs for the external voice API.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub api_key: String,
    pub url: String,
    pub voice: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub poll_interval: Duration,
    pub trigger_tolerance: Duration,
    pub duplicate_lookback: Duration,
}

impl SchedulerConfig {
    pub fn trigger_tolerance_delta(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.trigger_tolerance.as_secs().min(MAX_WINDOW_SECS) as i64)
    }

    pub fn duplicate_lookback_delta(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.duplicate_lookback.as_secs().min(MAX_WINDOW_SECS) as i64)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            trigger_tolerance: Duration::from_secs(DEFAULT_TRIGGER_TOLERANCE_SECS),
            duplicate_lookback: Duration::from_secs(DEFAULT_DUPLICATE_LOOKBACK_SECS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// `None` selects the simulated initiator
    pub provider: Option<ProviderConfig>,
    pub public_url: String,
    pub webhook_secret: Option<String>,
    pub webhook_require_signature: bool,
    pub operator_token: Option<String>,
    pub scheduler: SchedulerConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let flag = |name: &str, default: bool| {
            get(name)
                .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
                .unwrap_or(default)
        };
        let seconds = |name: &'static str, default: u64| -> Result<Duration, ConfigError> {
            match get(name) {
                None => Ok(Duration::from_secs(default)),
                Some(value) => match value.parse::<u64>() {
                    Ok(secs) if (1..=MAX_WINDOW_SECS).contains(&secs) => Ok(Duration::from_secs(secs)),
                    _ => Err(ConfigError::InvalidNumber { name, value }),
                },
            }
        };

        let scheduler = SchedulerConfig {
            enabled: flag("CHECKIN_SCHEDULER_ENABLED", true),
            poll_interval: seconds("CHECKIN_POLL_INTERVAL_SECS", DEFAULT_POLL_INTERVAL_SECS)?,
            trigger_tolerance: seconds(
                "CHECKIN_TRIGGER_TOLERANCE_SECS",
                DEFAULT_TRIGGER_TOLERANCE_SECS,
            )?,
            duplicate_lookback: seconds(
                "CHECKIN_DUPLICATE_LOOKBACK_SECS",
                DEFAULT_DUPLICATE_LOOKBACK_SECS,
            )?,
        };
        if scheduler.duplicate_lookback <= scheduler.poll_interval
            || scheduler.duplicate_lookback <= scheduler.trigger_tolerance
        {
            return Err(ConfigError::LookbackTooShort {
                lookback_secs: scheduler.duplicate_lookback.as_secs(),
                poll_secs: scheduler.poll_interval.as_secs(),
                tolerance_secs: scheduler.trigger_tolerance.as_secs(),
            });
        }

        let provider = get("CHECKIN_PROVIDER_API_KEY").map(|api_key| ProviderConfig {
            api_key,
            url: get("CHECKIN_PROVIDER_URL").unwrap_or_else(|| DEFAULT_PROVIDER_URL.to_string()),
            voice: get("CHECKIN_PROVIDER_VOICE"),
            model: get("CHECKIN_PROVIDER_MODEL"),
        });

        Ok(Self {
            provider,
            public_url: get("CHECKIN_PUBLIC_URL")
                .unwrap_or_else(|| DEFAULT_PUBLIC_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            webhook_secret: get("CHECKIN_WEBHOOK_SECRET"),
            webhook_require_signature: flag("CHECKIN_WEBHOOK_REQUIRE_SIGNATURE", false),
            operator_token: get("CHECKIN_OPERATOR_TOKEN"),
            scheduler,
        })
    }

    pub fn webhook_url(&self) -> String {
        format!("{}/v1/webhooks/voice", self.public_url)
    }
}
