use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
/// # Config Error
pub enum ConfigError {
    #[error("I/O error occurred reading {path}: {source}")]
    /// The options file exists but could not be read.
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse options file {path}: {message}")]
    /// The options file is not valid JSON5 for the options shape.
    ParseError {
        path: PathBuf,
        message: String,
    },

    #[error("Environment variable {name} has an invalid value '{value}'")]
    /// An override variable could not be parsed.
    InvalidEnvVar {
        name: String,
        value: String,
    },

    #[error("Invalid options: {0}")]
    /// The merged options are inconsistent.
    Invalid(String),
}

/// # PubSub Options
///
/// Everything the engine needs to know about a connection.
#[derive(Debug, Clone, PartialEq)]
pub struct PubSubOptions {
    /// WebSocket URL of the pub/sub service.
    pub url: String,
    /// Time allowed for the transport to open.
    pub connection_timeout: Duration,
    /// Reconnect automatically after an unintentional disconnect.
    pub auto_reconnect: bool,
    /// First reconnect delay, and the delay restored after every successful connect.
    pub min_reconnect_delay: Duration,
    /// Upper bound for the doubling reconnect delay.
    pub max_reconnect_delay: Duration,
    /// Reconnect attempts before giving up, `-1` for no limit.
    pub max_reconnect_attempts: i64,
    /// How long a request waits for its response before timing out.
    pub request_timeout: Duration,
    /// Upper bound of live entries in the pending request table.
    pub max_pending_requests: usize,
    /// Buffer size of the session event broadcast channel.
    pub event_capacity: usize,
}

impl Default for PubSubOptions {
    fn default() -> Self {
        Self {
            url: String::new(),
            connection_timeout: Duration::from_secs(30),
            auto_reconnect: true,
            min_reconnect_delay: Duration::from_secs(5),
            max_reconnect_delay: Duration::from_secs(300),
            max_reconnect_attempts: -1,
            request_timeout: Duration::from_secs(60),
            max_pending_requests: 10_000,
            event_capacity: 1024,
        }
    }
}

impl PubSubOptions {
    /// Default options pointed at `url`.
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Checks the options for values the engine cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_reconnect_delay > self.max_reconnect_delay {
            return Err(ConfigError::Invalid(format!(
                "minReconnectDelay ({}s) is larger than maxReconnectDelay ({}s)",
                self.min_reconnect_delay.as_secs_f64(),
                self.max_reconnect_delay.as_secs_f64()
            )));
        }
        if self.max_reconnect_attempts < -1 {
            return Err(ConfigError::Invalid(format!(
                "maxReconnectAttempts must be -1 or larger, got {}",
                self.max_reconnect_attempts
            )));
        }
        if self.max_pending_requests == 0 || self.event_capacity == 0 {
            return Err(ConfigError::Invalid(
                "maxPendingRequests and eventCapacity must be non-zero".to_string(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::Invalid("requestTimeoutSecs must be non-zero".to_string()));
        }
        Ok(())
    }

    fn apply(mut self, file: OptionsFile) -> Result<Self, ConfigError> {
        if let Some(url) = file.url {
            self.url = url;
        }
        if let Some(secs) = file.connection_timeout_secs {
            self.connection_timeout = Duration::from_secs(secs);
        }
        if let Some(flag) = file.auto_reconnect {
            self.auto_reconnect = flag;
        }
        if let Some(secs) = file.min_reconnect_delay_secs {
            self.min_reconnect_delay = secs_to_duration("minReconnectDelaySecs", secs)?;
        }
        if let Some(secs) = file.max_reconnect_delay_secs {
            self.max_reconnect_delay = secs_to_duration("maxReconnectDelaySecs", secs)?;
        }
        if let Some(attempts) = file.max_reconnect_attempts {
            self.max_reconnect_attempts = attempts;
        }
        if let Some(secs) = file.request_timeout_secs {
            self.request_timeout = Duration::from_secs(secs);
        }
        if let Some(limit) = file.max_pending_requests {
            self.max_pending_requests = limit;
        }
        if let Some(capacity) = file.event_capacity {
            self.event_capacity = capacity;
        }
        Ok(self)
    }
}

/// Fractional seconds from a file or the environment. JSON5 allows `NaN` and
/// `Infinity`, so the value is checked before it becomes a `Duration`.
fn secs_to_duration(name: &str, secs: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(secs)
        .map_err(|_| ConfigError::Invalid(format!("{} must be a finite, non-negative number, got {}", name, secs)))
}

/// The on-disk shape of the options, every field optional.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OptionsFile {
    pub url: Option<String>,
    pub connection_timeout_secs: Option<u64>,
    pub auto_reconnect: Option<bool>,
    pub min_reconnect_delay_secs: Option<f64>,
    pub max_reconnect_delay_secs: Option<f64>,
    pub max_reconnect_attempts: Option<i64>,
    pub request_timeout_secs: Option<u64>,
    pub max_pending_requests: Option<usize>,
    pub event_capacity: Option<usize>,
}

impl OptionsFile {
    // Merge two files, where 'other' overrides 'self' for Some values
    fn merge(self, other: OptionsFile) -> OptionsFile {
        OptionsFile {
            url: other.url.or(self.url),
            connection_timeout_secs: other.connection_timeout_secs.or(self.connection_timeout_secs),
            auto_reconnect: other.auto_reconnect.or(self.auto_reconnect),
            min_reconnect_delay_secs: other.min_reconnect_delay_secs.or(self.min_reconnect_delay_secs),
            max_reconnect_delay_secs: other.max_reconnect_delay_secs.or(self.max_reconnect_delay_secs),
            max_reconnect_attempts: other.max_reconnect_attempts.or(self.max_reconnect_attempts),
            request_timeout_secs: other.request_timeout_secs.or(self.request_timeout_secs),
            max_pending_requests: other.max_pending_requests.or(self.max_pending_requests),
            event_capacity: other.event_capacity.or(self.event_capacity),
        }
    }

    fn from_env() -> Result<OptionsFile, ConfigError> {
        Ok(OptionsFile {
            url: env::var("PUBSUB_URL").ok(),
            connection_timeout_secs: env_parse("PUBSUB_CONNECTION_TIMEOUT_SECS")?,
            auto_reconnect: env_parse("PUBSUB_AUTO_RECONNECT")?,
            min_reconnect_delay_secs: env_parse("PUBSUB_MIN_RECONNECT_DELAY_SECS")?,
            max_reconnect_delay_secs: env_parse("PUBSUB_MAX_RECONNECT_DELAY_SECS")?,
            max_reconnect_attempts: env_parse("PUBSUB_MAX_RECONNECT_ATTEMPTS")?,
            request_timeout_secs: env_parse("PUBSUB_REQUEST_TIMEOUT_SECS")?,
            max_pending_requests: None,
            event_capacity: None,
        })
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>, ConfigError> {
    match env::var(name) {
        Ok(value) => value.trim().parse::<T>().map(Some).map_err(|_| ConfigError::InvalidEnvVar {
            name: name.to_string(),
            value,
        }),
        Err(_) => Ok(None),
    }
}

fn read_options_file(path: &Path) -> Result<OptionsFile, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::IoError {
        path: path.to_path_buf(),
        source,
    })?;
    json5::from_str::<OptionsFile>(&text).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Loads options: defaults, then the JSON5 file at `path` (if given and
/// present), then `PUBSUB_*` environment variables.
pub fn load_options(path: Option<&Path>) -> Result<PubSubOptions, ConfigError> {
    let mut layered = OptionsFile::default();

    if let Some(path) = path {
        if path.exists() {
            layered = layered.merge(read_options_file(path)?);
        } else {
            log::info!("Options file not found at {}. Using defaults and environment.", path.display());
        }
    }

    layered = layered.merge(OptionsFile::from_env()?);

    let options = PubSubOptions::default().apply(layered)?;
    options.validate()?;
    Ok(options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_the_service_defaults() {
        let o = PubSubOptions::default();
        assert_eq!(o.connection_timeout, Duration::from_secs(30));
        assert!(o.auto_reconnect);
        assert_eq!(o.min_reconnect_delay, Duration::from_secs(5));
        assert_eq!(o.max_reconnect_delay, Duration::from_secs(300));
        assert_eq!(o.max_reconnect_attempts, -1);
        assert_eq!(o.max_pending_requests, 10_000);
        assert!(o.validate().is_ok());
    }

    #[test]
    fn file_values_override_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "{{\n  // trailing comments are fine in JSON5\n  url: 'wss://example.test/ws',\n  maxReconnectAttempts: 3,\n  minReconnectDelaySecs: 1.5,\n}}"
        )
        .unwrap();

        let o = load_options(Some(file.path())).unwrap();
        assert_eq!(o.url, "wss://example.test/ws");
        assert_eq!(o.max_reconnect_attempts, 3);
        assert_eq!(o.min_reconnect_delay, Duration::from_millis(1500));
        assert_eq!(o.request_timeout, Duration::from_secs(60));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let o = load_options(Some(Path::new("/definitely/not/here.json5"))).unwrap();
        assert_eq!(o.max_pending_requests, 10_000);
    }

    #[test]
    fn later_layers_win_on_merge() {
        let base = OptionsFile {
            url: Some("a".into()),
            auto_reconnect: Some(true),
            ..Default::default()
        };
        let over = OptionsFile {
            url: Some("b".into()),
            ..Default::default()
        };
        let merged = base.merge(over);
        assert_eq!(merged.url.as_deref(), Some("b"));
        assert_eq!(merged.auto_reconnect, Some(true));
    }

    #[test]
    fn unusable_delay_values_are_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{{ minReconnectDelaySecs: -1 }}").unwrap();
        assert!(matches!(load_options(Some(file.path())), Err(ConfigError::Invalid(_))));

        for body in ["{ maxReconnectDelaySecs: NaN }", "{ maxReconnectDelaySecs: -Infinity }"] {
            let mut file = tempfile::NamedTempFile::new().unwrap();
            writeln!(file, "{}", body).unwrap();
            assert!(load_options(Some(file.path())).is_err(), "{} was accepted", body);
        }
    }

    #[test]
    fn negative_seconds_do_not_become_a_duration() {
        assert!(matches!(secs_to_duration("x", -0.5), Err(ConfigError::Invalid(_))));
        assert!(matches!(secs_to_duration("x", f64::NAN), Err(ConfigError::Invalid(_))));
        assert!(matches!(secs_to_duration("x", f64::INFINITY), Err(ConfigError::Invalid(_))));
        assert_eq!(secs_to_duration("x", 2.5).unwrap(), Duration::from_millis(2500));
    }

    #[test]
    fn inverted_delays_are_rejected() {
        let o = PubSubOptions {
            min_reconnect_delay: Duration::from_secs(10),
            max_reconnect_delay: Duration::from_secs(1),
            ..Default::default()
        };
        assert!(matches!(o.validate(), Err(ConfigError::Invalid(_))));
    }
}
