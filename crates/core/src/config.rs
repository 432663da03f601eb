use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_CONFIG_FILES: [&str; 2] = ["haggl.toml", "config/haggl.toml"];

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AppConfig {
    pub feed: FeedConfig,
    pub view: ViewConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FeedConfig {
    pub base_url: String,
    pub mode: FeedMode,
    pub backfill_limit: u32,
    pub reconnect_delay_ms: u64,
    pub request_timeout_secs: u64,
    pub synthetic_tick_ms: u64,
    pub synthetic_seed: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ViewConfig {
    pub activity_log_capacity: usize,
    pub terminal_redirect_delay_ms: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedMode {
    Http,
    Synthetic,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub feed_base_url: Option<String>,
    pub feed_mode: Option<FeedMode>,
    pub backfill_limit: Option<u32>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            feed: FeedConfig {
                base_url: "http://localhost:8001".to_string(),
                mode: FeedMode::Http,
                backfill_limit: 50,
                reconnect_delay_ms: 3_000,
                request_timeout_secs: 10,
                synthetic_tick_ms: 1_500,
                synthetic_seed: 7,
            },
            view: ViewConfig { activity_log_capacity: 100, terminal_redirect_delay_ms: 5_000 },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl FeedMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Synthetic => "synthetic",
        }
    }
}

impl std::str::FromStr for FeedMode {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(Self::Http),
            "synthetic" | "mock" => Ok(Self::Synthetic),
            other => Err(ConfigError::Validation(format!(
                "unsupported feed mode `{other}` (expected http|synthetic)"
            ))),
        }
    }
}

impl LogFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Compact => "compact",
            Self::Pretty => "pretty",
            Self::Json => "json",
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl FeedConfig {
    /// Join `path` onto the base URL with exactly one slash between them.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path.trim_start_matches('/'))
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILES[0]));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(feed) = patch.feed {
            if let Some(base_url) = feed.base_url {
                self.feed.base_url = base_url;
            }
            if let Some(mode) = feed.mode {
                self.feed.mode = mode;
            }
            if let Some(backfill_limit) = feed.backfill_limit {
                self.feed.backfill_limit = backfill_limit;
            }
            if let Some(reconnect_delay_ms) = feed.reconnect_delay_ms {
                self.feed.reconnect_delay_ms = reconnect_delay_ms;
            }
            if let Some(request_timeout_secs) = feed.request_timeout_secs {
                self.feed.request_timeout_secs = request_timeout_secs;
            }
            if let Some(synthetic_tick_ms) = feed.synthetic_tick_ms {
                self.feed.synthetic_tick_ms = synthetic_tick_ms;
            }
            if let Some(synthetic_seed) = feed.synthetic_seed {
                self.feed.synthetic_seed = synthetic_seed;
            }
        }

        if let Some(view) = patch.view {
            if let Some(capacity) = view.activity_log_capacity {
                self.view.activity_log_capacity = capacity;
            }
            if let Some(delay) = view.terminal_redirect_delay_ms {
                self.view.terminal_redirect_delay_ms = delay;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("HAGGL_FEED_BASE_URL") {
            self.feed.base_url = value;
        }
        if let Some(value) = read_env("HAGGL_FEED_MODE") {
            self.feed.mode = value.parse()?;
        }
        if let Some(value) = read_env("HAGGL_FEED_BACKFILL_LIMIT") {
            self.feed.backfill_limit = parse_u32("HAGGL_FEED_BACKFILL_LIMIT", &value)?;
        }
        if let Some(value) = read_env("HAGGL_FEED_RECONNECT_DELAY_MS") {
            self.feed.reconnect_delay_ms = parse_u64("HAGGL_FEED_RECONNECT_DELAY_MS", &value)?;
        }
        if let Some(value) = read_env("HAGGL_FEED_REQUEST_TIMEOUT_SECS") {
            self.feed.request_timeout_secs =
                parse_u64("HAGGL_FEED_REQUEST_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("HAGGL_FEED_SYNTHETIC_TICK_MS") {
            self.feed.synthetic_tick_ms = parse_u64("HAGGL_FEED_SYNTHETIC_TICK_MS", &value)?;
        }
        if let Some(value) = read_env("HAGGL_FEED_SYNTHETIC_SEED") {
            self.feed.synthetic_seed = parse_u64("HAGGL_FEED_SYNTHETIC_SEED", &value)?;
        }

        if let Some(value) = read_env("HAGGL_VIEW_ACTIVITY_LOG_CAPACITY") {
            self.view.activity_log_capacity =
                parse_usize("HAGGL_VIEW_ACTIVITY_LOG_CAPACITY", &value)?;
        }
        if let Some(value) = read_env("HAGGL_VIEW_TERMINAL_REDIRECT_DELAY_MS") {
            self.view.terminal_redirect_delay_ms =
                parse_u64("HAGGL_VIEW_TERMINAL_REDIRECT_DELAY_MS", &value)?;
        }

        let log_level = read_env("HAGGL_LOGGING_LEVEL").or_else(|| read_env("HAGGL_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format = read_env("HAGGL_LOGGING_FORMAT").or_else(|| read_env("HAGGL_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(base_url) = overrides.feed_base_url {
            self.feed.base_url = base_url;
        }
        if let Some(mode) = overrides.feed_mode {
            self.feed.mode = mode;
        }
        if let Some(backfill_limit) = overrides.backfill_limit {
            self.feed.backfill_limit = backfill_limit;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_feed(&self.feed)?;
        validate_view(&self.view)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

/// First config file that would be read for `explicit_path`, if any.
pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    DEFAULT_CONFIG_FILES.into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_feed(feed: &FeedConfig) -> Result<(), ConfigError> {
    let base_url = feed.base_url.trim();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "feed.base_url must start with http:// or https://".to_string(),
        ));
    }

    if feed.backfill_limit == 0 || feed.backfill_limit > 500 {
        return Err(ConfigError::Validation(
            "feed.backfill_limit must be in range 1..=500".to_string(),
        ));
    }

    if feed.reconnect_delay_ms == 0 {
        return Err(ConfigError::Validation(
            "feed.reconnect_delay_ms must be greater than zero".to_string(),
        ));
    }

    if feed.request_timeout_secs == 0 || feed.request_timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "feed.request_timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if feed.synthetic_tick_ms == 0 {
        return Err(ConfigError::Validation(
            "feed.synthetic_tick_ms must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_view(view: &ViewConfig) -> Result<(), ConfigError> {
    if view.activity_log_capacity == 0 {
        return Err(ConfigError::Validation(
            "view.activity_log_capacity must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    feed: Option<FeedPatch>,
    view: Option<ViewPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct FeedPatch {
    base_url: Option<String>,
    mode: Option<FeedMode>,
    backfill_limit: Option<u32>,
    reconnect_delay_ms: Option<u64>,
    request_timeout_secs: Option<u64>,
    synthetic_tick_ms: Option<u64>,
    synthetic_seed: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ViewPatch {
    activity_log_capacity: Option<usize>,
    terminal_redirect_delay_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
