use std::env;
use std::fs;
use std::path::Path;

use haggl_core::config::{resolve_config_path, AppConfig, LoadOptions};
use toml::Value;

struct FieldSource<'a> {
    flag: bool,
    env_keys: &'a [&'a str],
}

pub fn run(config: &AppConfig, options: &LoadOptions) -> String {
    let config_file_path = resolve_config_path(options.config_path.as_deref());
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let overrides = &options.overrides;

    let fields: [(&str, String, FieldSource<'_>); 11] = [
        (
            "feed.base_url",
            config.feed.base_url.clone(),
            FieldSource {
                flag: overrides.feed_base_url.is_some(),
                env_keys: &["HAGGL_FEED_BASE_URL"],
            },
        ),
        (
            "feed.mode",
            config.feed.mode.as_str().to_string(),
            FieldSource { flag: overrides.feed_mode.is_some(), env_keys: &["HAGGL_FEED_MODE"] },
        ),
        (
            "feed.backfill_limit",
            config.feed.backfill_limit.to_string(),
            FieldSource {
                flag: overrides.backfill_limit.is_some(),
                env_keys: &["HAGGL_FEED_BACKFILL_LIMIT"],
            },
        ),
        (
            "feed.reconnect_delay_ms",
            config.feed.reconnect_delay_ms.to_string(),
            FieldSource { flag: false, env_keys: &["HAGGL_FEED_RECONNECT_DELAY_MS"] },
        ),
        (
            "feed.request_timeout_secs",
            config.feed.request_timeout_secs.to_string(),
            FieldSource { flag: false, env_keys: &["HAGGL_FEED_REQUEST_TIMEOUT_SECS"] },
        ),
        (
            "feed.synthetic_tick_ms",
            config.feed.synthetic_tick_ms.to_string(),
            FieldSource { flag: false, env_keys: &["HAGGL_FEED_SYNTHETIC_TICK_MS"] },
        ),
        (
            "feed.synthetic_seed",
            config.feed.synthetic_seed.to_string(),
            FieldSource { flag: false, env_keys: &["HAGGL_FEED_SYNTHETIC_SEED"] },
        ),
        (
            "view.activity_log_capacity",
            config.view.activity_log_capacity.to_string(),
            FieldSource { flag: false, env_keys: &["HAGGL_VIEW_ACTIVITY_LOG_CAPACITY"] },
        ),
        (
            "view.terminal_redirect_delay_ms",
            config.view.terminal_redirect_delay_ms.to_string(),
            FieldSource { flag: false, env_keys: &["HAGGL_VIEW_TERMINAL_REDIRECT_DELAY_MS"] },
        ),
        (
            "logging.level",
            config.logging.level.clone(),
            FieldSource {
                flag: overrides.log_level.is_some(),
                env_keys: &["HAGGL_LOGGING_LEVEL", "HAGGL_LOG_LEVEL"],
            },
        ),
        (
            "logging.format",
            config.logging.format.as_str().to_string(),
            FieldSource {
                flag: overrides.log_format.is_some(),
                env_keys: &["HAGGL_LOGGING_FORMAT", "HAGGL_LOG_FORMAT"],
            },
        ),
    ];

    let mut lines =
        vec!["effective config (source precedence: flag > env > file > default):".to_string()];
    for (key, value, source) in &fields {
        lines.push(render_line(
            key,
            value,
            field_source(key, source, config_file_doc.as_ref(), config_file_path.as_deref()),
        ));
    }

    lines.join("\n")
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    source: &FieldSource<'_>,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if source.flag {
        return "flag".to_string();
    }

    if let Some(env_key) = source.env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

