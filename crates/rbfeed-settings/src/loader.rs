//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`FeedSettings::default()`]
//! 2. If a settings file is given and exists, deep-merge its values over defaults
//! 3. Apply environment variable overrides (highest priority)

use std::path::Path;

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::FeedSettings;

/// Env toggle for the mutation protocol, shared with other now-playing tools.
pub const MODIFY_HISTORY_ENV: &str = "NP_DANGEROUSLY_MODIFY_RB_DB";

/// Load defaults plus env var overrides, without a settings file.
pub fn load_settings() -> FeedSettings {
    let mut settings = FeedSettings::default();
    apply_env_overrides(&mut settings);
    settings
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<FeedSettings> {
    let defaults = serde_json::to_value(FeedSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: FeedSettings = serde_json::from_value(merged)?;
    clamp_limits(&mut settings);
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Raise zero limits from a settings file to 1.
///
/// A zero page size would make every poll empty without any error.
pub fn clamp_limits(settings: &mut FeedSettings) {
    let clamp_u32 = |key: &str, value: &mut u32| {
        if *value == 0 {
            tracing::warn!(key, "zero is not a valid limit, using 1");
            *value = 1;
        }
    };
    clamp_u32("historyMaxRows", &mut settings.history_max_rows);
    clamp_u32("maxRows", &mut settings.max_rows);
    if settings.poll_interval_ms == 0 {
        tracing::warn!(key = "pollIntervalMs", "zero is not a valid limit, using 1");
        settings.poll_interval_ms = 1;
    }
    if settings.channel_capacity == 0 {
        tracing::warn!(key = "channelCapacity", "zero is not a valid limit, using 1");
        settings.channel_capacity = 1;
    }
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment variable overrides to loaded settings.
///
/// Invalid values are ignored with a warning (fall back to file/default).
pub fn apply_env_overrides(settings: &mut FeedSettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Same as [`apply_env_overrides`] with an injectable variable source.
pub fn apply_overrides_from<F>(settings: &mut FeedSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let string = |name: &str| lookup(name).filter(|v| !v.is_empty());

    if let Some(v) = string("RBFEED_DB_PATH") {
        settings.db_path = Some(v.into());
    }
    if let Some(v) = string("RBFEED_DB_PASSWORD") {
        settings.db_password = Some(v);
    }
    if let Some(v) = string("RBFEED_POLL_INTERVAL_MS") {
        match parse_u64_range(&v, 50, 3_600_000) {
            Some(n) => settings.poll_interval_ms = n,
            None => warn_invalid("RBFEED_POLL_INTERVAL_MS", &v),
        }
    }
    if let Some(v) = string("RBFEED_MAX_ROWS") {
        match parse_u32_range(&v, 1, 1_000_000) {
            Some(n) => settings.max_rows = n,
            None => warn_invalid("RBFEED_MAX_ROWS", &v),
        }
    }
    if let Some(v) = string("RBFEED_HISTORY_MAX_ROWS") {
        match parse_u32_range(&v, 1, 100_000) {
            Some(n) => settings.history_max_rows = n,
            None => warn_invalid("RBFEED_HISTORY_MAX_ROWS", &v),
        }
    }
    if let Some(v) = string("RBFEED_EMIT_TRACKS") {
        match parse_bool(&v) {
            Some(b) => settings.emit_tracks = b,
            None => warn_invalid("RBFEED_EMIT_TRACKS", &v),
        }
    }
    if let Some(v) = string(MODIFY_HISTORY_ENV) {
        match parse_bool(&v) {
            Some(b) => settings.dangerously_modify_history = b,
            None => warn_invalid(MODIFY_HISTORY_ENV, &v),
        }
    }
}

/// Parse a boolean string (`true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`).
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u32` within a range.
pub fn parse_u32_range(val: &str, min: u32, max: u32) -> Option<u32> {
    let n: u32 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

fn warn_invalid(key: &str, value: &str) {
    tracing::warn!(key, value, "invalid env var, ignoring");
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
