//! Environment variable parsing shared by the binaries' config loaders.
//!
//! Optional settings never abort start-up: a malformed value is reported
//! with `warn!` and the default is used instead.

use std::fmt::Display;
use std::str::FromStr;

/// Read `name` and parse it, falling back to `default` when unset or invalid.
pub fn var_or<T>(name: &str, default: T) -> T
where
    T: FromStr + Display,
{
    parse_or(name, std::env::var(name).ok().as_deref(), default)
}

/// Read a boolean flag (`true`/`false`, `1`/`0`, `yes`/`no`, `on`/`off`).
pub fn flag_or(name: &str, default: bool) -> bool {
    parse_flag_or(name, std::env::var(name).ok().as_deref(), default)
}

/// Read `name` as a non-blank string.
pub fn string_or(name: &str, default: impl FnOnce() -> String) -> String {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(default)
}

fn parse_or<T>(name: &str, raw: Option<&str>, default: T) -> T
where
    T: FromStr + Display,
{
    let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return default;
    };
    match raw.parse() {
        Ok(value) => value,
        Err(_) => {
            tracing::warn!(var = name, value = raw, default = %default, "Invalid value, using default");
            default
        }
    }
}

fn parse_flag_or(name: &str, raw: Option<&str>, default: bool) -> bool {
    let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return default;
    };
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => {
            tracing::warn!(var = name, value = raw, default, "Invalid flag, using default");
            default
        }
    }
}
