//! Environment variable utilities.
//!
//! A generic `env_get<T>` for parsing environment variables with defaults,
//! used by `fiberio-runtime::config` to implement the `RT_*` overrides.

use std::str::FromStr;

/// Get environment variable parsed as type `T`, or return `default`.
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Get environment variable as a boolean.
///
/// Accepts `"1"`, `"true"`, `"yes"`, `"on"` (case-insensitive) as true.
/// Everything else, including unset, returns `default`.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => matches!(val.to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

/// Get environment variable as an optional value.
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Get environment variable as a string, or return `default`.
#[inline]
pub fn env_get_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Whether an environment variable is set, regardless of value.
#[inline]
pub fn env_is_set(key: &str) -> bool {
    std::env::var(key).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_when_unset() {
        let val: usize = env_get("__FIBERIO_TEST_UNSET__", 42);
        assert_eq!(val, 42);
    }

    #[test]
    fn bool_variants() {
        std::env::set_var("__FIBERIO_TEST_BOOL__", "YES");
        assert!(env_get_bool("__FIBERIO_TEST_BOOL__", false));
        std::env::set_var("__FIBERIO_TEST_BOOL__", "0");
        assert!(!env_get_bool("__FIBERIO_TEST_BOOL__", true));
        std::env::remove_var("__FIBERIO_TEST_BOOL__");
    }

    #[test]
    fn invalid_parse_falls_back() {
        std::env::set_var("__FIBERIO_TEST_INVALID__", "not_a_number");
        let val: usize = env_get("__FIBERIO_TEST_INVALID__", 7);
        assert_eq!(val, 7);
        std::env::remove_var("__FIBERIO_TEST_INVALID__");
    }

    #[test]
    fn is_set_reflects_process_env() {
        assert!(!env_is_set("__FIBERIO_TEST_UNSET__"));
        assert!(env_is_set("PATH"));
    }
}
