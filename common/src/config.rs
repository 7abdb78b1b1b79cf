//! Environment variable parsing helpers
//!
//! Every bootstrap setting has a default and can be overridden from the
//! calling environment. These helpers keep that pattern terse.

use std::env;
use std::str::FromStr;

/// Extension trait for parsing environment variables.
///
/// Provides convenient methods for reading env vars with defaults and type
/// parsing.
pub trait ConfigExt {
    /// Get an environment variable with a default value.
    ///
    /// Empty values count as unset, so `DB_NAME=` falls back to the default.
    ///
    /// # Example
    /// ```ignore
    /// let db = String::env_or("DB_NAME", "myapp");
    /// ```
    fn env_or(name: &str, default: &str) -> String {
        env::var(name)
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| default.to_string())
    }

    /// Get an optional environment variable. Empty values count as unset.
    fn env_opt(name: &str) -> Option<String> {
        env::var(name).ok().filter(|v| !v.is_empty())
    }

    /// Get an environment variable parsed as a specific type.
    ///
    /// Returns `default` if the variable is not set or fails to parse.
    ///
    /// # Example
    /// ```ignore
    /// let port: u16 = u16::env_parse("DB_PORT", 5001);
    /// ```
    fn env_parse<T: FromStr>(name: &str, default: T) -> T {
        env::var(name)
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }
}

// Blanket implementation for all types
impl<T> ConfigExt for T {}
