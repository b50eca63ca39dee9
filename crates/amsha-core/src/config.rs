//! Environment configuration loader.
//!
//! All amsha components read their settings from the process environment;
//! this module seeds that environment from the canonical file locations so
//! the CLI and any embedding service agree on configuration.
//!
//! Call [`load_environment`] early in `main()`, before anything reads config:
//!
//! ```rust
//! use amsha_core::config::load_environment;
//!
//! fn main() {
//!     load_environment();
//! }
//! ```

use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// Candidate environment files, highest priority first.
pub const ENV_FILE_PATHS: &[&str] = &["/etc/amsha/environment", "/etc/amsha.env", ".env"];

/// Load environment variables from the first readable candidate file.
///
/// `AMSHA_ENV_FILE` overrides the candidate list. Existing environment
/// variables are never overridden. Returns the path that was loaded, or
/// None when no file was found.
pub fn load_environment() -> Option<String> {
    let custom = std::env::var("AMSHA_ENV_FILE").ok();
    let candidates = custom
        .iter()
        .map(String::as_str)
        .chain(ENV_FILE_PATHS.iter().copied());

    for path in candidates {
        if !Path::new(path).exists() {
            continue;
        }
        match fs::read_to_string(path) {
            Ok(content) => {
                let loaded = apply_env_content(&content);
                info!(path = %path, loaded, "Loaded environment file");
                return Some(path.to_string());
            }
            Err(e) => {
                warn!(path = %path, error = %e, "Failed to read environment file");
            }
        }
    }

    debug!("No environment file found, using existing environment");
    None
}

/// Apply `KEY=VALUE` lines to the process environment, skipping variables
/// that are already set. Returns the number of variables loaded.
fn apply_env_content(content: &str) -> usize {
    let mut loaded = 0;
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = parse_env_line(line) {
            if std::env::var(&key).is_err() {
                std::env::set_var(&key, &value);
                loaded += 1;
            }
        }
    }
    loaded
}

/// Parse a single `KEY=VALUE` line, stripping surrounding quotes.
fn parse_env_line(line: &str) -> Option<(String, String)> {
    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }

    let value = value.trim();
    let value = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
        .unwrap_or(value);

    Some((key.to_string(), value.to_string()))
}

/// Get a configuration value with a default.
pub fn get_config(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Get an optional configuration value.
pub fn get_config_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Get a boolean configuration value.
pub fn get_config_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes" | "on"))
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_env_line_simple() {
        let (k, v) = parse_env_line("AMSHA_STORE=memory").unwrap();
        assert_eq!(k, "AMSHA_STORE");
        assert_eq!(v, "memory");
    }

    #[test]
    fn test_parse_env_line_quoted() {
        let (k, v) = parse_env_line("AMSHA_STORE=\"sqlite::memory:\"").unwrap();
        assert_eq!(k, "AMSHA_STORE");
        assert_eq!(v, "sqlite::memory:");
    }

    #[test]
    fn test_parse_env_line_single_quoted() {
        let (_, v) = parse_env_line("FOO='bar baz'").unwrap();
        assert_eq!(v, "bar baz");
    }

    #[test]
    fn test_parse_env_line_rejects_empty_key() {
        assert!(parse_env_line("").is_none());
        assert!(parse_env_line("=value").is_none());
    }

    #[test]
    fn test_apply_env_content_skips_comments() {
        let content = "# comment\n\nAMSHA_TEST_UNSET_KEY_1=a\n";
        let loaded = apply_env_content(content);
        assert_eq!(loaded, 1);
        assert_eq!(std::env::var("AMSHA_TEST_UNSET_KEY_1").unwrap(), "a");
    }
}
