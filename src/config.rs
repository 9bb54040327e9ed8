//! Runtime configuration
//!
//! Read once at startup from the command line and `CHAT_*` environment
//! variables. A `.env` file in the working directory is loaded first;
//! variables already set in the environment win over it.

use std::env;
use std::path::Path;
use std::time::Duration;

use tracing::{debug, warn};

use crate::connection::DEFAULT_OUTBOUND_BUFFER;

/// Lowest bcrypt cost the bcrypt crate accepts (mirrors its private bound)
pub const BCRYPT_MIN_COST: u32 = 4;

/// Highest bcrypt cost the bcrypt crate accepts (mirrors its private bound)
pub const BCRYPT_MAX_COST: u32 = 31;

/// Default server address
pub const DEFAULT_ADDR: &str = "127.0.0.1:8080";

/// Default bearer token lifetime (one day)
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Default bcrypt work factor for stored passwords
pub const DEFAULT_PASSWORD_COST: u32 = 14;

const DEV_SECRET: &str = "chat-relay-development-secret";

#[derive(Debug, Clone)]
pub struct Config {
    /// Bind address
    pub addr: String,
    /// HS256 signing secret for bearer tokens
    pub app_secret: String,
    pub token_ttl: Duration,
    /// Per-connection outbound queue size
    pub outbound_buffer: usize,
    /// bcrypt work factor, 4 to 31
    pub password_cost: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            app_secret: DEV_SECRET.to_string(),
            token_ttl: DEFAULT_TOKEN_TTL,
            outbound_buffer: DEFAULT_OUTBOUND_BUFFER,
            password_cost: DEFAULT_PASSWORD_COST,
        }
    }
}

impl Config {
    /// Build from the first CLI argument and the environment
    pub fn from_env() -> Self {
        load_dotenv(None);
        Self::from_lookup(env::args().nth(1), |key| env::var(key).ok())
    }

    fn from_lookup(arg: Option<String>, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let addr = arg
            .or_else(|| lookup("CHAT_ADDR"))
            .unwrap_or(defaults.addr);

        let app_secret = match lookup("CHAT_APP_SECRET").filter(|s| !s.is_empty()) {
            Some(secret) => secret,
            None => {
                warn!("CHAT_APP_SECRET not set, using the development secret");
                defaults.app_secret
            }
        };

        let token_ttl = parse_or(&lookup, "CHAT_TOKEN_TTL_SECS", defaults.token_ttl.as_secs())
            .map(Duration::from_secs)
            .unwrap_or(defaults.token_ttl);

        let outbound_buffer = parse_or(&lookup, "CHAT_OUTBOUND_BUFFER", defaults.outbound_buffer)
            .filter(|n| *n > 0)
            .unwrap_or(defaults.outbound_buffer);

        let password_cost = parse_or(&lookup, "CHAT_BCRYPT_COST", defaults.password_cost)
            .filter(|cost| (BCRYPT_MIN_COST..=BCRYPT_MAX_COST).contains(cost))
            .unwrap_or(defaults.password_cost);

        Self {
            addr,
            app_secret,
            token_ttl,
            outbound_buffer,
            password_cost,
        }
    }
}

/// Load `path`, or `.env` from the working directory, into the process
/// environment. A missing file is not an error.
fn load_dotenv(path: Option<&Path>) {
    let loaded = match path {
        Some(path) => dotenv::from_path(path).map(|()| path.to_path_buf()),
        None => dotenv::dotenv(),
    };
    match loaded {
        Ok(path) => debug!(path = %path.display(), "loaded environment file"),
        Err(e) if e.not_found() => {}
        Err(e) => warn!(error = %e, "failed to load environment file"),
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Option<T> {
    match lookup(key) {
        Some(raw) => match raw.trim().parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(key, value = %raw, "ignoring unparsable setting");
                None
            }
        },
        None => Some(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(None, lookup(&[]));
        assert_eq!(config.addr, DEFAULT_ADDR);
        assert_eq!(config.token_ttl, DEFAULT_TOKEN_TTL);
        assert_eq!(config.outbound_buffer, DEFAULT_OUTBOUND_BUFFER);
        assert_eq!(config.password_cost, DEFAULT_PASSWORD_COST);
    }

    #[test]
    fn test_argument_beats_environment() {
        let config = Config::from_lookup(
            Some("0.0.0.0:9000".to_string()),
            lookup(&[("CHAT_ADDR", "127.0.0.1:1")]),
        );
        assert_eq!(config.addr, "0.0.0.0:9000");
    }

    #[test]
    fn test_environment_values() {
        let config = Config::from_lookup(
            None,
            lookup(&[
                ("CHAT_ADDR", "127.0.0.1:1"),
                ("CHAT_APP_SECRET", "s3cret"),
                ("CHAT_TOKEN_TTL_SECS", "60"),
                ("CHAT_OUTBOUND_BUFFER", "0"),
                ("CHAT_BCRYPT_COST", "2"),
            ]),
        );
        assert_eq!(config.addr, "127.0.0.1:1");
        assert_eq!(config.app_secret, "s3cret");
        assert_eq!(config.token_ttl, Duration::from_secs(60));
        assert_eq!(config.outbound_buffer, DEFAULT_OUTBOUND_BUFFER);
        assert_eq!(config.password_cost, DEFAULT_PASSWORD_COST);
    }

    #[test]
    fn test_dotenv_file_feeds_environment() {
        let dir = env::temp_dir().join(format!("chat-relay-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join(".env");
        std::fs::write(
            &file,
            "CHAT_TEST_DOTENV_SECRET=from-file\nCHAT_TEST_DOTENV_COST=6\n",
        )
        .unwrap();

        load_dotenv(Some(&file));
        // A missing file is ignored
        load_dotenv(Some(&dir.join("missing.env")));

        let config = Config::from_lookup(None, |key| match key {
            "CHAT_APP_SECRET" => env::var("CHAT_TEST_DOTENV_SECRET").ok(),
            "CHAT_BCRYPT_COST" => env::var("CHAT_TEST_DOTENV_COST").ok(),
            _ => None,
        });
        assert_eq!(config.app_secret, "from-file");
        assert_eq!(config.password_cost, 6);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
