use anyhow::{anyhow, bail, Result};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Longest accepted session lifetime, 30 days.
pub const MAX_SESSION_TTL_SECS: u64 = 30 * 24 * 3600;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Where bookings are mirrored. Memory only when unset.
    pub bookings_file: Option<PathBuf>,
    pub session_ttl: Duration,
    pub demo_password: Option<String>,
    pub seed_bookings: bool,
    /// Skip the random availability roll for desks and slots.
    pub all_available: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            bookings_file: None,
            session_ttl: Duration::from_secs(3600),
            demo_password: None,
            seed_bookings: true,
            all_available: false,
        }
    }
}

fn parse_or<T: FromStr>(value: Option<String>, key: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match value {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("{key} has invalid value {raw:?}: {e}")),
        None => Ok(default),
    }
}

fn session_ttl(secs: u64) -> Result<Duration> {
    if secs == 0 || secs > MAX_SESSION_TTL_SECS {
        bail!("SESSION_TTL_SECS must be between 1 and {MAX_SESSION_TTL_SECS}, got {secs}");
    }
    Ok(Duration::from_secs(secs))
}

impl Config {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            port: parse_or(non_empty("PORT"), "PORT", defaults.port)?,
            bookings_file: non_empty("BOOKINGS_FILE").map(PathBuf::from),
            session_ttl: session_ttl(parse_or(
                non_empty("SESSION_TTL_SECS"),
                "SESSION_TTL_SECS",
                defaults.session_ttl.as_secs(),
            )?)?,
            demo_password: non_empty("DESKBOOK_DEMO_PASSWORD"),
            seed_bookings: parse_or(
                non_empty("DESKBOOK_SEED_BOOKINGS"),
                "DESKBOOK_SEED_BOOKINGS",
                defaults.seed_bookings,
            )?,
            all_available: parse_or(
                non_empty("DESKBOOK_ALL_AVAILABLE"),
                "DESKBOOK_ALL_AVAILABLE",
                defaults.all_available,
            )?,
        })
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
    fn defaults_when_unset() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.bookings_file, None);
        assert_eq!(config.session_ttl, Duration::from_secs(3600));
        assert!(config.seed_bookings);
        assert!(!config.all_available);
    }

    #[test]
    fn reads_values() {
        let config = Config::from_lookup(lookup(&[
            ("PORT", "8080"),
            ("BOOKINGS_FILE", "/tmp/bookings.json"),
            ("SESSION_TTL_SECS", "60"),
            ("DESKBOOK_DEMO_PASSWORD", "demo"),
            ("DESKBOOK_SEED_BOOKINGS", "false"),
            ("DESKBOOK_ALL_AVAILABLE", "true"),
        ]))
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.bookings_file, Some(PathBuf::from("/tmp/bookings.json")));
        assert_eq!(config.session_ttl, Duration::from_secs(60));
        assert_eq!(config.demo_password.as_deref(), Some("demo"));
        assert!(!config.seed_bookings);
        assert!(config.all_available);
    }

    #[test]
    fn empty_values_fall_back() {
        let config = Config::from_lookup(lookup(&[("PORT", ""), ("BOOKINGS_FILE", " ")])).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.bookings_file, None);
    }

    #[test]
    fn bad_values_are_errors() {
        let err = Config::from_lookup(lookup(&[("PORT", "eighty")])).unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }

    #[test]
    fn session_ttl_is_bounded() {
        for raw in ["0", "2592001", "18446744073709551615"] {
            let err = Config::from_lookup(lookup(&[("SESSION_TTL_SECS", raw)])).unwrap_err();
            assert!(err.to_string().contains("SESSION_TTL_SECS"), "{raw}: {err}");
        }
        let config = Config::from_lookup(lookup(&[("SESSION_TTL_SECS", "2592000")])).unwrap();
        assert_eq!(config.session_ttl, Duration::from_secs(MAX_SESSION_TTL_SECS));
    }
}
