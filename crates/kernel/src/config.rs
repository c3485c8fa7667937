//! Configuration loaded from environment variables.

use std::env;
use std::fmt;
use std::str::FromStr;

use anyhow::{Context, Result, bail};

/// How a delete that finds no envelope is logged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MissingEnvelopePolicy {
    /// Log at debug level.
    Tolerate,
    /// Log a warning.
    #[default]
    Report,
}

impl MissingEnvelopePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tolerate => "tolerate",
            Self::Report => "report",
        }
    }
}

impl FromStr for MissingEnvelopePolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "tolerate" => Ok(Self::Tolerate),
            "report" => Ok(Self::Report),
            other => bail!("unknown missing envelope policy '{other}' (expected tolerate or report)"),
        }
    }
}

impl fmt::Display for MissingEnvelopePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection URL.
    pub database_url: String,

    /// Maximum database connections in pool (default: 10).
    pub database_max_connections: u32,

    /// Logging of deletes without an envelope (default: report).
    pub missing_envelope_policy: MissingEnvelopePolicy,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url =
            lookup("DATABASE_URL").context("DATABASE_URL environment variable is required")?;

        let database_max_connections = lookup("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|| "10".to_string())
            .parse()
            .context("DATABASE_MAX_CONNECTIONS must be a valid u32")?;

        let missing_envelope_policy = match lookup("MISSING_ENVELOPE_POLICY") {
            Some(value) => value.parse()?,
            None => MissingEnvelopePolicy::default(),
        };

        Ok(Self {
            database_url,
            database_max_connections,
            missing_envelope_policy,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply() {
        let config = config(&[("DATABASE_URL", "postgres://localhost/parcel")]).unwrap();
        assert_eq!(config.database_max_connections, 10);
        assert_eq!(config.missing_envelope_policy, MissingEnvelopePolicy::Report);
    }

    #[test]
    fn database_url_is_required() {
        assert!(config(&[]).is_err());
    }

    #[test]
    fn policy_is_parsed() {
        let config = config(&[
            ("DATABASE_URL", "postgres://localhost/parcel"),
            ("MISSING_ENVELOPE_POLICY", "Tolerate"),
            ("DATABASE_MAX_CONNECTIONS", "4"),
        ])
        .unwrap();
        assert_eq!(config.missing_envelope_policy, MissingEnvelopePolicy::Tolerate);
        assert_eq!(config.database_max_connections, 4);
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(
            config(&[
                ("DATABASE_URL", "postgres://localhost/parcel"),
                ("MISSING_ENVELOPE_POLICY", "ignore"),
            ])
            .is_err()
        );
        assert!(
            config(&[
                ("DATABASE_URL", "postgres://localhost/parcel"),
                ("DATABASE_MAX_CONNECTIONS", "many"),
            ])
            .is_err()
        );
    }
}
