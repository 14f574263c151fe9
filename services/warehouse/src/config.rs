//! Runtime configuration, read from the environment (and `.env` if present)

use std::num::NonZeroU32;

use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres URL of the target store; only needed when writing
    pub db_url: Option<String>,
    /// Pool size. One writer owns the tables for the whole run.
    pub max_connections: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Ok(Self {
            db_url: std::env::var("DB_URL").ok().filter(|url| !url.is_empty()),
            max_connections: parse_max_connections(
                std::env::var("DB_MAX_CONNECTIONS").ok().as_deref(),
            )?,
        })
    }

    pub fn with_db_url(db_url: impl Into<String>) -> Self {
        Self {
            db_url: Some(db_url.into()),
            max_connections: 1,
        }
    }
}

/// Pool size from `DB_MAX_CONNECTIONS`; unset means 1, zero is rejected
fn parse_max_connections(raw: Option<&str>) -> Result<u32> {
    let Some(raw) = raw else {
        return Ok(1);
    };
    let size: NonZeroU32 = raw
        .trim()
        .parse()
        .with_context(|| format!("DB_MAX_CONNECTIONS must be a positive integer, got '{}'", raw))?;
    Ok(size.get())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_connections_default() {
        assert_eq!(parse_max_connections(None).unwrap(), 1);
    }

    #[test]
    fn test_max_connections_explicit() {
        assert_eq!(parse_max_connections(Some("4")).unwrap(), 4);
    }

    #[test]
    fn test_max_connections_zero_rejected() {
        let err = parse_max_connections(Some("0")).unwrap_err();
        assert!(err.to_string().contains("positive integer"), "{err}");
    }

    #[test]
    fn test_max_connections_garbage_rejected() {
        assert!(parse_max_connections(Some("many")).is_err());
        assert!(parse_max_connections(Some("-1")).is_err());
    }
}
