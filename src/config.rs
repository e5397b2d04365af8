use std::str::FromStr;

use anyhow::{Context, Result};

// ---------------------------------------------------------------------------
// StoreBackend
// ---------------------------------------------------------------------------

/// Which `DocumentStore` implementation backs plants and watering records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Postgres { database_url: String },
}

/// Backend kind as written in `STORE_BACKEND`, before the URL is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BackendKind {
    Memory,
    Postgres,
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "memory" => Ok(Self::Memory),
            "postgres" => Ok(Self::Postgres),
            other => Err(anyhow::anyhow!("unknown store backend: {other:?}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub store_backend: StoreBackend,
    pub server_host: String,
    pub server_port: u16,
    /// Dashboard wall-clock refresh period in seconds.
    pub refresh_interval_secs: u64,
    /// Owners that get a live alert monitor.
    /// Format: `"owner1,owner2"`.
    pub watch_owners: Vec<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let kind = optional("STORE_BACKEND", "memory")
            .trim()
            .parse::<BackendKind>()
            .context("STORE_BACKEND must be 'memory' or 'postgres'")?;
        let store_backend = match kind {
            BackendKind::Memory => StoreBackend::Memory,
            BackendKind::Postgres => StoreBackend::Postgres {
                database_url: required("DATABASE_URL")?,
            },
        };

        let refresh_interval_secs: u64 = optional("REFRESH_INTERVAL_SECS", "5")
            .parse()
            .context("REFRESH_INTERVAL_SECS must be a positive integer")?;
        if refresh_interval_secs == 0 {
            anyhow::bail!("REFRESH_INTERVAL_SECS must be a positive integer");
        }

        Ok(Self {
            store_backend,
            server_host: optional("SERVER_HOST", "0.0.0.0"),
            server_port: optional("SERVER_PORT", "8080")
                .parse()
                .context("SERVER_PORT must be a valid port number")?,
            refresh_interval_secs,
            watch_owners: parse_owner_list(&optional("WATCH_OWNERS", "")),
        })
    }
}

/// Parse `"owner1, owner2"` into a de-duplicated list, preserving order.
fn parse_owner_list(raw: &str) -> Vec<String> {
    let mut owners: Vec<String> = Vec::new();
    for owner in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if !owners.iter().any(|o| o == owner) {
            owners.push(owner.to_owned());
        }
    }
    owners
}

fn required(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("missing required env var: {key}"))
}

fn optional(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}
