//! Server configuration

use anyhow::Context;

use opshq_billing::BillingConfig;

/// Environment-sourced server configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_address: String,
    pub database_url: String,
    /// Direct (non-pooler) URL for migrations; falls back to `database_url`.
    pub database_direct_url: Option<String>,
    /// Origins allowed by CORS, comma-separated in `CORS_ALLOWED_ORIGINS`.
    pub allowed_origins: Vec<String>,
    pub billing: BillingConfig,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url =
            std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

        Ok(Self {
            bind_address: std::env::var("BIND_ADDRESS")
                .unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            database_url,
            database_direct_url: std::env::var("DATABASE_DIRECT_URL").ok(),
            allowed_origins: std::env::var("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "http://localhost:3000".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            billing: BillingConfig::from_env(),
        })
    }
}
