//! Billing configuration validation
//!
//! Parses environment-sourced billing settings into a typed config and a
//! client-safe [`BillingStatus`]. "Enabled" reflects operator intent;
//! "configured" reflects whether the mandatory secret is actually present.
//! The two are independent axes, and validation is advisory: a bad config
//! degrades billing to the disabled provider, it never blocks startup.

use serde::Serialize;

/// Which payment backend is selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingProviderKind {
    None,
    Polar,
    Stripe,
}

impl BillingProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingProviderKind::None => "none",
            BillingProviderKind::Polar => "polar",
            BillingProviderKind::Stripe => "stripe",
        }
    }

    fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "polar" => BillingProviderKind::Polar,
            "stripe" => BillingProviderKind::Stripe,
            _ => BillingProviderKind::None,
        }
    }
}

/// Operating mode against the payment backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingMode {
    Sandbox,
    Production,
}

impl BillingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingMode::Sandbox => "sandbox",
            BillingMode::Production => "production",
        }
    }
}

/// Environment-sourced billing configuration.
///
/// Secret values live here and only here; [`BillingStatus`] reports
/// presence, never contents.
#[derive(Debug, Clone)]
pub struct BillingConfig {
    pub enabled: bool,
    pub provider: BillingProviderKind,
    pub mode: BillingMode,
    pub polar_access_token: Option<String>,
    pub polar_webhook_secret: Option<String>,
    pub polar_organization_id: Option<String>,
    pub stripe_secret_key: Option<String>,
    pub stripe_webhook_secret: Option<String>,
    pub stripe_publishable_key: Option<String>,
}

/// Result of validating a [`BillingConfig`].
#[derive(Debug, Clone)]
pub struct ConfigCheck {
    pub valid: bool,
    pub message: String,
    pub warnings: Vec<String>,
}

/// Client-safe view of the billing configuration.
///
/// Recomputed per process start; safe to return from an unauthenticated
/// status endpoint because it carries no secret material.
#[derive(Debug, Clone, Serialize)]
pub struct BillingStatus {
    pub enabled: bool,
    pub configured: bool,
    pub provider: BillingProviderKind,
    /// `None` while billing is disabled.
    pub mode: Option<BillingMode>,
    pub config_errors: Vec<String>,
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl BillingConfig {
    pub fn from_env() -> Self {
        let enabled = std::env::var("BILLING_ENABLED")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
            .unwrap_or(false);
        let provider = std::env::var("BILLING_PROVIDER")
            .map(|v| BillingProviderKind::parse(&v))
            .unwrap_or(BillingProviderKind::None);
        let mode = match std::env::var("BILLING_MODE")
            .map(|v| v.trim().to_ascii_lowercase())
            .as_deref()
        {
            Ok("production") => BillingMode::Production,
            _ => BillingMode::Sandbox,
        };

        Self {
            enabled,
            provider,
            mode,
            polar_access_token: env_nonempty("POLAR_ACCESS_TOKEN"),
            polar_webhook_secret: env_nonempty("POLAR_WEBHOOK_SECRET"),
            polar_organization_id: env_nonempty("POLAR_ORGANIZATION_ID"),
            stripe_secret_key: env_nonempty("STRIPE_SECRET_KEY"),
            stripe_webhook_secret: env_nonempty("STRIPE_WEBHOOK_SECRET"),
            stripe_publishable_key: env_nonempty("STRIPE_PUBLISHABLE_KEY"),
        }
    }

    /// A disabled config, used as the fallback when validation fails.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            provider: BillingProviderKind::None,
            mode: BillingMode::Sandbox,
            polar_access_token: None,
            polar_webhook_secret: None,
            polar_organization_id: None,
            stripe_secret_key: None,
            stripe_webhook_secret: None,
            stripe_publishable_key: None,
        }
    }

    /// Validate the configuration.
    ///
    /// Missing mandatory secrets make the config invalid; missing optional
    /// secrets only produce warnings.
    pub fn validate(&self) -> ConfigCheck {
        if !self.enabled {
            return ConfigCheck {
                valid: true,
                message: "billing is disabled".to_string(),
                warnings: Vec::new(),
            };
        }

        match self.provider {
            BillingProviderKind::None => ConfigCheck {
                valid: false,
                message: "billing is enabled but no provider is selected".to_string(),
                warnings: Vec::new(),
            },
            BillingProviderKind::Polar => {
                if self.polar_access_token.is_none() {
                    return ConfigCheck {
                        valid: false,
                        message: "POLAR_ACCESS_TOKEN is required when billing uses polar"
                            .to_string(),
                        warnings: Vec::new(),
                    };
                }
                let mut warnings = Vec::new();
                if self.polar_webhook_secret.is_none() {
                    warnings.push(
                        "POLAR_WEBHOOK_SECRET is not set; webhook delivery cannot be verified"
                            .to_string(),
                    );
                }
                if self.polar_organization_id.is_none() {
                    warnings.push(
                        "POLAR_ORGANIZATION_ID is not set; checkout defaults to the token's org"
                            .to_string(),
                    );
                }
                ConfigCheck {
                    valid: true,
                    message: format!("polar billing configured ({})", self.mode.as_str()),
                    warnings,
                }
            }
            BillingProviderKind::Stripe => {
                if self.stripe_secret_key.is_none() {
                    return ConfigCheck {
                        valid: false,
                        message: "STRIPE_SECRET_KEY is required when billing uses stripe"
                            .to_string(),
                        warnings: Vec::new(),
                    };
                }
                let mut warnings = Vec::new();
                if self.stripe_webhook_secret.is_none() {
                    warnings.push(
                        "STRIPE_WEBHOOK_SECRET is not set; webhook delivery cannot be verified"
                            .to_string(),
                    );
                }
                if self.stripe_publishable_key.is_none() {
                    warnings.push(
                        "STRIPE_PUBLISHABLE_KEY is not set; client-side elements are unavailable"
                            .to_string(),
                    );
                }
                ConfigCheck {
                    valid: true,
                    message: format!("stripe billing configured ({})", self.mode.as_str()),
                    warnings,
                }
            }
        }
    }

    /// Derive the client-safe status view.
    pub fn status(&self) -> BillingStatus {
        let check = self.validate();
        let configured = self.enabled && check.valid;

        BillingStatus {
            enabled: self.enabled,
            configured,
            provider: self.provider,
            mode: if self.enabled { Some(self.mode) } else { None },
            config_errors: if check.valid {
                Vec::new()
            } else {
                vec![check.message.clone()]
            },
        }
    }

    /// Log validity and warnings at startup. Advisory only.
    pub fn log_startup(&self) {
        let check = self.validate();
        if check.valid {
            tracing::info!(
                enabled = self.enabled,
                provider = self.provider.as_str(),
                mode = self.mode.as_str(),
                "{}",
                check.message
            );
        } else {
            tracing::warn!(
                provider = self.provider.as_str(),
                "billing configuration invalid: {} (billing will run disabled)",
                check.message
            );
        }
        for warning in &check.warnings {
            tracing::warn!("billing config warning: {}", warning);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> BillingConfig {
        BillingConfig::disabled()
    }

    #[test]
    fn disabled_is_always_valid() {
        let config = base();
        let check = config.validate();
        assert!(check.valid);
        assert!(check.warnings.is_empty());

        let status = config.status();
        assert!(!status.enabled);
        assert!(!status.configured);
        assert!(status.mode.is_none());
        assert!(status.config_errors.is_empty());
    }

    #[test]
    fn enabled_without_provider_is_invalid() {
        let config = BillingConfig {
            enabled: true,
            ..base()
        };
        let check = config.validate();
        assert!(!check.valid);
        assert!(check.message.contains("no provider"));

        let status = config.status();
        assert!(status.enabled);
        assert!(!status.configured);
        assert_eq!(status.config_errors.len(), 1);
    }

    #[test]
    fn polar_without_access_token_is_invalid() {
        let config = BillingConfig {
            enabled: true,
            provider: BillingProviderKind::Polar,
            ..base()
        };
        assert!(!config.validate().valid);
    }

    #[test]
    fn polar_with_token_but_no_webhook_secret_warns() {
        let config = BillingConfig {
            enabled: true,
            provider: BillingProviderKind::Polar,
            polar_access_token: Some("polar_at_test".into()),
            polar_organization_id: Some("org_123".into()),
            ..base()
        };
        let check = config.validate();
        assert!(check.valid);
        assert_eq!(check.warnings.len(), 1);
        assert!(check.warnings[0].contains("POLAR_WEBHOOK_SECRET"));
    }

    #[test]
    fn stripe_requires_secret_key() {
        let config = BillingConfig {
            enabled: true,
            provider: BillingProviderKind::Stripe,
            stripe_publishable_key: Some("pk_test_x".into()),
            ..base()
        };
        assert!(!config.validate().valid);

        let configured = BillingConfig {
            stripe_secret_key: Some("sk_test_x".into()),
            ..config
        };
        let check = configured.validate();
        assert!(check.valid);
        // webhook secret missing -> warning only
        assert!(check.warnings.iter().any(|w| w.contains("STRIPE_WEBHOOK_SECRET")));
    }

    #[test]
    fn status_never_contains_secret_values() {
        let config = BillingConfig {
            enabled: true,
            provider: BillingProviderKind::Polar,
            polar_access_token: Some("polar_at_supersecret".into()),
            ..base()
        };
        let status = config.status();
        let json = serde_json::to_string(&status).unwrap();
        assert!(!json.contains("supersecret"));
        assert!(status.configured);
        assert_eq!(status.mode, Some(BillingMode::Sandbox));
    }

    #[test]
    fn mode_reported_only_when_enabled() {
        let mut config = BillingConfig {
            enabled: true,
            provider: BillingProviderKind::Stripe,
            stripe_secret_key: Some("sk_test_x".into()),
            mode: BillingMode::Production,
            ..base()
        };
        assert_eq!(config.status().mode, Some(BillingMode::Production));

        config.enabled = false;
        assert_eq!(config.status().mode, None);
    }
}
