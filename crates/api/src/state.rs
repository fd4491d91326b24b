//! Application state

use std::sync::Arc;

use sqlx::PgPool;

use opshq_billing::{select_provider, BillingProvider};

use crate::auth::AuthState;
use crate::config::Config;

/// Shared application state.
///
/// The billing provider is selected once here from the validated config and
/// injected everywhere by reference; there is no hidden global, so tests can
/// construct a state around a fake provider.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub billing: Arc<dyn BillingProvider>,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config) -> Self {
        // Advisory: log validity and warnings, then degrade to disabled on
        // invalid config. Startup is never blocked by billing.
        config.billing.log_startup();
        let billing = select_provider(&config.billing);

        Self {
            pool,
            config,
            billing,
        }
    }

    /// Construct state around an explicit provider (tests inject fakes).
    pub fn with_billing(pool: PgPool, config: Config, billing: Arc<dyn BillingProvider>) -> Self {
        Self {
            pool,
            config,
            billing,
        }
    }

    /// Auth state for the middleware layer.
    pub fn auth_state(&self) -> AuthState {
        AuthState {
            pool: self.pool.clone(),
        }
    }
}
