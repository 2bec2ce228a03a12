//! Server Configuration
//!
//! Read once from the environment at startup and passed down explicitly.

use anyhow::Context;
use sage_billing::PriceTable;
use sage_explain::{DEFAULT_ENDPOINT, ExplainConfig};

const DEFAULT_PORT: u16 = 4242;
const DEFAULT_PRODUCTION_URL: &str = "https://your-production-domain.com";
const DEFAULT_DEV_URL: &str = "http://localhost:5173";

/// Deployment mode, selects the redirect domain
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("production") {
            Self::Production
        } else {
            Self::Development
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub bind_host: String,
    pub port: u16,
    pub environment: Environment,
    pub production_url: String,
    pub dev_url: String,
    pub stripe_secret_key: Option<String>,
    pub webhook_secret: Option<String>,
    pub publishable_key: Option<String>,
    pub prices: PriceTable,
    pub explain: ExplainConfig,
    pub static_dir: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = match var("PORT") {
            Some(port) => port
                .trim()
                .parse()
                .with_context(|| format!("PORT must be a port number, got {port:?}"))?,
            None => DEFAULT_PORT,
        };

        let environment = var("APP_ENV")
            .or_else(|| var("NODE_ENV"))
            .map_or(Environment::Development, |v| Environment::parse(&v));

        Ok(Self {
            bind_host: var("BIND_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            environment,
            production_url: var("PRODUCTION_URL").unwrap_or_else(|| DEFAULT_PRODUCTION_URL.into()),
            dev_url: var("DEV_URL").unwrap_or_else(|| DEFAULT_DEV_URL.into()),
            stripe_secret_key: var("STRIPE_SECRET_KEY"),
            webhook_secret: var("STRIPE_WEBHOOK_SECRET"),
            publishable_key: var("STRIPE_PUBLISHABLE_KEY"),
            prices: PriceTable::default().with_overrides(&lookup),
            explain: ExplainConfig {
                endpoint: var("EXPLAIN_API_URL").unwrap_or_else(|| DEFAULT_ENDPOINT.into()),
                ..Default::default()
            },
            static_dir: var("STATIC_DIR").unwrap_or_else(|| "public".into()),
        })
    }

    /// Domain the payment provider redirects back to
    pub fn site_url(&self) -> &str {
        match self.environment {
            Environment::Production => &self.production_url,
            Environment::Development => &self.dev_url,
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sage_billing::{BillingCycle, PlanType};
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.port, 4242);
        assert_eq!(config.bind_addr(), "0.0.0.0:4242");
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.site_url(), "http://localhost:5173");
        assert_eq!(config.explain.endpoint, DEFAULT_ENDPOINT);
        assert!(config.stripe_secret_key.is_none());
        assert!(config.webhook_secret.is_none());
        assert_eq!(config.prices, PriceTable::default());
    }

    #[test]
    fn test_production_selects_production_url() {
        let config = config(&[
            ("NODE_ENV", "production"),
            ("PRODUCTION_URL", "https://codesage.app"),
        ])
        .unwrap();
        assert_eq!(config.site_url(), "https://codesage.app");
    }

    #[test]
    fn test_app_env_wins_over_node_env() {
        let config = config(&[("APP_ENV", "development"), ("NODE_ENV", "production")]).unwrap();
        assert_eq!(config.environment, Environment::Development);
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("PORT", "8080"),
            ("STRIPE_SECRET_KEY", "sk_test_123"),
            ("STRIPE_WEBHOOK_SECRET", ""),
            ("STRIPE_PRICE_PRO_YEARLY", "price_pro_year_live"),
        ])
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.stripe_secret_key.as_deref(), Some("sk_test_123"));
        assert!(config.webhook_secret.is_none());
        assert_eq!(
            config.prices.lookup(PlanType::Pro, BillingCycle::Yearly),
            Some("price_pro_year_live")
        );
    }

    #[test]
    fn test_invalid_port() {
        assert!(config(&[("PORT", "not-a-port")]).is_err());
    }
}
