//! Checkout and Billing Portal Relay
//!
//! Turns a plan selection into a hosted checkout session, and a finished
//! checkout into a billing-portal session for its customer.

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{BillingError, Result};
use crate::plan::{BillingCycle, PlanType, PriceTable};

/// Placeholder the provider substitutes with the real session id on redirect
pub const CHECKOUT_SESSION_ID_TEMPLATE: &str = "{CHECKOUT_SESSION_ID}";

/// Payment provider operations the relay depends on
#[async_trait]
pub trait BillingProvider: Send + Sync {
    /// Create a hosted subscription checkout session
    async fn create_checkout_session(&self, params: NewCheckoutSession) -> Result<CheckoutSession>;

    /// Look up the customer attached to an existing checkout session
    async fn checkout_session_customer(&self, session_id: &str) -> Result<Option<String>>;

    /// Create a billing-portal session for a customer
    async fn create_portal_session(&self, customer_id: &str, return_url: &str) -> Result<PortalSession>;
}

/// Everything the provider needs to open a checkout session
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewCheckoutSession {
    pub price_id: String,
    pub quantity: u64,
    pub success_url: String,
    pub cancel_url: String,
    pub customer_email: Option<String>,
    pub metadata: HashMap<String, String>,
}

/// Selections that are not strings deserialize as empty and never resolve.
fn selection_field<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        _ => String::new(),
    })
}

/// Inbound plan selection from the browser
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    /// Plan name, matched case-insensitively
    #[serde(default, deserialize_with = "selection_field")]
    pub plan_type: String,

    #[serde(default, deserialize_with = "selection_field")]
    pub billing_cycle: String,

    #[serde(default)]
    pub user_id: Option<String>,

    #[serde(default)]
    pub email: Option<String>,
}

impl CheckoutRequest {
    /// Resolve the requested plan and cycle into their typed forms
    pub fn selection(&self) -> Result<(PlanType, BillingCycle)> {
        Ok((self.plan_type.parse()?, self.billing_cycle.parse()?))
    }
}

/// Result of creating a checkout session
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    /// Provider session id
    pub id: String,

    /// Hosted page to redirect the user to
    pub url: Option<String>,
}

/// Result of creating a billing-portal session
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortalSession {
    pub url: String,
}

/// Request body for portal creation
#[derive(Clone, Debug, Deserialize)]
pub struct PortalRequest {
    pub session_id: String,
}

/// Static relay configuration, built once at startup
#[derive(Clone, Debug)]
pub struct BillingConfig {
    pub prices: PriceTable,

    /// Site the provider redirects back to, without a trailing slash
    pub site_url: String,
}

impl BillingConfig {
    pub fn new(prices: PriceTable, site_url: impl Into<String>) -> Self {
        let site_url = site_url.into().trim_end_matches('/').to_string();
        Self { prices, site_url }
    }

    pub fn success_url(&self) -> String {
        format!(
            "{}/success?session_id={CHECKOUT_SESSION_ID_TEMPLATE}",
            self.site_url
        )
    }

    pub fn cancel_url(&self) -> String {
        format!("{}/cancel", self.site_url)
    }

    pub fn portal_return_url(&self) -> String {
        format!("{}/account", self.site_url)
    }
}

/// Relays checkout and portal requests to the payment provider
pub struct BillingRelay {
    provider: Arc<dyn BillingProvider>,
    config: BillingConfig,
}

impl BillingRelay {
    pub fn new(provider: Arc<dyn BillingProvider>, config: BillingConfig) -> Self {
        Self { provider, config }
    }

    /// Create a hosted checkout session for the selected plan.
    ///
    /// Fails with [`BillingError::InvalidPlan`] before contacting the
    /// provider when the selection has no mapped price.
    pub async fn create_checkout_session(&self, request: CheckoutRequest) -> Result<CheckoutSession> {
        let (plan, cycle) = request.selection()?;
        let price_id = self
            .config
            .prices
            .lookup(plan, cycle)
            .ok_or(BillingError::InvalidPlan)?;

        let mut metadata = HashMap::new();
        if let Some(ref user_id) = request.user_id {
            metadata.insert("userId".to_string(), user_id.clone());
        }
        metadata.insert("planType".to_string(), request.plan_type.clone());
        metadata.insert("billingCycle".to_string(), request.billing_cycle.clone());

        let params = NewCheckoutSession {
            price_id: price_id.to_string(),
            quantity: 1,
            success_url: self.config.success_url(),
            cancel_url: self.config.cancel_url(),
            customer_email: request.email,
            metadata,
        };

        let session = self.provider.create_checkout_session(params).await?;

        tracing::info!(
            session_id = %session.id,
            plan = %plan,
            cycle = %cycle,
            "Created checkout session"
        );

        Ok(session)
    }

    /// Create a billing-portal session for the customer behind a checkout session
    pub async fn create_portal_session(&self, session_id: &str) -> Result<PortalSession> {
        let customer = self
            .provider
            .checkout_session_customer(session_id)
            .await?
            .ok_or(BillingError::NoCustomer)?;

        let portal = self
            .provider
            .create_portal_session(&customer, &self.config.portal_return_url())
            .await?;

        tracing::info!(customer = %customer, "Created billing portal session");

        Ok(portal)
    }
}
