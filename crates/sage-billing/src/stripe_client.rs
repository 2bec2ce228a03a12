//! Stripe Adapter
//!
//! [`BillingProvider`] backed by the Stripe API.

use async_trait::async_trait;
use stripe::{
    BillingPortalSession, CheckoutSession as StripeCheckoutSession, CheckoutSessionId,
    CheckoutSessionMode, Client, CreateBillingPortalSession, CreateCheckoutSession,
    CreateCheckoutSessionLineItems, CustomerId,
};

use crate::checkout::{BillingProvider, CheckoutSession, NewCheckoutSession, PortalSession};
use crate::error::{BillingError, Result};

/// Stripe client wrapper
pub struct StripeClient {
    client: Client,
}

impl StripeClient {
    /// Create a new Stripe client
    pub fn new(secret_key: &str) -> Self {
        Self {
            client: Client::new(secret_key),
        }
    }
}

fn upstream(err: impl std::fmt::Display) -> BillingError {
    BillingError::Upstream(err.to_string())
}

#[async_trait]
impl BillingProvider for StripeClient {
    async fn create_checkout_session(&self, params: NewCheckoutSession) -> Result<CheckoutSession> {
        let mut create = CreateCheckoutSession::new();
        create.success_url = Some(&params.success_url);
        create.cancel_url = Some(&params.cancel_url);
        create.customer_email = params.customer_email.as_deref();
        create.mode = Some(CheckoutSessionMode::Subscription);
        create.metadata = Some(params.metadata.clone());
        create.line_items = Some(vec![CreateCheckoutSessionLineItems {
            price: Some(params.price_id.clone()),
            quantity: Some(params.quantity),
            ..Default::default()
        }]);

        let session = StripeCheckoutSession::create(&self.client, create)
            .await
            .map_err(upstream)?;

        Ok(CheckoutSession {
            id: session.id.to_string(),
            url: session.url,
        })
    }

    async fn checkout_session_customer(&self, session_id: &str) -> Result<Option<String>> {
        let id: CheckoutSessionId = session_id.parse().map_err(upstream)?;

        let session = StripeCheckoutSession::retrieve(&self.client, &id, &[])
            .await
            .map_err(upstream)?;

        Ok(session.customer.as_ref().map(|c| c.id().to_string()))
    }

    async fn create_portal_session(&self, customer_id: &str, return_url: &str) -> Result<PortalSession> {
        let customer: CustomerId = customer_id.parse().map_err(upstream)?;

        let mut params = CreateBillingPortalSession::new(customer);
        params.return_url = Some(return_url);

        let portal = BillingPortalSession::create(&self.client, params)
            .await
            .map_err(upstream)?;

        Ok(PortalSession { url: portal.url })
    }
}
