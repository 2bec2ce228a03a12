//! Application State

use std::sync::Arc;

use sage_billing::{BillingRelay, SubscriptionStore, WebhookHandler, WebhookVerifier};
use sage_explain::ExplanationSource;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Checkout/portal relay (None if Stripe is not configured)
    pub billing: Option<Arc<BillingRelay>>,

    /// Webhook signature verification
    pub verifier: Arc<WebhookVerifier>,

    /// Webhook event dispatch
    pub webhooks: Arc<WebhookHandler>,

    /// Latest subscription status per customer
    pub subscriptions: Arc<dyn SubscriptionStore>,

    /// Explanation endpoint client (None if it could not be built)
    pub explainer: Option<Arc<dyn ExplanationSource>>,

    /// Publishable key handed to the browser
    pub publishable_key: Option<String>,
}
