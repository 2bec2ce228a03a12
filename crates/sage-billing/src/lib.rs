//! # sage-billing
//!
//! Subscription billing relay for Code Sage.
//!
//! ## Flow
//!
//! ```text
//! ┌─────────────┐  plan   ┌─────────────┐  session  ┌─────────────────┐
//! │   Browser   │────────▶│    Relay    │──────────▶│  Stripe Hosted  │
//! │  (pricing)  │◀────────│ (this crate)│◀──────────│  Checkout Page  │
//! └─────────────┘ id, url └─────────────┘           └─────────────────┘
//!                                ▲                           │
//!                                └────── webhook events ─────┘
//! ```
//!
//! The relay holds no state of its own. Plan prices and redirect targets
//! live in a [`BillingConfig`] built once at startup, and the provider sits
//! behind the [`BillingProvider`] trait so handlers can be exercised without
//! network access.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use sage_billing::{BillingConfig, BillingRelay, CheckoutRequest, PriceTable, StripeClient};
//!
//! let relay = BillingRelay::new(
//!     Arc::new(StripeClient::new("sk_test_xxx")),
//!     BillingConfig::new(PriceTable::default(), "http://localhost:5173"),
//! );
//!
//! let session = relay.create_checkout_session(CheckoutRequest {
//!     plan_type: "pro".into(),
//!     billing_cycle: "monthly".into(),
//!     user_id: Some("user_42".into()),
//!     email: Some("user@example.com".into()),
//! }).await?;
//!
//! // Redirect user to: session.url
//! ```

mod checkout;
mod error;
mod plan;
mod stripe_client;
mod subscription;
mod webhook;

#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use checkout::{
    BillingConfig, BillingProvider, BillingRelay, CHECKOUT_SESSION_ID_TEMPLATE, CheckoutRequest,
    CheckoutSession, NewCheckoutSession, PortalRequest, PortalSession,
};
pub use error::{BillingError, Result};
pub use plan::{BillingCycle, PlanType, PriceTable};
pub use stripe_client::StripeClient;
pub use subscription::{MemorySubscriptionStore, STATUS_ACTIVE, SubscriptionRecord, SubscriptionStore};
pub use webhook::{
    DEFAULT_TOLERANCE_SECS, SIGNATURE_HEADER, WebhookEvent, WebhookHandler, WebhookVerifier,
    sign_payload,
};
