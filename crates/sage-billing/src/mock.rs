//! Recording provider for tests

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::checkout::{BillingProvider, CheckoutSession, NewCheckoutSession, PortalSession};
use crate::error::{BillingError, Result};

/// In-memory [`BillingProvider`] that records every call it receives
#[derive(Default)]
pub struct MockBillingProvider {
    checkout_calls: Mutex<Vec<NewCheckoutSession>>,
    portal_calls: Mutex<Vec<(String, String)>>,
    session_customers: HashMap<String, String>,
    failure: Option<String>,
}

impl MockBillingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// A provider whose every call fails with the given message
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::default()
        }
    }

    /// Attach a customer to a checkout session id
    #[must_use]
    pub fn with_session_customer(mut self, session_id: &str, customer_id: &str) -> Self {
        self.session_customers
            .insert(session_id.to_string(), customer_id.to_string());
        self
    }

    pub fn checkout_calls(&self) -> Vec<NewCheckoutSession> {
        self.checkout_calls.lock().unwrap().clone()
    }

    pub fn portal_calls(&self) -> Vec<(String, String)> {
        self.portal_calls.lock().unwrap().clone()
    }

    fn check_failure(&self) -> Result<()> {
        match self.failure {
            Some(ref message) => Err(BillingError::Upstream(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl BillingProvider for MockBillingProvider {
    async fn create_checkout_session(&self, params: NewCheckoutSession) -> Result<CheckoutSession> {
        self.check_failure()?;

        let mut calls = self.checkout_calls.lock().unwrap();
        calls.push(params);
        let id = format!("cs_test_{}", calls.len());

        Ok(CheckoutSession {
            url: Some(format!("https://checkout.stripe.com/c/pay/{id}")),
            id,
        })
    }

    async fn checkout_session_customer(&self, session_id: &str) -> Result<Option<String>> {
        self.check_failure()?;
        Ok(self.session_customers.get(session_id).cloned())
    }

    async fn create_portal_session(&self, customer_id: &str, return_url: &str) -> Result<PortalSession> {
        self.check_failure()?;

        self.portal_calls
            .lock()
            .unwrap()
            .push((customer_id.to_string(), return_url.to_string()));

        Ok(PortalSession {
            url: format!("https://billing.stripe.com/p/session/{customer_id}"),
        })
    }
}
