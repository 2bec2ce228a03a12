//! Billing Error Types

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, BillingError>;

/// Billing relay errors
#[derive(Error, Debug)]
pub enum BillingError {
    /// No price is mapped for the requested plan and billing cycle
    #[error("Invalid plan type or billing cycle")]
    InvalidPlan,

    /// The checkout session has no customer attached
    #[error("No customer found")]
    NoCustomer,

    /// Webhook signature verification failed
    #[error("Webhook signature invalid: {0}")]
    SignatureInvalid(String),

    /// Webhook payload parsing failed
    #[error("Webhook parse error: {0}")]
    WebhookParse(String),

    /// Payment provider call failed
    #[error("Stripe error: {0}")]
    Upstream(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),
}

impl BillingError {
    /// Whether the caller sent something unusable, as opposed to a server-side failure
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidPlan | Self::NoCustomer | Self::SignatureInvalid(_) | Self::WebhookParse(_)
        )
    }

    /// Stable machine-readable code for API responses
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidPlan => "INVALID_PLAN",
            Self::NoCustomer => "NO_CUSTOMER",
            Self::SignatureInvalid(_) => "INVALID_SIGNATURE",
            Self::WebhookParse(_) => "INVALID_PAYLOAD",
            Self::Upstream(_) => "UPSTREAM_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Storage(_) => "STORAGE_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors() {
        assert!(BillingError::InvalidPlan.is_client_error());
        assert!(BillingError::NoCustomer.is_client_error());
        assert!(BillingError::SignatureInvalid("bad".into()).is_client_error());
        assert!(!BillingError::Upstream("boom".into()).is_client_error());
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            BillingError::InvalidPlan.to_string(),
            "Invalid plan type or billing cycle"
        );
        assert_eq!(BillingError::NoCustomer.to_string(), "No customer found");
    }
}
