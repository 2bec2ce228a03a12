//! Stripe Webhook Handling
//!
//! Verifies webhook signatures against the raw body and dispatches the
//! subscription lifecycle events the relay cares about.

use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{BillingError, Result};
use crate::subscription::{STATUS_ACTIVE, SubscriptionStore};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the provider signature
pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Maximum age of a signed payload, in seconds
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

/// Parsed webhook event
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WebhookEvent {
    /// `checkout.session.completed`
    CheckoutCompleted {
        session_id: String,
        customer: Option<String>,
        customer_email: Option<String>,
        metadata: HashMap<String, String>,
    },

    /// `customer.subscription.updated`
    SubscriptionUpdated {
        subscription_id: String,
        customer: Option<String>,
        status: String,
    },

    /// `customer.subscription.deleted`
    SubscriptionDeleted {
        subscription_id: String,
        customer: Option<String>,
        status: String,
    },

    /// Unhandled event type
    Other { event_type: String },
}

#[derive(Deserialize)]
struct RawEvent {
    #[serde(default)]
    id: Option<String>,
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    data: Option<RawEventData>,
}

#[derive(Deserialize)]
struct RawEventData {
    object: Value,
}

#[derive(Deserialize)]
struct RawCheckoutSession {
    id: String,
    #[serde(default)]
    customer: Value,
    #[serde(default)]
    customer_email: Option<String>,
    #[serde(default)]
    customer_details: Option<RawCustomerDetails>,
    #[serde(default)]
    metadata: Option<HashMap<String, String>>,
}

#[derive(Deserialize)]
struct RawCustomerDetails {
    #[serde(default)]
    email: Option<String>,
}

#[derive(Deserialize)]
struct RawSubscription {
    id: String,
    #[serde(default)]
    customer: Value,
    status: String,
}

/// Customer references arrive either as an id or as an expanded object.
fn customer_ref(value: &Value) -> Option<String> {
    match value {
        Value::String(id) => Some(id.clone()),
        Value::Object(map) => map.get("id").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

impl WebhookEvent {
    /// Build a typed event from a raw JSON body
    pub fn from_payload(payload: &[u8]) -> Result<Self> {
        let raw: RawEvent = serde_json::from_slice(payload)
            .map_err(|e| BillingError::WebhookParse(e.to_string()))?;

        tracing::debug!(event_id = ?raw.id, event_type = %raw.event_type, "Parsed webhook payload");

        let object = || {
            raw.data
                .as_ref()
                .map(|d| d.object.clone())
                .ok_or_else(|| BillingError::WebhookParse("Missing data.object".into()))
        };

        match raw.event_type.as_str() {
            "checkout.session.completed" => {
                let session: RawCheckoutSession = serde_json::from_value(object()?)
                    .map_err(|e| BillingError::WebhookParse(format!("Invalid checkout session data: {e}")))?;

                Ok(Self::CheckoutCompleted {
                    customer: customer_ref(&session.customer),
                    customer_email: session
                        .customer_email
                        .or_else(|| session.customer_details.and_then(|d| d.email)),
                    metadata: session.metadata.unwrap_or_default(),
                    session_id: session.id,
                })
            }

            kind @ ("customer.subscription.updated" | "customer.subscription.deleted") => {
                let sub: RawSubscription = serde_json::from_value(object()?)
                    .map_err(|e| BillingError::WebhookParse(format!("Invalid subscription data: {e}")))?;
                let customer = customer_ref(&sub.customer);

                if kind == "customer.subscription.updated" {
                    Ok(Self::SubscriptionUpdated {
                        subscription_id: sub.id,
                        customer,
                        status: sub.status,
                    })
                } else {
                    Ok(Self::SubscriptionDeleted {
                        subscription_id: sub.id,
                        customer,
                        status: sub.status,
                    })
                }
            }

            _ => Ok(Self::Other {
                event_type: raw.event_type,
            }),
        }
    }

    /// Provider event type string
    pub fn event_type(&self) -> &str {
        match self {
            Self::CheckoutCompleted { .. } => "checkout.session.completed",
            Self::SubscriptionUpdated { .. } => "customer.subscription.updated",
            Self::SubscriptionDeleted { .. } => "customer.subscription.deleted",
            Self::Other { event_type } => event_type,
        }
    }
}

/// Produce a `t=<timestamp>,v1=<hex>` signature header for a payload
pub fn sign_payload(secret: &str, timestamp: i64, payload: &[u8]) -> Result<String> {
    let mac = signing_mac(secret, timestamp, payload)?;
    let signature = hex::encode(mac.finalize().into_bytes());
    Ok(format!("t={timestamp},v1={signature}"))
}

fn signing_mac(secret: &str, timestamp: i64, payload: &[u8]) -> Result<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| BillingError::Config(format!("Invalid webhook secret: {e}")))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

/// Parsed `Stripe-Signature` header
struct SignatureHeader {
    timestamp: i64,
    signatures: Vec<Vec<u8>>,
}

impl SignatureHeader {
    fn parse(header: &str) -> Result<Self> {
        let mut timestamp = None;
        let mut signatures = Vec::new();

        for part in header.split(',') {
            let Some((key, value)) = part.trim().split_once('=') else {
                continue;
            };
            match key {
                "t" => {
                    timestamp = Some(value.parse::<i64>().map_err(|_| {
                        BillingError::SignatureInvalid("Malformed timestamp".into())
                    })?);
                }
                "v1" => {
                    // Undecodable entries can never match; skip them.
                    if let Ok(bytes) = hex::decode(value) {
                        signatures.push(bytes);
                    }
                }
                _ => {}
            }
        }

        let timestamp =
            timestamp.ok_or_else(|| BillingError::SignatureInvalid("Missing timestamp".into()))?;
        if signatures.is_empty() {
            return Err(BillingError::SignatureInvalid("No v1 signatures found".into()));
        }

        Ok(Self {
            timestamp,
            signatures,
        })
    }
}

/// Checks webhook bodies against the signing secret
#[derive(Clone, Debug)]
pub struct WebhookVerifier {
    secret: Option<String>,
    tolerance_secs: i64,
}

impl WebhookVerifier {
    /// An empty secret is treated as no secret.
    pub fn new(secret: Option<String>) -> Self {
        Self {
            secret: secret.filter(|s| !s.trim().is_empty()),
            tolerance_secs: DEFAULT_TOLERANCE_SECS,
        }
    }

    /// Whether signatures are checked at all
    pub const fn is_enforced(&self) -> bool {
        self.secret.is_some()
    }

    /// Verify a raw body against its signature header and parse it
    pub fn verify(&self, payload: &[u8], signature: Option<&str>) -> Result<WebhookEvent> {
        self.verify_at(payload, signature, Utc::now().timestamp())
    }

    /// [`Self::verify`] with an explicit clock
    pub fn verify_at(&self, payload: &[u8], signature: Option<&str>, now: i64) -> Result<WebhookEvent> {
        if let Some(ref secret) = self.secret {
            let header = signature
                .ok_or_else(|| BillingError::SignatureInvalid("Missing signature header".into()))?;
            let header = SignatureHeader::parse(header)?;

            if now.abs_diff(header.timestamp) > self.tolerance_secs.unsigned_abs() {
                return Err(BillingError::SignatureInvalid(
                    "Timestamp outside the tolerance zone".into(),
                ));
            }

            let mac = signing_mac(secret, header.timestamp, payload)?;
            let matched = header
                .signatures
                .iter()
                .any(|candidate| mac.clone().verify_slice(candidate).is_ok());

            if !matched {
                return Err(BillingError::SignatureInvalid(
                    "No signatures found matching the expected signature for payload".into(),
                ));
            }
        }

        WebhookEvent::from_payload(payload)
    }
}

/// Webhook handler
pub struct WebhookHandler {
    store: Arc<dyn SubscriptionStore>,
}

impl WebhookHandler {
    pub fn new(store: Arc<dyn SubscriptionStore>) -> Self {
        Self { store }
    }

    /// Process a verified webhook event
    pub fn handle(&self, event: WebhookEvent) -> Result<WebhookEvent> {
        tracing::info!(event_type = %event.event_type(), "Processing Stripe webhook");

        match &event {
            WebhookEvent::CheckoutCompleted {
                session_id,
                customer,
                customer_email,
                metadata,
            } => {
                tracing::info!(
                    session_id = %session_id,
                    customer = ?customer,
                    email = ?customer_email,
                    metadata = ?metadata,
                    "Subscription successful"
                );

                if let Some(customer) = customer {
                    self.store.upsert(customer, STATUS_ACTIVE)?;
                }
            }

            WebhookEvent::SubscriptionUpdated {
                subscription_id,
                customer,
                status,
            }
            | WebhookEvent::SubscriptionDeleted {
                subscription_id,
                customer,
                status,
            } => {
                tracing::info!(
                    subscription_id = %subscription_id,
                    customer = ?customer,
                    status = %status,
                    "Subscription status changed"
                );

                match customer {
                    Some(customer) => {
                        self.store.upsert(customer, status)?;
                    }
                    None => {
                        tracing::warn!(subscription_id = %subscription_id, "Subscription event without customer");
                    }
                }
            }

            WebhookEvent::Other { event_type } => {
                tracing::info!(event_type = %event_type, "Unhandled webhook event");
            }
        }

        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscription::MemorySubscriptionStore;

    const SECRET: &str = "whsec_test_secret";
    const NOW: i64 = 1_706_500_000;

    fn checkout_completed() -> Vec<u8> {
        serde_json::json!({
            "id": "evt_1",
            "type": "checkout.session.completed",
            "data": {
                "object": {
                    "id": "cs_test_1",
                    "customer": "cus_123",
                    "customer_email": "ada@example.com",
                    "metadata": {"userId": "user_42", "planType": "pro", "billingCycle": "monthly"}
                }
            }
        })
        .to_string()
        .into_bytes()
    }

    fn verifier() -> WebhookVerifier {
        WebhookVerifier::new(Some(SECRET.into()))
    }

    #[test]
    fn test_sign_payload_format() {
        let sig = sign_payload(SECRET, NOW, b"{}").unwrap();
        let hex_part = sig.strip_prefix("t=1706500000,v1=").unwrap();
        assert_eq!(hex_part.len(), 64);
    }

    #[test]
    fn test_valid_signature_parses_event() {
        let body = checkout_completed();
        let sig = sign_payload(SECRET, NOW, &body).unwrap();

        let event = verifier().verify_at(&body, Some(&sig), NOW + 10).unwrap();
        match event {
            WebhookEvent::CheckoutCompleted {
                session_id,
                customer,
                metadata,
                ..
            } => {
                assert_eq!(session_id, "cs_test_1");
                assert_eq!(customer.as_deref(), Some("cus_123"));
                assert_eq!(metadata["planType"], "pro");
            }
            other => panic!("Expected CheckoutCompleted, got {other:?}"),
        }
    }

    #[test]
    fn test_tampered_body_is_rejected() {
        let body = checkout_completed();
        let sig = sign_payload(SECRET, NOW, &body).unwrap();
        let mut tampered = body.clone();
        tampered.extend_from_slice(b" ");

        let err = verifier().verify_at(&tampered, Some(&sig), NOW).unwrap_err();
        assert!(matches!(err, BillingError::SignatureInvalid(_)));
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let body = checkout_completed();
        let sig = sign_payload("whsec_other", NOW, &body).unwrap();

        let err = verifier().verify_at(&body, Some(&sig), NOW).unwrap_err();
        assert!(matches!(err, BillingError::SignatureInvalid(_)));
    }

    #[test]
    fn test_stale_timestamp_is_rejected() {
        let body = checkout_completed();
        let sig = sign_payload(SECRET, NOW, &body).unwrap();

        let err = verifier()
            .verify_at(&body, Some(&sig), NOW + DEFAULT_TOLERANCE_SECS + 1)
            .unwrap_err();
        assert!(matches!(err, BillingError::SignatureInvalid(_)));
    }

    #[test]
    fn test_missing_header_is_rejected_when_secret_configured() {
        let err = verifier()
            .verify_at(&checkout_completed(), None, NOW)
            .unwrap_err();
        assert!(matches!(err, BillingError::SignatureInvalid(_)));
    }

    #[test]
    fn test_any_matching_v1_is_accepted() {
        let body = checkout_completed();
        let good = sign_payload(SECRET, NOW, &body).unwrap();
        let good_hex = good.split("v1=").nth(1).unwrap();
        let header = format!("t={NOW},v1={},v1={good_hex},v0=deadbeef", "00".repeat(32));

        assert!(verifier().verify_at(&body, Some(&header), NOW).is_ok());
    }

    #[test]
    fn test_extreme_timestamps_are_rejected() {
        let body = checkout_completed();
        for t in [i64::MIN, i64::MAX] {
            let header = format!("t={t},v1=00");
            let err = verifier().verify_at(&body, Some(&header), NOW).unwrap_err();
            assert!(matches!(err, BillingError::SignatureInvalid(_)), "{header}");
        }

        let err = verifier()
            .verify_at(&body, Some("t=-9223372036854775808,v1=00"), i64::MAX)
            .unwrap_err();
        assert!(matches!(err, BillingError::SignatureInvalid(_)));
    }

    #[test]
    fn test_malformed_headers() {
        let body = checkout_completed();
        for header in ["", "v1=abcd", "t=notanumber,v1=abcd", "t=1706500000"] {
            let err = verifier().verify_at(&body, Some(header), NOW).unwrap_err();
            assert!(matches!(err, BillingError::SignatureInvalid(_)), "{header}");
        }
    }

    #[test]
    fn test_unverified_mode_trusts_body() {
        let verifier = WebhookVerifier::new(Some(String::new()));
        assert!(!verifier.is_enforced());
        assert!(!WebhookVerifier::new(Some("   ".into())).is_enforced());

        let event = verifier.verify(&checkout_completed(), None).unwrap();
        assert_eq!(event.event_type(), "checkout.session.completed");
    }

    #[test]
    fn test_unparseable_body() {
        let verifier = WebhookVerifier::new(None);
        let err = verifier.verify(b"not json", None).unwrap_err();
        assert!(matches!(err, BillingError::WebhookParse(_)));
    }

    #[test]
    fn test_subscription_events() {
        let body = serde_json::json!({
            "type": "customer.subscription.deleted",
            "data": {"object": {"id": "sub_1", "customer": {"id": "cus_9"}, "status": "canceled"}}
        })
        .to_string();

        let event = WebhookEvent::from_payload(body.as_bytes()).unwrap();
        assert_eq!(
            event,
            WebhookEvent::SubscriptionDeleted {
                subscription_id: "sub_1".into(),
                customer: Some("cus_9".into()),
                status: "canceled".into(),
            }
        );
    }

    #[test]
    fn test_unknown_event_type() {
        let body = br#"{"type":"invoice.paid","data":{"object":{}}}"#;
        let event = WebhookEvent::from_payload(body).unwrap();
        assert_eq!(
            event,
            WebhookEvent::Other {
                event_type: "invoice.paid".into()
            }
        );
    }

    #[test]
    fn test_handler_records_statuses() {
        let store = Arc::new(MemorySubscriptionStore::new());
        let handler = WebhookHandler::new(store.clone());

        handler
            .handle(WebhookEvent::from_payload(&checkout_completed()).unwrap())
            .unwrap();
        assert_eq!(store.get("cus_123").unwrap().unwrap().status, "active");

        handler
            .handle(WebhookEvent::SubscriptionUpdated {
                subscription_id: "sub_1".into(),
                customer: Some("cus_123".into()),
                status: "past_due".into(),
            })
            .unwrap();
        assert_eq!(store.get("cus_123").unwrap().unwrap().status, "past_due");

        handler
            .handle(WebhookEvent::Other {
                event_type: "invoice.paid".into(),
            })
            .unwrap();
        assert_eq!(store.len().unwrap(), 1);
    }
}
