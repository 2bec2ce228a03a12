//! HTTP Handlers

use std::convert::Infallible;

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
    response::{
        IntoResponse, Response,
        sse::{Event, Sse},
    },
};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use sage_billing::{
    BillingError, CheckoutRequest, CheckoutSession, PortalRequest, PortalSession, SIGNATURE_HEADER,
    SubscriptionRecord, SubscriptionStore,
};
use sage_explain::{DONE_SENTINEL, ExplanationSource, StreamChunk};

use crate::state::AppState;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub stripe_configured: bool,
    pub webhook_verification: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicConfigResponse {
    pub publishable_key: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct ExplainRequest {
    pub prompt: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>, code: &str) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            code: code.into(),
        }),
    )
}

fn billing_error(err: &BillingError) -> ApiError {
    let status = if err.is_client_error() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    api_error(status, err.to_string(), err.code())
}

/// Unreadable request bodies still answer with a JSON error
fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload.map(|Json(body)| body).map_err(|rejection| {
        tracing::warn!(error = %rejection.body_text(), "Rejected request body");
        api_error(rejection.status(), rejection.body_text(), "INVALID_REQUEST")
    })
}

fn payments_disabled() -> ApiError {
    api_error(
        StatusCode::SERVICE_UNAVAILABLE,
        "Payments not configured",
        "PAYMENTS_DISABLED",
    )
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        stripe_configured: state.billing.is_some(),
        webhook_verification: state.verifier.is_enforced(),
    })
}

/// Client-side configuration
pub async fn public_config(State(state): State<AppState>) -> Json<PublicConfigResponse> {
    Json(PublicConfigResponse {
        publishable_key: state.publishable_key,
    })
}

/// Create Stripe checkout session
pub async fn create_checkout_session(
    State(state): State<AppState>,
    payload: Result<Json<CheckoutRequest>, JsonRejection>,
) -> Result<Json<CheckoutSession>, ApiError> {
    let billing = state.billing.as_ref().ok_or_else(payments_disabled)?;
    let payload = json_body(payload)?;

    let session = billing.create_checkout_session(payload).await.map_err(|e| {
        if e.is_client_error() {
            tracing::warn!(error = %e, "Rejected checkout request");
        } else {
            tracing::error!(error = %e, "Error creating checkout session");
        }
        billing_error(&e)
    })?;

    Ok(Json(session))
}

/// Create billing portal session for an earlier checkout
pub async fn create_portal_session(
    State(state): State<AppState>,
    payload: Result<Json<PortalRequest>, JsonRejection>,
) -> Result<Json<PortalSession>, ApiError> {
    let billing = state.billing.as_ref().ok_or_else(payments_disabled)?;
    let payload = json_body(payload)?;

    let portal = billing
        .create_portal_session(&payload.session_id)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, session_id = %payload.session_id, "Error creating portal session");
            billing_error(&e)
        })?;

    Ok(Json(portal))
}

/// Stripe webhook handler
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());

    let event = match state.verifier.verify(&body, signature) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(error = %e, "Webhook Error");
            return (StatusCode::BAD_REQUEST, format!("Webhook Error: {e}")).into_response();
        }
    };

    if let Err(e) = state.webhooks.handle(event) {
        tracing::error!(error = %e, "Webhook processing error");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Webhook Error: {e}"),
        )
            .into_response();
    }

    Json(serde_json::json!({ "received": true })).into_response()
}

/// Latest known subscription status for a customer
pub async fn subscription_status(
    State(state): State<AppState>,
    Path(customer_id): Path<String>,
) -> Result<Json<SubscriptionRecord>, ApiError> {
    match state.subscriptions.get(&customer_id) {
        Ok(Some(record)) => Ok(Json(record)),
        Ok(None) => Err(api_error(
            StatusCode::NOT_FOUND,
            "No subscription found",
            "NOT_FOUND",
        )),
        Err(e) => Err(billing_error(&e)),
    }
}

fn chunk_event(chunk: &StreamChunk) -> Event {
    match chunk {
        StreamChunk::Text(text) => {
            Event::default().data(serde_json::json!({ "content": text }).to_string())
        }
        StreamChunk::Done => Event::default().data(DONE_SENTINEL),
    }
}

/// Stream an explanation from the configured endpoint as server-sent events
pub async fn explain(
    State(state): State<AppState>,
    payload: Result<Json<ExplainRequest>, JsonRejection>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let payload = json_body(payload)?;
    let explainer = state.explainer.as_ref().ok_or_else(|| {
        api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "Explanations not configured",
            "EXPLAIN_DISABLED",
        )
    })?;

    let chunks = explainer.explain(&payload.prompt).await.map_err(|e| {
        tracing::error!(error = %e, "Error fetching AI explanation");
        api_error(StatusCode::BAD_GATEWAY, e.to_string(), "EXPLAIN_UPSTREAM")
    })?;

    let events = chunks.map(|item| {
        Ok::<_, Infallible>(match item {
            Ok(chunk) => chunk_event(&chunk),
            Err(e) => {
                tracing::warn!(error = %e, "Explanation stream interrupted");
                Event::default().event("error").data(e.to_string())
            }
        })
    });

    Ok(Sse::new(events))
}
