//! Code Sage relay server
//!
//! Axum-based server relaying checkout, billing-portal and webhook traffic
//! to Stripe, and proxying AI explanation streams.

mod config;
mod handlers;
mod state;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sage_billing::{
    BillingConfig, BillingRelay, MemorySubscriptionStore, StripeClient, SubscriptionStore,
    WebhookHandler, WebhookVerifier,
};
use sage_explain::{ExplanationClient, ExplanationSource};

use crate::config::Config;
use crate::handlers::{
    create_checkout_session, create_portal_session, explain, health_check, public_config,
    stripe_webhook, subscription_status,
};
use crate::state::AppState;

/// Assemble the HTTP routes around shared state
fn build_router(state: AppState, static_dir: &str) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health & info
        .route("/health", get(health_check))
        .route("/config", get(public_config))
        // Payments
        .route("/create-checkout-session", post(create_checkout_session))
        .route("/create-portal-session", post(create_portal_session))
        .route("/webhook", post(stripe_webhook))
        .route("/subscriptions/{customer_id}", get(subscription_status))
        // Explanations
        .route("/api/explain", post(explain))
        // Static files (built frontend)
        .fallback_service(ServeDir::new(static_dir))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment first so RUST_LOG from .env applies
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    // Initialize payments
    let billing = match config.stripe_secret_key.as_deref() {
        Some(key) => {
            tracing::info!(
                site_url = %config.site_url(),
                prices = config.prices.len(),
                "✓ Stripe configured"
            );
            Some(Arc::new(BillingRelay::new(
                Arc::new(StripeClient::new(key)),
                BillingConfig::new(config.prices.clone(), config.site_url()),
            )))
        }
        None => {
            tracing::warn!("⚠ Stripe not configured - checkout and portal disabled");
            tracing::warn!("  Set STRIPE_SECRET_KEY in .env");
            None
        }
    };

    let verifier = WebhookVerifier::new(config.webhook_secret.clone());
    if !verifier.is_enforced() {
        tracing::warn!("⚠ STRIPE_WEBHOOK_SECRET not set - webhook bodies are trusted unverified");
        tracing::warn!("  Only acceptable for local development");
    }

    let subscriptions: Arc<dyn SubscriptionStore> = Arc::new(MemorySubscriptionStore::new());

    // Initialize explanation client
    let explainer: Option<Arc<dyn ExplanationSource>> =
        match ExplanationClient::from_config(config.explain.clone()) {
            Ok(client) => {
                tracing::info!(endpoint = %client.endpoint(), "✓ Explanation endpoint configured");
                Some(Arc::new(client))
            }
            Err(e) => {
                tracing::warn!("⚠ Explanation client unavailable: {}", e);
                None
            }
        };

    // Build application state
    let state = AppState {
        billing,
        verifier: Arc::new(verifier),
        webhooks: Arc::new(WebhookHandler::new(subscriptions.clone())),
        subscriptions,
        explainer,
        publishable_key: config.publishable_key.clone(),
    };

    let app = build_router(state, &config.static_dir);

    // Start server
    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("🚀 Code Sage server running on http://{}", addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("");
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health                    - Health check");
    tracing::info!("  GET  /config                    - Client configuration");
    tracing::info!("  POST /create-checkout-session   - Create Stripe checkout");
    tracing::info!("  POST /create-portal-session     - Create billing portal session");
    tracing::info!("  POST /webhook                   - Stripe webhooks");
    tracing::info!("  GET  /subscriptions/{{customer}}  - Subscription status");
    tracing::info!("  POST /api/explain               - Stream AI explanation");
    tracing::info!("");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
