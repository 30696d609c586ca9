use dotenvy::dotenv;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use marketplace_server::config::Config;
use marketplace_server::payments::{PaymentProcessor, StripeProcessor};
use marketplace_server::routes::create_routes;
use marketplace_server::services::spawn_expiry_task;
use marketplace_server::state::AppState;
use marketplace_server::store::{MemoryStore, PgStore};

#[tokio::main]
async fn main() {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("marketplace_server=info,tower_http=info")),
        )
        .init();

    let config = Config::from_env();

    let processor: Option<Arc<dyn PaymentProcessor>> = match &config.payments.stripe_secret_key {
        Some(key) => {
            tracing::info!("Checkout will use Stripe hosted sessions");
            Some(Arc::new(StripeProcessor::new(key.clone())))
        }
        None => {
            tracing::info!("No payment processor configured, orders settle immediately");
            None
        }
    };
    if processor.is_some() && config.payments.webhook_secret.is_none() {
        tracing::warn!("STRIPE_WEBHOOK_SECRET is not set, payment webhooks will be refused");
    }

    let public_base_url = config.server.public_base_url.clone();
    let state = match &config.database {
        Some(database) => {
            let store = PgStore::connect(database)
                .await
                .expect("Failed to connect to database");
            AppState::new(Arc::new(store), processor, public_base_url)
        }
        None => {
            tracing::warn!("DATABASE_URL is not set, using the in-memory store");
            AppState::new(Arc::new(MemoryStore::new()), processor, public_base_url)
        }
    }
    .with_webhook_secret(config.payments.webhook_secret.clone());

    let _expiry = spawn_expiry_task(state.checkout.clone(), &config.orders);

    let app = create_routes(state);

    let addr = config.bind_address();
    let listener = TcpListener::bind(&addr)
        .await
        .expect("Failed to bind address");
    tracing::info!("Server running at http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server failed");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutting down");
}
