pub mod config;
pub mod dtos;
pub mod handlers;
pub mod models;
pub mod services;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::middleware::{from_fn, from_fn_with_state};
use axum::{
    routing::{get, post},
    Router,
};
use mongodb::{options::ClientOptions, Client};
use secrecy::ExposeSecret;
use service_core::error::set_production_mode;
use service_core::middleware::rate_limit::{create_ip_rate_limiter, ip_rate_limit_middleware};
use service_core::middleware::tracing::request_id_middleware;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use config::Config;
use services::cache::TtlCache;
use services::{DonationStore, MongoDonationStore, PayPalClient, ReceiptMailer};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn DonationStore>,
    pub paypal: PayPalClient,
    pub mailer: ReceiptMailer,
    pub product_cache: Arc<TtlCache<String>>,
}

pub struct Application {
    port: u16,
    router: Router,
}

impl Application {
    pub async fn build(config: Config) -> anyhow::Result<Self> {
        set_production_mode(config.is_production());

        let mut client_options = ClientOptions::parse(config.database.url.expose_secret()).await?;
        client_options.app_name = Some(config.service_name.clone());

        let client = Client::with_options(client_options)?;
        let db = client.database(&config.database.db_name);

        let store = MongoDonationStore::new(&db);
        store.init_indexes().await?;

        let paypal = PayPalClient::new(config.paypal.clone());
        if paypal.is_configured() {
            tracing::info!("PayPal client initialized");
        } else {
            tracing::warn!("PayPal credentials not configured - donation features will be limited");
        }
        if config.paypal.webhook_id.is_none() {
            tracing::warn!(
                "PAYPAL_WEBHOOK_ID not configured - webhook signatures will not be verified"
            );
        }

        let mailer = ReceiptMailer::new(config.email.clone())?;

        let state = AppState {
            config: config.clone(),
            store: Arc::new(store),
            paypal,
            mailer,
            product_cache: Arc::new(TtlCache::new()),
        };

        let rate_limiter = create_ip_rate_limiter(120, 60);

        let router = Router::new()
            .route("/health", get(handlers::health_check))
            // Donation checkout pipeline
            .route(
                "/donations/initiate",
                post(handlers::donations::initiate_donation),
            )
            .route(
                "/donations/capture",
                post(handlers::donations::capture_donation),
            )
            .route(
                "/donations/status/:pending_id",
                get(handlers::donations::donation_status),
            )
            // Provider webhooks
            .route("/webhooks/paypal", post(handlers::webhooks::paypal_webhook))
            // Subscription lifecycle
            .route(
                "/subscriptions",
                post(handlers::subscriptions::create_subscription),
            )
            .route(
                "/subscriptions/:id",
                get(handlers::subscriptions::get_subscription),
            )
            .route(
                "/subscriptions/:id/activate",
                post(handlers::subscriptions::activate_subscription),
            )
            .route(
                "/subscriptions/:id/cancel",
                post(handlers::subscriptions::cancel_subscription),
            )
            // Legacy aliases kept for older clients; behavior is identical
            .route(
                "/donations/create-subscription",
                post(handlers::subscriptions::create_subscription),
            )
            .route(
                "/donations/subscription/:id",
                get(handlers::subscriptions::get_subscription),
            )
            .route(
                "/donations/activate-subscription",
                post(handlers::subscriptions::activate_subscription_legacy),
            )
            .route(
                "/donations/cancel-subscription",
                post(handlers::subscriptions::cancel_subscription_legacy),
            )
            .layer(from_fn_with_state(rate_limiter, ip_rate_limit_middleware))
            .layer(from_fn(request_id_middleware))
            .layer(CorsLayer::permissive())
            .layer(
                TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                    let request_id = request
                        .headers()
                        .get("x-request-id")
                        .and_then(|value| value.to_str().ok())
                        .unwrap_or("-");

                    tracing::info_span!(
                        "http_request",
                        request_id = %request_id,
                        method = %request.method(),
                        uri = %request.uri(),
                        version = ?request.version(),
                    )
                }),
            )
            .with_state(state);

        Ok(Self {
            port: config.server.port,
            router,
        })
    }

    pub async fn run_until_stopped(self) -> anyhow::Result<()> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        tracing::info!("Listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(
            listener,
            self.router
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await?;

        Ok(())
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}
