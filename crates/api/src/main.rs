//! API server entry point.

use std::time::Duration;

use api::config::{Config, LogFormat};
use delivery::DeliveryConfig;
use order_store::{InMemoryOrderStore, OrderStore, PostgresOrderStore};
use saga::{CollaboratorClient, HttpPaymentGateway, HttpProductCatalog, RetryPolicy};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn serve<S: OrderStore + Clone + 'static>(
    store: S,
    config: &Config,
    metrics_handle: metrics_exporter_prometheus::PrometheusHandle,
) {
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .expect("failed to build HTTP client");
    let retry = RetryPolicy::with_base_delay(config.collaborator_retry_delay);

    let catalog = HttpProductCatalog::new(CollaboratorClient::new(
        http.clone(),
        &config.product_service_url,
        retry,
    ));
    let payment = HttpPaymentGateway::new(CollaboratorClient::new(
        http,
        &config.payment_service_url,
        retry,
    ));

    let delivery_config = DeliveryConfig {
        allow_status_override: config.allow_status_override,
        ..DeliveryConfig::default()
    };
    let state = api::create_state(
        store,
        std::sync::Arc::new(catalog),
        std::sync::Arc::new(payment),
        delivery_config,
    );
    let delivery = state.delivery.clone();
    let app = api::create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(
        %addr,
        product_service = %config.product_service_url,
        payment_service = %config.payment_service_url,
        "starting API server"
    );

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // Event streams never end on their own.
            delivery.shutdown().await;
        })
        .await
        .expect("server error");
}

#[tokio::main]
async fn main() {
    // 1. Load configuration and initialize tracing
    let config = Config::from_env();
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let prometheus_builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    let metrics_handle = prometheus_builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Pick the order store and start serving
    match &config.database_url {
        Some(url) => {
            let store = PostgresOrderStore::connect(url, 10)
                .await
                .expect("failed to connect to PostgreSQL");
            tracing::info!("orders are stored in PostgreSQL");
            serve(store, &config, metrics_handle).await;
        }
        None => {
            tracing::info!("DATABASE_URL not set, orders are kept in memory");
            serve(InMemoryOrderStore::new(), &config, metrics_handle).await;
        }
    }

    tracing::info!("server shut down gracefully");
}
