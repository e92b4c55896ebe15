use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use voya_api::{app, AppState};
use voya_booking::BookingManager;
use voya_gateway::{GatewayConfig, ReconciliationGateway};
use voya_ledger::InMemorySlotLedger;
use voya_store::{InMemoryBookingStore, InMemoryDepartureStore, InMemoryPaymentAuditStore};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voya_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = voya_store::Config::load().expect("Failed to load config");
    tracing::info!("Starting Voya API on port {}", config.server.port);

    let booking_store = Arc::new(InMemoryBookingStore::new());
    let departure_store = Arc::new(InMemoryDepartureStore::new());
    let audit_store = Arc::new(InMemoryPaymentAuditStore::new());
    let ledger = Arc::new(InMemorySlotLedger::new(
        config.business_rules.ledger_max_retries,
    ));

    let bookings = Arc::new(BookingManager::new(
        booking_store,
        departure_store.clone(),
        ledger.clone(),
    ));

    let gateway = Arc::new(ReconciliationGateway::new(
        GatewayConfig {
            pay_url: config.gateway.pay_url.clone(),
            merchant_code: config.gateway.merchant_code.clone(),
            secret: config.gateway.secret.clone(),
            return_url: config.gateway.return_url.clone(),
            currency: config.gateway.currency.clone(),
            locale: config.gateway.locale.clone(),
            order_type: config.gateway.order_type.clone(),
        },
        bookings.clone(),
        audit_store,
    ));

    let app_state = AppState {
        bookings,
        gateway,
        departures: departure_store,
        ledger,
        business_rules: config.business_rules.clone(),
    };

    tokio::spawn(voya_api::worker::start_sweep_worker(app_state.clone()));

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
