use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    http::{header, Method},
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};

mod calendar;
pub mod error;
mod handlers;
mod pollers;
mod services;
mod wallet;

use calendar::{EventSource, GoogleCalendarService};
use pollers::{CalendarMonitor, MonitorConfig};
use services::RsvpApprovalPolicy;
use wallet::AptosWalletService;

#[derive(Clone)]
pub struct AppState {
    pub calendar: Arc<GoogleCalendarService>,
    pub wallet: Arc<AptosWalletService>,
    pub monitor: Arc<CalendarMonitor>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    dotenvy::dotenv().ok();

    let calendar = Arc::new(GoogleCalendarService::from_env()?);
    let wallet = Arc::new(AptosWalletService::from_env());

    let monitor = Arc::new(CalendarMonitor::new(
        calendar.clone(),
        wallet.clone(),
        Arc::new(RsvpApprovalPolicy),
        MonitorConfig::from_env(),
    ));

    // Stored tokens from a previous run let monitoring start right away;
    // otherwise it starts after the OAuth callback.
    if calendar.is_authenticated() {
        monitor.start();
    } else {
        tracing::info!("Not authenticated; visit /auth to connect Google Calendar");
    }

    let state = AppState {
        calendar,
        wallet,
        monitor,
    };

    let app = Router::new()
        .route("/health", get(handlers::health))
        // Authentication
        .route("/auth", get(handlers::auth))
        .route("/auth/google/callback", get(handlers::auth_callback))
        // Wallet
        .route("/aptos/wallet", get(handlers::wallet_info))
        .route("/aptos/balance/:address", get(handlers::address_balance))
        .route("/aptos/transaction/:hash", get(handlers::transaction_status))
        // Events
        .route("/aptos/events", get(handlers::list_events))
        .route("/aptos/create-event", post(handlers::create_event))
        .route("/aptos/process-events", post(handlers::process_events))
        // Transactions + monitoring
        .route("/aptos/demo-transaction", post(handlers::demo_transaction))
        .route("/aptos/start-monitoring", post(handlers::start_monitoring))
        .route(
            "/aptos/check-calendar-now",
            post(handlers::check_calendar_now),
        )
        .layer(build_cors_layer())
        .with_state(state);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3001);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("CalendeFi agent listening on {} (Aptos Testnet)", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build CORS layer based on environment configuration.
///
/// If CORS_ALLOWED_ORIGINS is set, only those origins are allowed;
/// otherwise CORS is permissive (development default).
fn build_cors_layer() -> CorsLayer {
    let origins: Vec<_> = std::env::var("CORS_ALLOWED_ORIGINS")
        .map(|raw| {
            raw.split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect()
        })
        .unwrap_or_default();

    if origins.is_empty() {
        tracing::warn!("CORS_ALLOWED_ORIGINS not set, using permissive CORS");
        return CorsLayer::permissive();
    }

    tracing::info!("CORS configured for origins: {:?}", origins);
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}
