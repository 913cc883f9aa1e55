//! HTTP route handlers.
//!
//! Every response is a JSON envelope carrying `success: bool`; failures
//! go through [`crate::error::ApiError`] for the conventional status
//! codes.

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared_types::{parse_intent, Schedule, TransferIntent, WalletInfo};

use crate::calendar::EventSource;
use crate::error::{ApiError, ApiResult};
use crate::pollers::TickReport;
use crate::wallet::{explorer_txn_url, TransferExecutor};
use crate::AppState;

fn require_auth(state: &AppState) -> Result<(), ApiError> {
    if state.calendar.is_authenticated() {
        Ok(())
    } else {
        Err(ApiError::Unauthorized {
            auth_url: Some(state.calendar.auth_url()),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

// Health + auth

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub network: &'static str,
    pub monitoring: bool,
    pub authenticated: bool,
    pub timestamp: DateTime<Utc>,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        network: "Aptos Testnet",
        monitoring: state.monitor.is_running(),
        authenticated: state.calendar.is_authenticated(),
        timestamp: Utc::now(),
    })
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub success: bool,
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_url: Option<String>,
}

pub async fn auth(State(state): State<AppState>) -> Json<AuthResponse> {
    if state.calendar.is_authenticated() {
        Json(AuthResponse {
            success: true,
            message: "Already authenticated",
            auth_url: None,
        })
    } else {
        Json(AuthResponse {
            success: true,
            message: "Please visit the auth_url to authenticate",
            auth_url: Some(state.calendar.auth_url()),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
}

pub async fn auth_callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> ApiResult<Json<MessageResponse>> {
    let code = params
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ApiError::bad_request("Authorization code not provided"))?;

    state
        .calendar
        .exchange_code(&code)
        .await
        .map_err(ApiError::calendar)?;

    state.monitor.start();

    Ok(Json(MessageResponse {
        success: true,
        message: "Authentication successful! Calendar monitoring started.".to_string(),
    }))
}

// Wallet

#[derive(Debug, Serialize)]
pub struct WalletResponse {
    pub success: bool,
    pub wallet: WalletInfo,
}

pub async fn wallet_info(State(state): State<AppState>) -> ApiResult<Json<WalletResponse>> {
    let wallet = state.wallet.wallet_info().await.map_err(ApiError::wallet)?;
    Ok(Json(WalletResponse {
        success: true,
        wallet,
    }))
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub success: bool,
    pub balance: String,
}

pub async fn address_balance(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> ApiResult<Json<BalanceResponse>> {
    let balance = state
        .wallet
        .address_balance(&address)
        .await
        .map_err(ApiError::wallet)?;
    Ok(Json(BalanceResponse {
        success: true,
        balance,
    }))
}

#[derive(Debug, Serialize)]
pub struct TransactionStatusResponse {
    pub success: bool,
    pub transaction_hash: String,
    pub status: Value,
    pub explorer_url: String,
}

pub async fn transaction_status(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> ApiResult<Json<TransactionStatusResponse>> {
    let status = state
        .wallet
        .transaction_status(&hash)
        .await
        .map_err(ApiError::wallet)?;
    Ok(Json(TransactionStatusResponse {
        success: true,
        explorer_url: explorer_txn_url(&hash),
        transaction_hash: hash,
        status,
    }))
}

// Events

#[derive(Debug, Serialize)]
pub struct EventView {
    pub id: String,
    pub title: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub attendees: usize,
    pub parsed: Option<TransferIntent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<Schedule>,
}

#[derive(Debug, Serialize)]
pub struct EventsResponse {
    pub success: bool,
    pub events: Vec<EventView>,
}

pub async fn list_events(State(state): State<AppState>) -> ApiResult<Json<EventsResponse>> {
    require_auth(&state)?;

    let config = state.monitor.config();
    let events = state
        .calendar
        .upcoming_events(config.max_events_per_poll)
        .await
        .map_err(ApiError::calendar)?;

    let now = Utc::now();
    let window = Duration::minutes(config.window_minutes);

    let events = events
        .into_iter()
        .map(|event| {
            let parsed = match (&event.title, event.start) {
                (Some(title), Some(start)) => parse_intent(title, start, &event.attendees),
                _ => None,
            };
            let schedule = parsed
                .as_ref()
                .map(|intent| Schedule::classify(intent.execute_at, now, window));

            EventView {
                id: event.id,
                title: event.title,
                start_time: event.start,
                attendees: event.attendees.len(),
                parsed,
                schedule,
            }
        })
        .collect();

    Ok(Json(EventsResponse {
        success: true,
        events,
    }))
}

#[derive(Debug, Deserialize)]
pub struct CreateEventRequest {
    pub summary: Option<String>,
    pub description: Option<String>,
    pub start: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct CreateEventResponse {
    pub success: bool,
    pub message: &'static str,
    pub event_id: String,
    pub event_url: String,
    pub summary: String,
    pub scheduled_time: DateTime<Utc>,
    pub parsed_transaction: Option<TransferIntent>,
}

pub async fn create_event(
    State(state): State<AppState>,
    Json(payload): Json<CreateEventRequest>,
) -> ApiResult<Json<CreateEventResponse>> {
    require_auth(&state)?;

    let (summary, start) = match (payload.summary, payload.start) {
        (Some(summary), Some(start)) => (summary, start),
        _ => return Err(ApiError::bad_request("Missing required fields: summary, start")),
    };

    let created = state
        .calendar
        .create_event(&summary, start, payload.description.as_deref())
        .await
        .map_err(ApiError::calendar)?;

    let parsed_transaction = parse_intent(&summary, start, &[]);
    if let Some(intent) = &parsed_transaction {
        tracing::info!(
            "Transaction detected in new event: {} {} to {}",
            intent.amount,
            intent.token,
            intent.recipient
        );
    }

    Ok(Json(CreateEventResponse {
        success: true,
        message: "Calendar event created successfully!",
        event_id: created.event_id,
        event_url: created.event_url,
        summary,
        scheduled_time: start,
        parsed_transaction,
    }))
}

#[derive(Debug, Serialize)]
pub struct ProcessEventsResponse {
    pub success: bool,
    pub processed_count: usize,
    pub timestamp: DateTime<Utc>,
}

pub async fn process_events(
    State(state): State<AppState>,
) -> ApiResult<Json<ProcessEventsResponse>> {
    require_auth(&state)?;

    let config = state.monitor.config();
    let events = state
        .calendar
        .upcoming_events(config.max_events_per_poll)
        .await
        .map_err(ApiError::calendar)?;

    let processed_count = events
        .iter()
        .filter_map(|event| match (&event.title, event.start) {
            (Some(title), Some(start)) => parse_intent(title, start, &event.attendees),
            _ => None,
        })
        .count();

    Ok(Json(ProcessEventsResponse {
        success: true,
        processed_count,
        timestamp: Utc::now(),
    }))
}

// Transactions

fn default_amount() -> String {
    "0.001".to_string()
}

fn default_token() -> String {
    "APT".to_string()
}

fn default_recipient() -> String {
    "0x1".to_string()
}

fn default_execute_now() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct DemoTransactionRequest {
    #[serde(default = "default_amount")]
    pub amount: String,
    #[serde(default = "default_token")]
    pub token: String,
    #[serde(default = "default_recipient")]
    pub recipient: String,
    #[serde(default = "default_execute_now")]
    pub execute_now: bool,
}

#[derive(Debug, Serialize)]
pub struct DemoExecutedResponse {
    pub success: bool,
    pub message: &'static str,
    pub tx_hash: String,
    pub explorer_url: String,
    pub amount: String,
    pub token: String,
    pub recipient: String,
}

#[derive(Debug, Serialize)]
pub struct DemoScheduledResponse {
    pub success: bool,
    pub message: &'static str,
    pub event_id: String,
    pub execute_time: DateTime<Utc>,
}

/// Immediate transfer for demos, or a calendar event two minutes out
/// that the monitor will pick up.
pub async fn demo_transaction(
    State(state): State<AppState>,
    Json(payload): Json<DemoTransactionRequest>,
) -> ApiResult<Response> {
    require_auth(&state)?;

    tracing::info!(
        "Demo transaction request: {} {} to {}",
        payload.amount,
        payload.token,
        payload.recipient
    );

    if payload.execute_now {
        let tx_hash = state
            .wallet
            .submit_transfer(&payload.recipient, &payload.amount, &payload.token)
            .await
            .map_err(ApiError::wallet)?;

        return Ok(Json(DemoExecutedResponse {
            success: true,
            message: "Aptos transaction executed!",
            explorer_url: explorer_txn_url(&tx_hash),
            tx_hash,
            amount: payload.amount,
            token: payload.token,
            recipient: payload.recipient,
        })
        .into_response());
    }

    let execute_time = Utc::now() + Duration::minutes(2);
    let title = format!(
        "Send {} {} to {}",
        payload.amount, payload.token, payload.recipient
    );
    let created = state
        .calendar
        .create_event(
            &title,
            execute_time,
            Some("Demo Aptos transaction created via CalendeFi"),
        )
        .await
        .map_err(ApiError::calendar)?;

    Ok(Json(DemoScheduledResponse {
        success: true,
        message: "Demo Aptos transaction scheduled!",
        event_id: created.event_id,
        execute_time,
    })
    .into_response())
}

// Monitoring

#[derive(Debug, Serialize)]
pub struct StartMonitoringResponse {
    pub success: bool,
    pub message: &'static str,
    pub is_monitoring: bool,
}

pub async fn start_monitoring(
    State(state): State<AppState>,
) -> ApiResult<Json<StartMonitoringResponse>> {
    require_auth(&state)?;

    let message = if state.monitor.start() {
        "Calendar monitoring started successfully"
    } else {
        "Calendar monitoring already running"
    };

    Ok(Json(StartMonitoringResponse {
        success: true,
        message,
        is_monitoring: state.monitor.is_running(),
    }))
}

#[derive(Debug, Serialize)]
pub struct CheckNowResponse {
    pub success: bool,
    #[serde(flatten)]
    pub report: TickReport,
    pub timestamp: DateTime<Utc>,
}

pub async fn check_calendar_now(
    State(state): State<AppState>,
) -> ApiResult<Json<CheckNowResponse>> {
    require_auth(&state)?;

    tracing::info!("Manual calendar check requested");
    let report = state.monitor.run_tick().await.map_err(ApiError::calendar)?;

    Ok(Json(CheckNowResponse {
        success: true,
        report,
        timestamp: Utc::now(),
    }))
}
