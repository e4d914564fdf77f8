//! HTTP Gateway
//!
//! JSON API over the banking core. Amounts cross the wire as decimal
//! strings; the money module converts to and from minor units.
//!
//! The account and history endpoints are the read-only surface consumed
//! by the (external) presentation layer; they never mutate balances.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::{Extension, Json, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::bank::Bank;
use crate::config::AppConfig;
use crate::money::{self, MoneyError};
use crate::transfer::{TransferError, TransferId, TransferRecord, TransferRequest};

/// Shared state for all handlers
struct AppState {
    bank: Bank,
    decimals: u32,
    request_timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct TransferReq {
    sender: String,
    receiver: String,
    /// Decimal string, e.g. "300.00" - never a float
    amount: String,
    /// Client idempotency token
    #[serde(default)]
    cid: Option<String>,
}

#[derive(Debug, Serialize)]
struct TransferResp {
    status: String,
    transfer_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    sender_balance_after: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    receiver_balance_after: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    failure_reason: Option<String>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error_code: String,
    message: String,
}

#[derive(Debug, Serialize)]
struct AccountResp {
    account_no: String,
    owner: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<String>,
    routing: String,
    balance: String,
}

#[derive(Debug, Serialize)]
struct RecordResp {
    transfer_id: String,
    sender: String,
    receiver: String,
    amount: String,
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    failure_reason: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl RecordResp {
    fn from_record(record: &TransferRecord, decimals: u32) -> Self {
        Self {
            transfer_id: record.transfer_id.to_string(),
            sender: record.sender.clone(),
            receiver: record.receiver.clone(),
            amount: money::format_amount(record.amount, decimals),
            status: record.status.as_str().to_string(),
            failure_reason: record.error.clone(),
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

fn error_response(status: StatusCode, code: &str, message: String) -> axum::response::Response {
    (
        status,
        Json(ErrorBody {
            error_code: code.to_string(),
            message,
        }),
    )
        .into_response()
}

fn transfer_error_response(e: &TransferError) -> axum::response::Response {
    let status =
        StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    error_response(status, e.code(), e.to_string())
}

fn money_error_response(e: &MoneyError) -> axum::response::Response {
    let code = match e {
        MoneyError::PrecisionOverflow { .. } => "PRECISION_OVERFLOW",
        MoneyError::InvalidAmount => "INVALID_AMOUNT",
        MoneyError::Overflow => "OVERFLOW",
        MoneyError::InvalidFormat(_) => "INVALID_FORMAT",
    };
    error_response(StatusCode::BAD_REQUEST, code, e.to_string())
}

/// POST /api/v1/transfer
async fn handle_transfer(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<TransferReq>,
) -> impl IntoResponse {
    let amount = match money::parse_amount(&payload.amount, state.decimals) {
        Ok(v) => v,
        Err(e) => return money_error_response(&e),
    };

    let req = TransferRequest {
        sender: payload.sender,
        receiver: payload.receiver,
        amount,
        cid: payload.cid,
    };

    // The timeout can only fire while the transfer waits for account
    // locks; once the atomic apply starts the submit future no longer
    // suspends, so an abandoned request never leaves half a transfer.
    let submitted = tokio::time::timeout(state.request_timeout, state.bank.service().submit(req));

    match submitted.await {
        Err(_) => error_response(
            StatusCode::GATEWAY_TIMEOUT,
            "TIMEOUT",
            "transfer timed out waiting for account locks; no funds moved".to_string(),
        ),
        Ok(Err(e)) => transfer_error_response(&e),
        Ok(Ok(outcome)) => Json(TransferResp {
            status: outcome.status,
            transfer_id: outcome.transfer_id,
            sender_balance_after: outcome
                .sender_balance_after
                .map(|v| money::format_amount(v, state.decimals)),
            receiver_balance_after: outcome
                .receiver_balance_after
                .map(|v| money::format_amount(v, state.decimals)),
            failure_reason: outcome.failure_reason,
        })
        .into_response(),
    }
}

/// GET /api/v1/transfer/{id}
async fn get_transfer(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let transfer_id: TransferId = match id.parse() {
        Ok(id) => id,
        Err(_) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "INVALID_TRANSFER_ID",
                format!("not a transfer id: {}", id),
            );
        }
    };

    match state.bank.service().get(transfer_id) {
        Some(record) => Json(RecordResp::from_record(&record, state.decimals)).into_response(),
        None => transfer_error_response(&TransferError::TransferNotFound(id)),
    }
}

/// GET /api/v1/account/{account_no}
async fn get_account(
    Extension(state): Extension<Arc<AppState>>,
    Path(account_no): Path<String>,
) -> impl IntoResponse {
    match state.bank.store().get(&account_no).await {
        Ok(view) => Json(AccountResp {
            account_no: view.account_no,
            owner: view.owner,
            email: view.email,
            routing: view.routing,
            balance: money::format_amount(view.balance_minor, state.decimals),
        })
        .into_response(),
        Err(e) => error_response(StatusCode::NOT_FOUND, "ACCOUNT_NOT_FOUND", e.to_string()),
    }
}

/// GET /api/v1/account/{account_no}/transfers
async fn get_account_transfers(
    Extension(state): Extension<Arc<AppState>>,
    Path(account_no): Path<String>,
) -> impl IntoResponse {
    if !state.bank.store().exists(&account_no) {
        return error_response(
            StatusCode::NOT_FOUND,
            "ACCOUNT_NOT_FOUND",
            format!("Account not found: {}", account_no),
        );
    }

    let records: Vec<RecordResp> = state
        .bank
        .service()
        .history(&account_no)
        .iter()
        .map(|r| RecordResp::from_record(r, state.decimals))
        .collect();
    Json(records).into_response()
}

/// GET /api/v1/accounts - customer directory (recipient picker)
async fn list_accounts(Extension(state): Extension<Arc<AppState>>) -> impl IntoResponse {
    let accounts: Vec<AccountResp> = state
        .bank
        .store()
        .list()
        .await
        .into_iter()
        .map(|view| AccountResp {
            account_no: view.account_no,
            owner: view.owner,
            email: view.email,
            routing: view.routing,
            balance: money::format_amount(view.balance_minor, state.decimals),
        })
        .collect();
    Json(accounts).into_response()
}

/// Build the API router over an opened bank.
pub fn router(bank: Bank, config: &AppConfig) -> Router {
    let state = Arc::new(AppState {
        bank,
        decimals: config.currency_decimals,
        request_timeout: Duration::from_millis(config.gateway.request_timeout_ms),
    });

    Router::new()
        .route("/api/v1/transfer", post(handle_transfer))
        .route("/api/v1/transfer/{id}", get(get_transfer))
        .route("/api/v1/account/{account_no}", get(get_account))
        .route(
            "/api/v1/account/{account_no}/transfers",
            get(get_account_transfers),
        )
        .route("/api/v1/accounts", get(list_accounts))
        .route("/healthz", get(healthz))
        .layer(Extension(state))
}

/// GET /healthz
async fn healthz(Extension(state): Extension<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "accounts": state.bank.store().len(),
        "transfers": state.bank.log().len(),
    }))
}

/// Serve the gateway until the process is stopped.
pub async fn serve(bank: Bank, config: &AppConfig) -> anyhow::Result<()> {
    let app = router(bank, config);

    let addr: SocketAddr = format!("{}:{}", config.gateway.host, config.gateway.port).parse()?;
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %listener.local_addr()?, "gateway listening");

    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}
