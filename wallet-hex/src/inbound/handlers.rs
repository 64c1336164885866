//! HTTP request handlers.

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};

use wallet_types::{
    AppError, CreateWalletRequest, DepositRequest, HistoryQuery, LedgerStore, OperationResponse,
    OwnerId, TransactionResponse, TransferRequest, UpdateWalletRequest, WalletId, WalletResponse,
    WithdrawRequest,
};

use crate::service::{Movement, WalletService};

/// Application state shared across handlers.
pub struct AppState<S: LedgerStore> {
    pub service: WalletService<S>,
}

/// Wrapper to implement IntoResponse for AppError (orphan rule workaround).
#[derive(Debug)]
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            AppError::ValidationFailed(_) | AppError::CurrencyNotAllowed(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::WalletNotFound(_) | AppError::OwnerNotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::InsufficientFunds(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::ConversionFailed(_) => StatusCode::BAD_GATEWAY,
            AppError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self.0 {
            AppError::Internal(detail) => {
                tracing::error!(error = %detail, "Internal error");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = serde_json::json!({
            "error": message,
            "code": status.as_u16()
        });

        (status, Json(body)).into_response()
    }
}

fn parse_wallet_id(id: &str) -> Result<WalletId, ApiError> {
    id.parse()
        .map_err(|_| ApiError(AppError::ValidationFailed("Invalid wallet ID".into())))
}

fn operation_response(movement: Movement) -> OperationResponse {
    OperationResponse {
        transaction: movement.transaction.into(),
        wallet: movement.wallet.into(),
    }
}

/// Health check endpoint.
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "healthy" }))
}

// ─────────────────────────────────────────────────────────────────────────────
// Owners & wallets
// ─────────────────────────────────────────────────────────────────────────────

/// Register the calling principal.
#[tracing::instrument(skip(state))]
pub async fn register_owner<S: LedgerStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(owner): Extension<OwnerId>,
) -> Result<impl IntoResponse, ApiError> {
    state.service.register_owner(owner).await?;
    Ok(Json(serde_json::json!({ "owner": owner })))
}

#[tracing::instrument(skip(state, req))]
pub async fn create_wallet<S: LedgerStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(owner): Extension<OwnerId>,
    Json(req): Json<CreateWalletRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let wallet = state.service.create_wallet(owner, req).await?;
    Ok((StatusCode::CREATED, Json(WalletResponse::from(wallet))))
}

#[tracing::instrument(skip(state), fields(wallet_id = %id))]
pub async fn get_wallet<S: LedgerStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(owner): Extension<OwnerId>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let wallet_id = parse_wallet_id(&id)?;
    let wallet = state.service.get_wallet(owner, wallet_id).await?;
    Ok(Json(WalletResponse::from(wallet)))
}

#[tracing::instrument(skip(state, req), fields(wallet_id = %id))]
pub async fn update_wallet<S: LedgerStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(owner): Extension<OwnerId>,
    Path(id): Path<String>,
    Json(req): Json<UpdateWalletRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let wallet_id = parse_wallet_id(&id)?;
    let wallet = state.service.update_wallet(owner, wallet_id, req).await?;
    Ok(Json(WalletResponse::from(wallet)))
}

#[tracing::instrument(skip(state), fields(wallet_id = %id))]
pub async fn delete_wallet<S: LedgerStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(owner): Extension<OwnerId>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let wallet_id = parse_wallet_id(&id)?;
    state.service.delete_wallet(owner, wallet_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// List history of a wallet.
#[tracing::instrument(skip(state, query), fields(wallet_id = %id))]
pub async fn list_transactions<S: LedgerStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(owner): Extension<OwnerId>,
    Path(id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let wallet_id = parse_wallet_id(&id)?;
    let transactions = state
        .service
        .list_transactions(owner, wallet_id, query)
        .await?;
    let body: Vec<TransactionResponse> = transactions.into_iter().map(Into::into).collect();
    Ok(Json(body))
}

// ─────────────────────────────────────────────────────────────────────────────
// Money movement
// ─────────────────────────────────────────────────────────────────────────────

/// Deposit money into a wallet.
#[tracing::instrument(skip(state, req), fields(wallet_id = %req.wallet_id, amount = req.amount))]
pub async fn deposit<S: LedgerStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(owner): Extension<OwnerId>,
    Json(req): Json<DepositRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let movement = state.service.deposit(owner, req).await?;
    Ok(Json(operation_response(movement)))
}

/// Withdraw money from a wallet.
#[tracing::instrument(skip(state, req), fields(wallet_id = %req.wallet_id, amount = req.amount))]
pub async fn withdraw<S: LedgerStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(owner): Extension<OwnerId>,
    Json(req): Json<WithdrawRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let movement = state.service.withdraw(owner, req).await?;
    Ok(Json(operation_response(movement)))
}

/// Transfer money between wallets.
#[tracing::instrument(skip(state, req), fields(from = %req.from_wallet_id, to = %req.to_wallet_id, amount = req.amount))]
pub async fn transfer<S: LedgerStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(owner): Extension<OwnerId>,
    Json(req): Json<TransferRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let movement = state.service.transfer(owner, req).await?;
    Ok(Json(operation_response(movement)))
}
