use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use crate::application::services::ledger_service::StockLedgerService;
use crate::domain::entities::movement::{
    AdjustmentMetadata, MovementType, MovementUpdate, NewStockMovement, StockMovement,
};
use crate::domain::entities::order::Order;
use crate::domain::entities::reconciliation::{StockReconciliation, StockReconciliationSummary};
use crate::domain::errors::LedgerError;
use crate::domain::services::duplicate_cleaner::CleanupResult;
use crate::domain::services::order_translator::{IncrementalSyncResult, OrderBatchResult};
use crate::domain::services::summary_cache::CacheStats;
use crate::domain::services::summary_generator::SummaryBatch;

pub type LedgerState = State<Arc<StockLedgerService>>;

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

fn error_response(err: LedgerError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match &err {
        LedgerError::Validation(_) => StatusCode::BAD_REQUEST,
        LedgerError::NotFound { .. } => StatusCode::NOT_FOUND,
        LedgerError::Upstream(_) => {
            warn!("Request failed upstream: {}", err);
            StatusCode::BAD_GATEWAY
        }
    };
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
}

/// Filters for movement listing. `sku` wins when both are given.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct MovementQuery {
    pub sku: Option<String>,
    #[serde(rename = "type")]
    pub movement_type: Option<MovementType>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreatedResponse {
    pub id: i64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SummaryQuery {
    /// Bypass the cached summary set
    #[serde(default)]
    pub refresh: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshRequest {
    pub skus: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReconciliationRequest {
    pub sku: String,
    pub actual_quantity: i64,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NotesRequest {
    pub notes: Option<String>,
}

pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

// Movements

pub async fn create_movement(
    State(service): LedgerState,
    Json(movement): Json<NewStockMovement>,
) -> Result<(StatusCode, Json<CreatedResponse>), (StatusCode, Json<ErrorResponse>)> {
    let id = service.add_movement(movement).await.map_err(error_response)?;
    Ok((StatusCode::CREATED, Json(CreatedResponse { id })))
}

pub async fn list_movements(
    State(service): LedgerState,
    Query(query): Query<MovementQuery>,
) -> ApiResult<Vec<StockMovement>> {
    let movements = match (query.sku, query.movement_type) {
        (Some(sku), _) => service.get_movements_by_sku(&sku).await,
        (None, Some(movement_type)) => service.get_movements_by_type(movement_type).await,
        (None, None) => service.get_all_movements().await,
    }
    .map_err(error_response)?;
    Ok(Json(movements))
}

pub async fn get_movement(
    State(service): LedgerState,
    Path(id): Path<i64>,
) -> ApiResult<StockMovement> {
    service
        .get_movement(id)
        .await
        .map(Json)
        .map_err(error_response)
}

pub async fn update_movement(
    State(service): LedgerState,
    Path(id): Path<i64>,
    Json(update): Json<MovementUpdate>,
) -> ApiResult<StockMovement> {
    service
        .update_movement(id, update)
        .await
        .map(Json)
        .map_err(error_response)
}

pub async fn delete_movement(
    State(service): LedgerState,
    Path(id): Path<i64>,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    service.delete_movement(id).await.map_err(error_response)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_adjustment_metadata(
    State(service): LedgerState,
    Path(id): Path<i64>,
) -> ApiResult<Option<AdjustmentMetadata>> {
    service
        .get_adjustment_metadata(id)
        .await
        .map(Json)
        .map_err(error_response)
}

// Summaries

pub async fn list_summaries(
    State(service): LedgerState,
    Query(query): Query<SummaryQuery>,
) -> Json<Vec<StockReconciliationSummary>> {
    Json(service.generate_all_summaries(query.refresh).await)
}

pub async fn get_summary(
    State(service): LedgerState,
    Path(sku): Path<String>,
) -> Json<StockReconciliationSummary> {
    Json(service.generate_summary(&sku).await)
}

pub async fn refresh_summaries(
    State(service): LedgerState,
    Json(request): Json<RefreshRequest>,
) -> Json<SummaryBatch> {
    Json(service.refresh_skus(&request.skus).await)
}

// Reconciliations

pub async fn create_reconciliation(
    State(service): LedgerState,
    Json(request): Json<ReconciliationRequest>,
) -> Result<(StatusCode, Json<StockReconciliation>), (StatusCode, Json<ErrorResponse>)> {
    let reconciliation = service
        .perform_reconciliation(&request.sku, request.actual_quantity, request.notes)
        .await
        .map_err(error_response)?;
    Ok((StatusCode::CREATED, Json(reconciliation)))
}

pub async fn list_reconciliations(
    State(service): LedgerState,
    Path(sku): Path<String>,
) -> ApiResult<Vec<StockReconciliation>> {
    service
        .get_reconciliations(&sku)
        .await
        .map(Json)
        .map_err(error_response)
}

pub async fn get_latest_reconciliation(
    State(service): LedgerState,
    Path(sku): Path<String>,
) -> ApiResult<StockReconciliation> {
    match service
        .get_latest_reconciliation(&sku)
        .await
        .map_err(error_response)?
    {
        Some(reconciliation) => Ok(Json(reconciliation)),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("No reconciliation recorded for {}", sku),
            }),
        )),
    }
}

pub async fn update_reconciliation_notes(
    State(service): LedgerState,
    Path(id): Path<i64>,
    Json(request): Json<NotesRequest>,
) -> ApiResult<StockReconciliation> {
    service
        .update_reconciliation_notes(id, request.notes)
        .await
        .map(Json)
        .map_err(error_response)
}

// Maintenance

pub async fn cleanup_duplicates(
    State(service): LedgerState,
    Path(movement_type): Path<String>,
) -> ApiResult<CleanupResult> {
    let movement_type: MovementType = movement_type.parse().map_err(error_response)?;
    Ok(Json(service.cleanup_duplicates(movement_type).await))
}

pub async fn invalidate_cache(State(service): LedgerState) -> StatusCode {
    service.invalidate_cache().await;
    StatusCode::NO_CONTENT
}

pub async fn cache_stats(State(service): LedgerState) -> Json<CacheStats> {
    Json(service.cache_stats().await)
}

// Orders

pub async fn process_orders(
    State(service): LedgerState,
    Json(orders): Json<Vec<Order>>,
) -> Json<OrderBatchResult> {
    Json(service.process_orders(&orders).await)
}

pub async fn sync_orders(State(service): LedgerState) -> ApiResult<IncrementalSyncResult> {
    service
        .sync_new_orders()
        .await
        .map(Json)
        .map_err(error_response)
}
