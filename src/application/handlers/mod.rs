pub mod ledger_handler;

use axum::{
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::application::services::ledger_service::StockLedgerService;
use ledger_handler::*;

/// HTTP surface of the ledger
pub fn router(service: Arc<StockLedgerService>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/movements", get(list_movements).post(create_movement))
        .route(
            "/movements/:id",
            get(get_movement)
                .patch(update_movement)
                .delete(delete_movement),
        )
        .route("/movements/:id/metadata", get(get_adjustment_metadata))
        .route("/summaries", get(list_summaries))
        .route("/summaries/refresh", post(refresh_summaries))
        .route("/summaries/:sku", get(get_summary))
        .route("/reconciliations", post(create_reconciliation))
        .route("/reconciliations/:id/notes", patch(update_reconciliation_notes))
        .route("/skus/:sku/reconciliations", get(list_reconciliations))
        .route(
            "/skus/:sku/reconciliations/latest",
            get(get_latest_reconciliation),
        )
        .route("/maintenance/duplicates/:movement_type", post(cleanup_duplicates))
        .route("/cache/stats", get(cache_stats))
        .route("/cache/invalidate", post(invalidate_cache))
        .route("/orders", post(process_orders))
        .route("/orders/sync", post(sync_orders))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}
