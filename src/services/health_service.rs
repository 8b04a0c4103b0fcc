use tracing::warn;

use crate::{
    dto::health::{HealthResponse, StorageHealth},
    state::SharedState,
};

/// Probe storage and summarise the live state, logging connectivity issues.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    let storage = match state.require_store().await {
        Ok(store) => match store.health_check().await {
            Ok(()) => StorageHealth::Ok,
            Err(err) => {
                warn!(error = %err, "storage health check failed");
                StorageHealth::Unreachable
            }
        },
        Err(_) => {
            warn!("storage unavailable (degraded mode)");
            StorageHealth::Missing
        }
    };

    HealthResponse::new(
        state.is_degraded(),
        storage,
        state.boards().list().len(),
        state.engine().list_active_states().await.len(),
        state.sse().subscriber_count(),
    )
}
