use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct LoadResponse {
    /// Admission load in percent; 100 or more means submissions are refused.
    pub load: f64,
}

/// GET /api/v1/load
pub async fn get_load(State(state): State<AppState>) -> Json<DataResponse<LoadResponse>> {
    let load = state.orchestrator.current_load().await;
    Json(DataResponse {
        data: LoadResponse {
            load: round2(load),
        },
    })
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
