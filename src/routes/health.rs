use crate::{model_service::ModelService, server::SharedState};
use axum::{extract::State, response::IntoResponse, response::Json};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct HealthStatus {
    pub status: String,
    pub model_loaded: bool,
}

pub async fn healthcheck<M: ModelService>(
    State(state): State<SharedState<M>>,
) -> impl IntoResponse {
    state.metrics.record_request("/health");
    Json(HealthStatus {
        status: "ok".into(),
        model_loaded: state.model_loaded(),
    })
}
