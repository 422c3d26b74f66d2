mod health;
mod index;
mod metrics;
mod predict;

use crate::{model_service::ModelService, server::SharedState};
use axum::{
    routing::{get, post},
    Router,
};

pub use health::HealthStatus;

pub fn api_routes<M: ModelService>() -> Router<SharedState<M>> {
    Router::new()
        .route("/", get(index::index::<M>))
        .route("/predict", post(predict::predict::<M>))
        .route("/health", get(health::healthcheck::<M>))
        .route("/metrics", get(metrics::metrics_handler::<M>))
}
