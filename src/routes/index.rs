use crate::{model_service::ModelService, page::IndexPage, server::SharedState};
use axum::extract::State;

pub async fn index<M: ModelService>(State(state): State<SharedState<M>>) -> IndexPage {
    state.metrics.record_request("/");
    IndexPage::form()
}
