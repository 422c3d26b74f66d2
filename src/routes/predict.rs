use crate::{
    error::PredictError,
    model_service::ModelService,
    page::IndexPage,
    prediction::Prediction,
    preprocess::load_image,
    server::SharedState,
    upload::StoredUpload,
};
use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    response::{IntoResponse, Redirect, Response},
};
use bytes::Bytes;
use std::time::Instant;
use tracing::instrument;

const FILE_FIELD: &str = "file";

struct UploadedFile {
    file_name: String,
    data: Bytes,
}

enum Outcome {
    BackToForm,
    Predicted(Prediction, StoredUpload),
}

#[instrument(skip(state, multipart))]
pub async fn predict<M: ModelService>(
    State(state): State<SharedState<M>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    state.metrics.record_request("/predict");

    match handle_upload(&state, multipart).await {
        Ok(Outcome::BackToForm) => Redirect::to("/").into_response(),
        Ok(Outcome::Predicted(prediction, upload)) => {
            IndexPage::prediction(&prediction, &upload).into_response()
        }
        Err(err) => error_page(&state, err).into_response(),
    }
}

fn error_page<M: ModelService>(state: &SharedState<M>, err: PredictError) -> IndexPage {
    state.metrics.record_failure(err.kind());

    let status = err.status();
    if status.is_server_error() {
        tracing::error!(error = ?err, "Error during prediction: {}", err);
    } else {
        tracing::warn!("Rejected upload: {}", err);
    }

    let page = IndexPage::error(status, err.user_message());
    if state.debug {
        page.with_detail(err.to_string())
    } else {
        page
    }
}

async fn handle_upload<M: ModelService>(
    state: &SharedState<M>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Outcome, PredictError> {
    let model = state.model.clone().ok_or(PredictError::ModelUnavailable)?;

    let mut multipart = match multipart {
        Ok(multipart) => multipart,
        Err(rejection) => {
            tracing::warn!("No multipart body provided: {}", rejection);
            return Ok(Outcome::BackToForm);
        }
    };

    let Some(file) = read_file_field(&mut multipart).await? else {
        tracing::warn!("No file provided in request");
        return Ok(Outcome::BackToForm);
    };

    if file.file_name.is_empty() {
        tracing::warn!("Empty filename provided");
        return Ok(Outcome::BackToForm);
    }

    state.uploads.validate(&file.file_name, file.data.len())?;

    let stored = state.uploads.save(&file.file_name, &file.data).await?;
    state.metrics.record_upload(stored.size);
    tracing::info!("File uploaded: {}", stored.file_name);

    let started = Instant::now();
    let path = stored.path.clone();
    let prediction = tokio::task::spawn_blocking(move || {
        let image = load_image(&path)?;
        model.classify(&image)
    })
    .await
    .map_err(|e| PredictError::Inference(format!("inference task failed: {}", e)))??;

    let duration_ms = started.elapsed().as_millis() as u64;
    state
        .metrics
        .record_prediction(prediction.label.as_str(), duration_ms);
    tracing::info!(
        "Prediction: {} (Confidence: {}) in {} ms",
        prediction.label,
        prediction.format_confidence(),
        duration_ms
    );

    Ok(Outcome::Predicted(prediction, stored))
}

async fn read_file_field(multipart: &mut Multipart) -> Result<Option<UploadedFile>, PredictError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let data = field.bytes().await?;
        return Ok(Some(UploadedFile { file_name, data }));
    }
    Ok(None)
}
