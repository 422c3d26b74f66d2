use crate::{
    config::{Config, ModelConfig},
    ort_service::{ModelError, OrtModelService},
    server::{HttpServer, SharedState},
    telemetry::Metrics,
    upload::UploadStore,
};
use std::{error::Error, sync::Arc};
use tokio::{signal, sync::broadcast};

/// Loads the classifier, degrading to "not loaded" unless the model is required.
pub fn load_model(model_config: &ModelConfig) -> Result<Option<OrtModelService>, ModelError> {
    match OrtModelService::new(model_config) {
        Ok(service) => {
            tracing::info!("Model loaded successfully");
            Ok(Some(service))
        }
        Err(e) if model_config.required => {
            tracing::error!("Error loading model: {}", e);
            Err(e)
        }
        Err(e) => {
            tracing::error!("Error loading model, predictions are disabled: {}", e);
            Ok(None)
        }
    }
}

pub async fn start_app(config: Config) -> Result<(), Box<dyn Error>> {
    let metrics = Arc::new(Metrics::new()?);

    let model = match tokio::task::block_in_place(|| load_model(&config.model)) {
        Ok(model) => model,
        Err(e) => return Err(Box::new(e)),
    };

    let uploads = match UploadStore::new(&config.upload).await {
        Ok(store) => store,
        Err(e) => {
            tracing::error!("Failed to prepare upload directory {:?}: {:?}", config.upload.dir, e);
            return Err(Box::new(e));
        }
    };

    let state = SharedState::new(model, uploads, metrics, config.server.debug);
    let server = HttpServer::new(state, &config.server).await?;

    let (shutdown_tx, _) = broadcast::channel(1);
    let server_shutdown_rx = shutdown_tx.subscribe();

    let server_handle = server.run(server_shutdown_rx).await?;

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, starting graceful shutdown.");

    let _ = shutdown_tx.send(());
    server_handle.await??;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ort_service::fixtures::{identity_model, model_config};
    use std::path::PathBuf;

    #[test]
    fn test_missing_model_degrades_when_optional() {
        let config = model_config(PathBuf::from("./no/such/model"));
        assert!(matches!(load_model(&config), Ok(None)));
    }

    #[test]
    fn test_missing_model_aborts_when_required() {
        let mut config = model_config(PathBuf::from("./no/such/model"));
        config.required = true;
        assert!(matches!(load_model(&config), Err(ModelError::Config(_))));
    }

    #[test]
    fn test_mismatched_output_name_degrades() -> Result<(), Box<dyn std::error::Error>> {
        let temp = tempfile::tempdir()?;
        std::fs::write(
            temp.path().join("pneumonia_model.onnx"),
            identity_model("logits"),
        )?;

        let config = model_config(temp.path().to_path_buf());
        assert!(matches!(load_model(&config), Ok(None)));
        Ok(())
    }
}
