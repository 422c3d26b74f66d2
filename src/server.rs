use crate::{
    config::ServerConfig, model_service::ModelService, routes::api_routes, telemetry::Metrics,
    upload::{UploadStore, PUBLIC_UPLOAD_PATH},
};
use axum::{extract::DefaultBodyLimit, Router};
use axum_otel_metrics::HttpMetricsLayerBuilder;
use std::{net::SocketAddr, sync::Arc};
use tokio::{net::TcpListener, sync::broadcast::Receiver, task::JoinHandle};
use tower_http::{services::ServeDir, trace::TraceLayer};

/// Room for multipart boundaries and headers on top of the file size limit.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub struct SharedState<M: ModelService> {
    /// `None` when the weight file was missing or failed to load.
    pub model: Option<Arc<M>>,
    pub uploads: Arc<UploadStore>,
    pub metrics: Arc<Metrics>,
    pub debug: bool,
}

impl<M: ModelService> Clone for SharedState<M> {
    fn clone(&self) -> Self {
        Self {
            model: self.model.clone(),
            uploads: self.uploads.clone(),
            metrics: self.metrics.clone(),
            debug: self.debug,
        }
    }
}

impl<M: ModelService> SharedState<M> {
    pub fn new(model: Option<M>, uploads: UploadStore, metrics: Arc<Metrics>, debug: bool) -> Self {
        Self {
            model: model.map(Arc::new),
            uploads: Arc::new(uploads),
            metrics,
            debug,
        }
    }

    pub fn model_loaded(&self) -> bool {
        self.model.is_some()
    }
}

pub struct HttpServer {
    router: Router,
    listener: TcpListener,
}

impl HttpServer {
    pub async fn new<M: ModelService>(
        state: SharedState<M>,
        config: &ServerConfig,
    ) -> anyhow::Result<Self> {
        let addr = config.get_address();

        let body_limit = state.uploads.max_bytes() + MULTIPART_OVERHEAD;
        let uploads_dir = ServeDir::new(state.uploads.dir());
        let metrics_layer = HttpMetricsLayerBuilder::new().build();

        let router = api_routes::<M>()
            .nest_service(&format!("/{}", PUBLIC_UPLOAD_PATH), uploads_dir)
            .with_state(state)
            .layer(DefaultBodyLimit::max(body_limit))
            .layer(TraceLayer::new_for_http())
            .layer(metrics_layer);

        let listener = TcpListener::bind(addr).await?;

        Ok(Self { router, listener })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub async fn run(
        self,
        shutdown_rx: Receiver<()>,
    ) -> anyhow::Result<JoinHandle<anyhow::Result<()>>> {
        tracing::info!("Starting app on {}", self.local_addr()?);

        let listener = self.listener;
        let router = self.router;
        let server_handle = tokio::spawn({
            let mut shutdown_rx = shutdown_rx.resubscribe();
            async move {
                axum::serve(listener, router)
                    .with_graceful_shutdown(async move {
                        shutdown_rx.recv().await.ok();
                    })
                    .await?;
                Ok(())
            }
        });

        Ok(server_handle)
    }
}
