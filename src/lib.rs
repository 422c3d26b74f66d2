mod page;
mod routes;

pub mod app;
pub mod class_binding;
pub mod config;
pub mod error;
pub mod model_service;
pub mod ort_service;
pub mod prediction;
pub mod preprocess;
pub mod server;
pub mod telemetry;
pub mod upload;

pub use app::start_app;
pub use routes::HealthStatus;
