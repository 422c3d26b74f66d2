use crate::{error::PredictError, prediction::Prediction};
use image::DynamicImage;

/// Classifies a decoded image into one of the two chest X-ray classes.
///
/// Implementations are shared read-only across requests and called from blocking threads.
pub trait ModelService: Send + Sync + 'static {
    fn classify(&self, image: &DynamicImage) -> Result<Prediction, PredictError>;
}
