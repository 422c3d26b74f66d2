use crate::{
    class_binding::{self, ClassBindingError},
    config::ModelConfig,
    error::PredictError,
    model_service::ModelService,
    prediction::Prediction,
    preprocess::{to_input_tensor, INPUT_SIZE},
};
use image::DynamicImage;
use ndarray::{Array, Ix4};
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::TensorRef,
};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Invalid model configuration: {0}")]
    Config(String),
    #[error("ONNX Runtime error: {0}")]
    Ort(#[from] ort::Error),
    #[error("Class binding check failed: {0}")]
    ClassBinding(#[from] ClassBindingError),
    #[error("Inference failed: {0}")]
    Inference(String),
}

#[derive(Clone)]
pub struct OrtModelService {
    sessions: Arc<Vec<Arc<Mutex<Session>>>>,
    counter: Arc<AtomicUsize>,
    output_name: String,
}

impl OrtModelService {
    pub fn new(model_config: &ModelConfig) -> Result<Self, ModelError> {
        model_config.validate().map_err(ModelError::Config)?;
        class_binding::verify_configured_labels(&model_config.class_labels)?;
        if let Some(dataset_dir) = &model_config.dataset_dir {
            class_binding::verify_dataset_layout(dataset_dir)?;
        }

        let num_instances = model_config.num_instances;
        let sessions = (0..num_instances)
            .map(|_| {
                let session = Session::builder()?
                    .with_optimization_level(GraphOptimizationLevel::Level3)?
                    .commit_from_file(model_config.get_path())?;
                Ok(Arc::new(Mutex::new(session)))
            })
            .collect::<Result<Vec<_>, ort::Error>>()?;

        tracing::info!(
            "Created {} ONNX sessions from {:?}",
            num_instances,
            model_config.get_path()
        );

        let service = Self {
            counter: Arc::new(AtomicUsize::new(0)),
            sessions: Arc::new(sessions),
            output_name: model_config.output_name.clone(),
        };
        service.warm_up()?;

        Ok(service)
    }

    /// Runs a zero input through every session and checks the output width.
    fn warm_up(&self) -> Result<(), ModelError> {
        let size = INPUT_SIZE as usize;
        let input = Array::<f32, Ix4>::zeros((1, 3, size, size));
        for _ in 0..self.sessions.len() {
            let logits = self.run_inference(&input)?;
            class_binding::verify_output_width(logits.len())?;
        }
        tracing::debug!("Model warm-up finished");
        Ok(())
    }

    pub fn run_inference(&self, input: &Array<f32, Ix4>) -> Result<Vec<f32>, ModelError> {
        let index = self.counter.fetch_add(1, Ordering::SeqCst) % self.sessions.len();
        let session_arc = &self.sessions[index];
        let mut session = session_arc
            .lock()
            .map_err(|e| ModelError::Inference(format!("session mutex poisoned: {}", e)))?;

        tracing::debug!("Handling request with session {}", index);
        let owned_buffer;
        let input_view = if input.view().is_standard_layout() {
            input.view()
        } else {
            owned_buffer = input.as_standard_layout().to_owned();
            owned_buffer.view()
        };

        let tensor_ref = TensorRef::from_array_view(input_view)?;
        let outputs = session.run(ort::inputs![tensor_ref])?;

        let output = outputs.get(self.output_name.as_str()).ok_or_else(|| {
            ModelError::Inference(format!("no output named `{}`", self.output_name))
        })?;
        let (_shape, data) = output.try_extract_tensor::<f32>()?;

        Ok(data.to_vec())
    }
}

impl ModelService for OrtModelService {
    fn classify(&self, image: &DynamicImage) -> Result<Prediction, PredictError> {
        let input = to_input_tensor(image);
        let logits = self
            .run_inference(&input)
            .map_err(|e| PredictError::Inference(e.to_string()))?;

        Prediction::from_logits(&logits).map_err(PredictError::Inference)
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::{identity_model, model_config};
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_missing_weight_file() {
        let result = OrtModelService::new(&model_config(PathBuf::from("./no/such/model")));
        assert!(matches!(result, Err(ModelError::Config(_))));
    }

    #[test]
    fn test_swapped_labels_are_rejected_before_loading() -> Result<(), Box<dyn std::error::Error>>
    {
        let temp = tempfile::tempdir()?;
        std::fs::write(temp.path().join("pneumonia_model.onnx"), b"not a model")?;

        let mut config = model_config(temp.path().to_path_buf());
        config.class_labels.reverse();

        let result = OrtModelService::new(&config);
        assert!(matches!(
            result,
            Err(ModelError::ClassBinding(ClassBindingError::ConfiguredLabels { .. }))
        ));
        Ok(())
    }

    #[test]
    fn test_corrupt_weight_file_fails_to_load() -> Result<(), Box<dyn std::error::Error>> {
        let temp = tempfile::tempdir()?;
        std::fs::write(temp.path().join("pneumonia_model.onnx"), b"not a model")?;

        let result = OrtModelService::new(&model_config(temp.path().to_path_buf()));
        assert!(matches!(result, Err(ModelError::Ort(_))));
        Ok(())
    }

    #[test]
    fn test_unknown_output_name_is_an_error() -> Result<(), Box<dyn std::error::Error>> {
        let temp = tempfile::tempdir()?;
        std::fs::write(
            temp.path().join("pneumonia_model.onnx"),
            identity_model("logits"),
        )?;

        let result = OrtModelService::new(&model_config(temp.path().to_path_buf()));
        match result {
            Err(ModelError::Inference(msg)) => assert!(msg.contains("no output named `output`")),
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("model with a mismatched output name loaded"),
        }
        Ok(())
    }

    #[test]
    fn test_wrong_output_width_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let temp = tempfile::tempdir()?;
        std::fs::write(
            temp.path().join("pneumonia_model.onnx"),
            identity_model("output"),
        )?;

        let result = OrtModelService::new(&model_config(temp.path().to_path_buf()));
        assert!(matches!(
            result,
            Err(ModelError::ClassBinding(ClassBindingError::OutputWidth(150528)))
        ));
        Ok(())
    }
}
