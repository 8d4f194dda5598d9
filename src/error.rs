// file: error.rs
// desc: error kinds surfaced by model loading and prediction

use thiserror::Error;
use wasm_bindgen::JsValue;

#[derive(Debug, Error)]
pub enum ClassifierError {
    /// Fetching or decoding the model manifest or its weights failed.
    #[error("model load failed: {0}")]
    ModelLoad(String),

    /// Reading, decoding or classifying the uploaded image failed.
    #[error("prediction failed: {0}")]
    Prediction(String),
}

impl ClassifierError {
    /// Generic text shown on the page. The detailed cause only goes to the log.
    pub fn user_message(&self) -> &'static str {
        match self {
            ClassifierError::ModelLoad(_) => "Error loading the model",
            ClassifierError::Prediction(_) => "Error processing the image",
        }
    }

    pub(crate) fn model_load(err: impl std::fmt::Debug) -> Self {
        ClassifierError::ModelLoad(format!("{err:?}"))
    }

    pub(crate) fn prediction(err: impl std::fmt::Debug) -> Self {
        ClassifierError::Prediction(format!("{err:?}"))
    }
}

impl From<image::ImageError> for ClassifierError {
    fn from(err: image::ImageError) -> Self {
        ClassifierError::Prediction(err.to_string())
    }
}

// JsValue errors only show up around fetch and file reads, callers pick the kind.
pub(crate) fn js_error(err: JsValue) -> String {
    err.as_string().unwrap_or_else(|| format!("{err:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_messages_hide_the_cause() {
        let load = ClassifierError::ModelLoad("404 on /models/x.json".to_string());
        let predict = ClassifierError::Prediction("bad png header".to_string());

        assert_eq!(load.user_message(), "Error loading the model");
        assert_eq!(predict.user_message(), "Error processing the image");
        assert!(load.to_string().contains("404"));
        assert!(predict.to_string().contains("bad png header"));
    }

    #[test]
    fn image_errors_are_prediction_failures() {
        let err = image::load_from_memory(&[0u8; 4]).unwrap_err();
        assert!(matches!(ClassifierError::from(err), ClassifierError::Prediction(_)));
    }
}
