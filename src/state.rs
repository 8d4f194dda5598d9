// file: state.rs
// desc: loading / error / result state rendered by the page

use crate::error::ClassifierError;
use crate::inference::Prediction;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UiState {
    pub is_loading: bool,
    pub error: Option<String>,
    pub prediction: Option<Prediction>,
}

impl UiState {
    /// State while the model is being fetched at page start.
    pub fn loading() -> Self {
        Self {
            is_loading: true,
            ..Self::default()
        }
    }

    pub fn model_ready(&mut self) {
        self.is_loading = false;
    }

    pub fn begin(&mut self) {
        self.is_loading = true;
    }

    pub fn succeed(&mut self, prediction: Prediction) {
        self.is_loading = false;
        self.error = None;
        self.prediction = Some(prediction);
    }

    /// Keeps the last prediction on screen.
    pub fn fail(&mut self, err: &ClassifierError) {
        self.is_loading = false;
        self.error = Some(err.user_message().to_string());
    }
}
