// file: inference.rs
// desc: run the classifier on an uploaded image and map the output to a label

use std::fmt;
use std::str::FromStr;

use burn::{backend::ndarray::NdArray, tensor::backend::Backend};

use crate::error::ClassifierError;
use crate::loader::{AssetSource, LoadedModel, load_model};
use crate::model::Classifier;
use crate::preprocess::{InputSpec, decode_image};

/// Backend the page runs inference on.
pub type PageBackend = NdArray<f32>;

/// Index i names output dimension i of the model.
pub const CLASS_NAMES: [&str; 5] = ["Butterfly", "Dragonfly", "Grasshopper", "Ladybird", "Mosquito"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    #[default]
    Label,
    Probabilities,
}

impl OutputMode {
    pub fn as_str(self) -> &'static str {
        match self {
            OutputMode::Label => "label",
            OutputMode::Probabilities => "probabilities",
        }
    }
}

impl FromStr for OutputMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "label" => Ok(OutputMode::Label),
            "probabilities" => Ok(OutputMode::Probabilities),
            other => Err(format!("unknown output mode: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Prediction {
    Label(String),
    Probabilities(Vec<f32>),
}

impl fmt::Display for Prediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prediction::Label(label) => write!(f, "{label}"),
            Prediction::Probabilities(values) => {
                write!(f, "[")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{value:.4}")?;
                }
                write!(f, "]")
            }
        }
    }
}

/// Index of the largest value. The first index wins ties and NaN never wins.
pub fn argmax(values: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &value) in values.iter().enumerate() {
        if value.is_nan() {
            continue;
        }
        match best {
            Some((_, current)) if value <= current => {}
            _ => best = Some((i, value)),
        }
    }
    best.map(|(i, _)| i)
}

pub fn label_for(index: usize) -> Option<&'static str> {
    CLASS_NAMES.get(index).copied()
}

/// Loaded model plus the input format it expects. Lives for the page session.
pub struct ImageClassifier<B: Backend> {
    model: Classifier<B>,
    input: InputSpec,
    device: B::Device,
}

impl<B: Backend> ImageClassifier<B> {
    pub fn new(model: Classifier<B>, input: InputSpec, device: B::Device) -> Self {
        if model.num_classes() != CLASS_NAMES.len() {
            log::warn!(
                "Model has {} outputs but the label table has {} entries",
                model.num_classes(),
                CLASS_NAMES.len()
            );
        }
        Self {
            model,
            input,
            device,
        }
    }

    pub async fn load<S: AssetSource>(
        source: &S,
        manifest_url: &str,
        device: &B::Device,
    ) -> Result<Self, ClassifierError> {
        let LoadedModel { model, input } = load_model::<B, S>(source, manifest_url, device).await?;
        log::info!(
            "Model loaded from {} ({}x{} input, {:?})",
            manifest_url,
            input.size,
            input.size,
            input.normalization
        );
        Ok(Self::new(model, input, device.clone()))
    }

    pub fn input(&self) -> InputSpec {
        self.input
    }

    /// Raw output vector of the model for an encoded image file.
    pub fn probabilities(&self, bytes: &[u8]) -> Result<Vec<f32>, ClassifierError> {
        let image = decode_image(bytes)?;
        let input = self.input.to_tensor::<B>(&image, &self.device);

        self.model
            .probabilities(input)
            .into_data()
            .to_vec::<f32>()
            .map_err(ClassifierError::prediction)
    }

    pub fn predict(&self, bytes: &[u8], mode: OutputMode) -> Result<Prediction, ClassifierError> {
        let probabilities = self.probabilities(bytes)?;
        log::debug!("Prediction vector: {:?}", probabilities);

        match mode {
            OutputMode::Probabilities => Ok(Prediction::Probabilities(probabilities)),
            OutputMode::Label => {
                let index = argmax(&probabilities).ok_or_else(|| {
                    ClassifierError::Prediction("model returned no usable output".to_string())
                })?;
                let label = label_for(index).ok_or_else(|| {
                    ClassifierError::Prediction(format!("no label for class index {index}"))
                })?;
                log::debug!("Predicted class {index}: {label}");
                Ok(Prediction::Label(label.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::tests::{serve_model, small_config};
    use crate::model::ClassifierConfig;
    use crate::preprocess::Normalization;
    use burn::backend::ndarray::NdArray;
    use futures::executor::block_on;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    type TestBackend = NdArray<f32>;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let image = RgbImage::from_fn(width, height, |x, y| Rgb([(x * 8) as u8, (y * 8) as u8, 128]));
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(image)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn classifier(config: &ClassifierConfig) -> ImageClassifier<TestBackend> {
        let device = Default::default();
        let input = InputSpec {
            size: 32,
            normalization: Normalization::UnitRange,
        };
        ImageClassifier::new(config.init(&device), input, device)
    }

    #[test]
    fn argmax_picks_largest() {
        assert_eq!(argmax(&[0.1, 0.7, 0.2]), Some(1));
        assert_eq!(argmax(&[-3.0, -1.0, -2.0]), Some(1));
    }

    #[test]
    fn argmax_first_index_wins_ties() {
        assert_eq!(argmax(&[0.4, 0.1, 0.4]), Some(0));
    }

    #[test]
    fn argmax_skips_nan() {
        assert_eq!(argmax(&[f32::NAN, 0.2, 0.1]), Some(1));
        assert_eq!(argmax(&[f32::NAN, f32::NAN]), None);
        assert_eq!(argmax(&[]), None);
    }

    #[test]
    fn labels_follow_table_order() {
        assert_eq!(label_for(0), Some("Butterfly"));
        assert_eq!(label_for(3), Some("Ladybird"));
        assert_eq!(label_for(4), Some("Mosquito"));
        assert_eq!(label_for(5), None);
    }

    #[test]
    fn output_mode_parses_selector_values() {
        assert_eq!("label".parse::<OutputMode>(), Ok(OutputMode::Label));
        assert_eq!("probabilities".parse::<OutputMode>(), Ok(OutputMode::Probabilities));
        assert!("softmax".parse::<OutputMode>().is_err());
        assert_eq!(OutputMode::Probabilities.as_str(), "probabilities");
    }

    #[test]
    fn prediction_display() {
        assert_eq!(Prediction::Label("Dragonfly".into()).to_string(), "Dragonfly");
        assert_eq!(
            Prediction::Probabilities(vec![0.5, 0.25, 0.125]).to_string(),
            "[0.5000, 0.2500, 0.1250]"
        );
    }

    #[test]
    fn label_matches_argmax_of_output() {
        let classifier = classifier(&small_config());
        let bytes = png(20, 12);

        let probabilities = classifier.probabilities(&bytes).unwrap();
        let prediction = classifier.predict(&bytes, OutputMode::Label).unwrap();

        let index = argmax(&probabilities).unwrap();
        assert_eq!(prediction, Prediction::Label(CLASS_NAMES[index].to_string()));
    }

    #[test]
    fn probabilities_mode_returns_raw_vector() {
        let classifier = classifier(&small_config());
        let bytes = png(9, 9);

        let prediction = classifier.predict(&bytes, OutputMode::Probabilities).unwrap();

        match prediction {
            Prediction::Probabilities(values) => {
                assert_eq!(values.len(), CLASS_NAMES.len());
                assert!((values.iter().sum::<f32>() - 1.0).abs() < 1e-5);
            }
            other => panic!("expected probabilities, got {other:?}"),
        }
    }

    #[test]
    fn bad_upload_is_a_prediction_error() {
        let classifier = classifier(&small_config());
        let result = classifier.predict(b"GIF89a but not really", OutputMode::Label);
        assert!(matches!(result, Err(ClassifierError::Prediction(_))));
    }

    #[test]
    fn missing_label_is_reported_not_panicked() {
        // seven outputs, five labels, class 6 always wins
        let device = Default::default();
        let config = ClassifierConfig::new(7).with_channels(vec![4]);
        let model = config
            .init::<TestBackend>(&device)
            .with_fixed_logits(&[0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 5.0]);
        let input = InputSpec {
            size: 16,
            normalization: Normalization::UnitRange,
        };
        let source = serve_model(model, &config, input, 1);

        let classifier = block_on(ImageClassifier::<TestBackend>::load(
            &source,
            "/models/test/model.json",
            &device,
        ))
        .unwrap();

        let probabilities = classifier.probabilities(&png(8, 8)).unwrap();
        assert_eq!(argmax(&probabilities), Some(6));

        match classifier.predict(&png(8, 8), OutputMode::Label) {
            Err(ClassifierError::Prediction(cause)) => assert!(cause.contains("index 6")),
            other => panic!("expected a prediction error, got {other:?}"),
        }
        assert!(classifier.predict(&png(8, 8), OutputMode::Probabilities).is_ok());
    }

    #[test]
    fn label_is_the_table_entry_of_the_winning_class() {
        let device = Default::default();
        let model = small_config()
            .init::<TestBackend>(&device)
            .with_fixed_logits(&[0.0, 0.0, 0.0, 3.0, 1.0]);
        let classifier = ImageClassifier::new(model, InputSpec::default(), device);

        let prediction = classifier.predict(&png(12, 12), OutputMode::Label).unwrap();

        assert_eq!(prediction, Prediction::Label("Ladybird".to_string()));
    }

    #[test]
    fn loads_then_predicts() {
        let device = Default::default();
        let config = small_config();
        let input = InputSpec {
            size: 48,
            normalization: Normalization::Symmetric,
        };
        let source = serve_model(config.init::<TestBackend>(&device), &config, input, 2);

        let classifier = block_on(ImageClassifier::<TestBackend>::load(
            &source,
            "/models/test/model.json",
            &device,
        ))
        .unwrap();

        assert_eq!(classifier.input(), input);
        let prediction = classifier.predict(&png(30, 40), OutputMode::Label).unwrap();
        match prediction {
            Prediction::Label(label) => assert!(CLASS_NAMES.contains(&label.as_str())),
            other => panic!("expected a label, got {other:?}"),
        }
    }
}
