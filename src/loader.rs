// file: loader.rs
// desc: fetch the model manifest and weight shards, rebuild the classifier

use burn::{
    module::Module,
    record::{BinBytesRecorder, FullPrecisionSettings, Recorder},
    tensor::backend::Backend,
};
use js_sys::Uint8Array;
use serde::{Deserialize, Serialize};
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;
use web_sys::Response;

use crate::error::{ClassifierError, js_error};
use crate::model::{Classifier, ClassifierConfig};
use crate::preprocess::{InputSpec, MAX_INPUT_SIZE};

/// Where model files come from. The page uses [`HttpSource`].
#[allow(async_fn_in_trait)]
pub trait AssetSource {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ClassifierError>;
}

/// Browser `fetch()` against the serving origin.
pub struct HttpSource;

impl AssetSource for HttpSource {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ClassifierError> {
        let window = web_sys::window()
            .ok_or_else(|| ClassifierError::ModelLoad("no window".to_string()))?;

        let response = JsFuture::from(window.fetch_with_str(url))
            .await
            .map_err(|e| ClassifierError::ModelLoad(format!("{url}: {}", js_error(e))))?;
        let response: Response = response
            .dyn_into()
            .map_err(|e| ClassifierError::ModelLoad(js_error(e)))?;

        if !response.ok() {
            return Err(ClassifierError::ModelLoad(format!(
                "{url}: HTTP {}",
                response.status()
            )));
        }

        let buffer = response
            .array_buffer()
            .map_err(|e| ClassifierError::ModelLoad(js_error(e)))?;
        let buffer = JsFuture::from(buffer)
            .await
            .map_err(|e| ClassifierError::ModelLoad(js_error(e)))?;

        Ok(Uint8Array::new(&buffer).to_vec())
    }
}

/// Contents of `model.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelManifest {
    pub topology: ClassifierConfig,
    #[serde(default)]
    pub input: InputSpec,
    /// Weight shards, concatenated in this order.
    pub weights: Vec<String>,
}

impl ModelManifest {
    pub fn parse(bytes: &[u8]) -> Result<Self, ClassifierError> {
        let manifest: ModelManifest = serde_json::from_slice(bytes)
            .map_err(|e| ClassifierError::ModelLoad(format!("invalid manifest: {e}")))?;

        if manifest.weights.is_empty() {
            return Err(ClassifierError::ModelLoad(
                "manifest lists no weight files".to_string(),
            ));
        }
        manifest.validate()?;
        Ok(manifest)
    }

    // Anything accepted here must not panic later in init or forward.
    fn validate(&self) -> Result<(), ClassifierError> {
        let topology = &self.topology;
        topology
            .validate()
            .map_err(|e| ClassifierError::ModelLoad(format!("invalid topology: {e}")))?;

        // the preprocessor always produces RGB
        if topology.in_channels != 3 {
            return Err(ClassifierError::ModelLoad(format!(
                "topology expects {} input channels, images have 3",
                topology.in_channels
            )));
        }

        let size = self.input.size;
        let min_size = topology.min_input_size();
        if size == 0 || u64::from(size) < min_size || size > MAX_INPUT_SIZE {
            return Err(ClassifierError::ModelLoad(format!(
                "input size {size} outside {min_size}..={MAX_INPUT_SIZE} for {} conv blocks",
                topology.channels.len()
            )));
        }
        Ok(())
    }
}

pub struct LoadedModel<B: Backend> {
    pub model: Classifier<B>,
    pub input: InputSpec,
}

/// Resolves a shard path against the manifest location, the same way a
/// relative link resolves in the browser. `.` and `..` segments are folded;
/// `..` never climbs above the origin.
pub fn resolve_url(manifest_url: &str, path: &str) -> String {
    if path.starts_with('/') || path.contains("://") {
        return path.to_string();
    }

    let dir = match manifest_url.rfind('/') {
        Some(idx) => &manifest_url[..idx],
        None => "",
    };
    // scheme and host of an absolute URL stay untouched
    let origin_len = match dir.find("://") {
        Some(idx) => dir[idx + 3..].find('/').map_or(dir.len(), |p| idx + 3 + p),
        None => 0,
    };
    let (origin, rest) = dir.split_at(origin_len);
    let rooted = !origin.is_empty() || rest.starts_with('/');

    let mut segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            segment => segments.push(segment),
        }
    }

    let joined = segments.join("/");
    if rooted {
        format!("{origin}/{joined}")
    } else {
        joined
    }
}

pub async fn load_model<B: Backend, S: AssetSource>(
    source: &S,
    manifest_url: &str,
    device: &B::Device,
) -> Result<LoadedModel<B>, ClassifierError> {
    let manifest = ModelManifest::parse(&source.fetch(manifest_url).await?)?;
    log::debug!(
        "Model manifest: {} classes, {} weight shard(s)",
        manifest.topology.num_classes,
        manifest.weights.len()
    );

    let mut weights = Vec::new();
    for shard in &manifest.weights {
        let url = resolve_url(manifest_url, shard);
        let bytes = source.fetch(&url).await?;
        log::debug!("Fetched {} ({} bytes)", url, bytes.len());
        weights.extend_from_slice(&bytes);
    }

    let record = BinBytesRecorder::<FullPrecisionSettings>::default()
        .load(weights, device)
        .map_err(ClassifierError::model_load)?;
    let model = manifest.topology.init::<B>(device).load_record(record);
    model
        .check_topology(&manifest.topology)
        .map_err(|e| ClassifierError::ModelLoad(format!("weights do not match topology: {e}")))?;

    Ok(LoadedModel {
        model,
        input: manifest.input,
    })
}
