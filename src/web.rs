// file: web.rs
// desc: upload page - load the model once, classify the chosen image

use leptos::*;
use std::cell::RefCell;
use std::rc::Rc;
use wasm_bindgen_futures::JsFuture;
use web_sys::{File, HtmlInputElement, Url};

use crate::AppConfig;
use crate::error::{ClassifierError, js_error};
use crate::inference::{ImageClassifier, OutputMode, PageBackend};
use crate::loader::HttpSource;
use crate::state::UiState;

thread_local! {
    static CLASSIFIER: RefCell<Option<Rc<ImageClassifier<PageBackend>>>> = const { RefCell::new(None) };
    static PREVIEW_URL: RefCell<Option<String>> = const { RefCell::new(None) };
}

async fn read_file(file: &File) -> Result<Vec<u8>, ClassifierError> {
    let buffer = JsFuture::from(file.array_buffer())
        .await
        .map_err(|e| ClassifierError::Prediction(js_error(e)))?;
    Ok(js_sys::Uint8Array::new(&buffer).to_vec())
}

// Object URL for the preview. The previous one is released first.
fn replace_preview(file: Option<&File>) -> Option<String> {
    PREVIEW_URL.with(|slot| {
        if let Some(old) = slot.borrow_mut().take() {
            let _ = Url::revoke_object_url(&old);
        }

        let url = file.and_then(|file| Url::create_object_url_with_blob(file).ok());
        *slot.borrow_mut() = url.clone();
        url
    })
}

#[component]
fn ImageUpload(config: AppConfig) -> impl IntoView {
    let state = create_rw_signal(UiState::loading());
    let (output_mode, set_output_mode) = create_signal(config.output_mode);
    let (preview, set_preview) = create_signal::<Option<String>>(None);

    create_effect(move |_| {
        spawn_local(async move {
            let device = Default::default();
            match ImageClassifier::<PageBackend>::load(&HttpSource, config.model_url, &device).await {
                Ok(classifier) => {
                    CLASSIFIER.with(|slot| *slot.borrow_mut() = Some(Rc::new(classifier)));
                    state.update(UiState::model_ready);
                }
                Err(err) => {
                    log::error!("{err}");
                    state.update(|s| s.fail(&err));
                }
            }
        });
    });

    on_cleanup(move || {
        replace_preview(None);
    });

    let on_file_change = move |ev: web_sys::Event| {
        let input = event_target::<HtmlInputElement>(&ev);
        let Some(file) = input.files().and_then(|files| files.get(0)) else {
            return;
        };
        let Some(classifier) = CLASSIFIER.with(|slot| slot.borrow().clone()) else {
            log::warn!("Model not loaded yet, ignoring {}", file.name());
            return;
        };

        set_preview.set(replace_preview(Some(&file)));
        let mode = output_mode.get_untracked();
        state.update(UiState::begin);

        spawn_local(async move {
            let result = match read_file(&file).await {
                Ok(bytes) => classifier.predict(&bytes, mode),
                Err(err) => Err(err),
            };

            match result {
                Ok(prediction) => {
                    log::info!("{}: {}", file.name(), prediction);
                    state.update(|s| s.succeed(prediction));
                }
                Err(err) => {
                    log::error!("{}: {err}", file.name());
                    state.update(|s| s.fail(&err));
                }
            }
        });
    };

    let on_mode_change = move |ev: web_sys::Event| match event_target_value(&ev).parse::<OutputMode>() {
        Ok(mode) => set_output_mode.set(mode),
        Err(err) => log::warn!("{err}"),
    };

    view! {
        <div class="upload-container">
            <div class="controls">
                <input
                    type="file"
                    accept="image/*"
                    on:change=on_file_change
                    disabled=move || state.with(|s| s.is_loading)
                />
                <select on:change=on_mode_change>
                    <option
                        value=OutputMode::Label.as_str()
                        selected=move || output_mode.get() == OutputMode::Label
                    >
                        "Class label"
                    </option>
                    <option
                        value=OutputMode::Probabilities.as_str()
                        selected=move || output_mode.get() == OutputMode::Probabilities
                    >
                        "Probabilities"
                    </option>
                </select>
            </div>

            <div class="preview-container">
                {move || preview.get().map(|url| view! { <img class="preview" src=url/> })}
            </div>

            <div class="info">
                <Show when=move || state.with(|s| s.is_loading)>
                    <p>"Loading..."</p>
                </Show>
                {move || state.with(|s| s.error.clone()).map(|error| view! {
                    <p class="error">{error}</p>
                })}
                <p class="prediction">
                    "Prediction: "
                    {move || state.with(|s| match &s.prediction {
                        Some(prediction) => prediction.to_string(),
                        None => "--".to_string(),
                    })}
                </p>
            </div>
        </div>
    }
}

#[component]
pub fn App(config: AppConfig) -> impl IntoView {
    view! {
        <div class="app">
            <style>
                "
                .app {
                    font-family: Arial, sans-serif;
                    max-width: 600px;
                    margin: 0 auto;
                    padding: 20px;
                }

                .upload-container {
                    text-align: center;
                }

                .controls {
                    margin-bottom: 10px;
                    display: flex;
                    justify-content: center;
                    gap: 10px;
                }

                .preview {
                    max-width: 100%;
                    max-height: 320px;
                    border: 2px solid #333;
                    border-radius: 4px;
                }

                .info {
                    margin-top: 15px;
                    color: #666;
                    font-size: 14px;
                }

                .error {
                    color: #c62828;
                }

                .prediction {
                    font-size: 18px;
                    font-weight: bold;
                    color: #2196F3;
                }
                "
            </style>

            <h1>"Insect-RS"</h1>
            <p>"Pick a photo of a butterfly, dragonfly, grasshopper, ladybird or mosquito."</p>
            <ImageUpload config=config/>
        </div>
    }
}
