// file: lib.rs
// desc: browser image classifier - wasm entry point and page configuration

use leptos::*;
#[cfg(target_family = "wasm")]
use wasm_bindgen::prelude::*;

pub mod error;
pub mod inference;
pub mod loader;
pub mod model;
pub mod preprocess;
pub mod state;
pub mod web;

use inference::OutputMode;
use web::App;

#[derive(Debug, Clone, Copy)]
pub struct AppConfig {
    /// Served path of the model manifest. Weight shards sit next to it.
    pub model_url: &'static str,
    /// Initial value of the output selector.
    pub output_mode: OutputMode,
    pub log_level: log::Level,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model_url: "/models/insect_classifier/model.json",
            output_mode: OutputMode::Label,
            log_level: log::Level::Debug,
        }
    }
}

#[cfg_attr(target_family = "wasm", wasm_bindgen(start))]
pub fn main() {
    console_error_panic_hook::set_once();
    let config = AppConfig::default();
    console_log::init_with_level(config.log_level).ok();
    log::info!("Starting, model manifest at {}", config.model_url);
    leptos::mount_to_body(move || view! { <App config=config/> });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = AppConfig::default();
        assert_eq!(config.model_url, "/models/insect_classifier/model.json");
        assert_eq!(config.output_mode, OutputMode::Label);
        assert_eq!(config.log_level, log::Level::Debug);
    }
}
