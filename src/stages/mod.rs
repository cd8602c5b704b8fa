// Built-in pipeline stages, addressed by name from the build configuration

pub mod commonjs_stage;
pub mod component_stage;
pub mod globals_stage;
pub mod json_stage;
pub mod livereload_stage;
pub mod minify_stage;
pub mod polyfills_stage;
pub mod style_stage;

pub use commonjs_stage::CommonJsStage;
pub use component_stage::ComponentStage;
pub use globals_stage::GlobalsStage;
pub use json_stage::JsonStage;
pub use livereload_stage::{LiveReloadStage, DEFAULT_LIVERELOAD_PORT};
pub use minify_stage::MinifyStage;
pub use polyfills_stage::PolyfillsStage;
pub use style_stage::StyleStage;

use crate::core::interfaces::Stage;
use std::sync::Arc;

/// Names accepted in a stage descriptor
pub const BUILTIN_STAGES: &[&str] = &[
    "polyfills",
    "json",
    "component",
    "styles",
    "commonjs",
    "globals",
    "livereload",
    "minify",
];

pub fn builtin(name: &str) -> Option<Arc<dyn Stage>> {
    let stage: Arc<dyn Stage> = match name {
        "polyfills" => Arc::new(PolyfillsStage),
        "json" => Arc::new(JsonStage),
        "component" => Arc::new(ComponentStage),
        "styles" => Arc::new(StyleStage),
        "commonjs" => Arc::new(CommonJsStage),
        "globals" => Arc::new(GlobalsStage),
        "livereload" => Arc::new(LiveReloadStage),
        "minify" => Arc::new(MinifyStage),
        _ => return None,
    };
    Some(stage)
}
