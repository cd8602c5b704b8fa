// Processors module
pub mod bundle_renderer;
pub mod css_processor;
pub mod js_processor;
pub mod minifier;
pub mod scss_processor;

pub use bundle_renderer::*;
pub use css_processor::*;
pub use js_processor::*;
pub use minifier::*;
pub use scss_processor::*;
