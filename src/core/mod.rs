// Core domain layer
pub mod graph;
pub mod interfaces;
pub mod models;
pub mod registry;
pub mod services;
pub mod session;

pub use graph::*;
pub use interfaces::*;
pub use models::*;
pub use registry::*;
pub use services::*;
pub use session::*;
