// kiln - single-bundle build orchestrator
pub mod cli;
pub mod core;
pub mod infrastructure;
pub mod stages;
pub mod utils;
