// Infrastructure layer
pub mod dev_server;
pub mod file_system;
pub mod livereload;
pub mod node_resolver;
pub mod processors;

pub use dev_server::*;
pub use file_system::*;
pub use livereload::*;
pub use node_resolver::*;
pub use processors::*;
