pub mod config_manager;
pub mod error;
pub mod logging;
pub mod source_map;
pub mod types;

pub use config_manager::*;
pub use error::*;
pub use logging::init_tracing;
pub use source_map::FunctionSourceMap;
pub use types::*;
