pub mod config;
pub mod dev_mode;
pub mod error;
pub mod paths;

pub use config::{Config, ModelSource};
pub use dev_mode::DevMode;
pub use error::{DeviceAccessKind, EnrollError, Result};
pub use paths::{model_cache_dir, system_config_file, system_models_dir};
