use std::path::PathBuf;

pub fn system_config_file() -> PathBuf {
    PathBuf::from("/etc/face-enroll/face-enroll.toml")
}

pub fn system_models_dir() -> PathBuf {
    PathBuf::from("/usr/share/face-enroll/models")
}

/// Where downloaded model fallbacks are kept between runs.
pub fn model_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("face-enroll")
        .join("models")
}
