use std::path::PathBuf;
use std::fs;
use crate::common::error::Result;

const DEV_DATA_DIR: &str = "./dev_data";

/// Development mode keeps every capture and debug frame on disk for inspection.
#[derive(Debug, Clone)]
pub struct DevMode {
    enabled: bool,
    base_dir: PathBuf,
}

impl DevMode {
    pub fn new(enabled: bool) -> Result<Self> {
        Self::with_base_dir(enabled, PathBuf::from(DEV_DATA_DIR))
    }

    pub fn with_base_dir(enabled: bool, base_dir: PathBuf) -> Result<Self> {
        if enabled {
            fs::create_dir_all(base_dir.join("captures"))?;
            fs::create_dir_all(base_dir.join("debug"))?;

            tracing::info!(
                "Development mode enabled - data will be saved to: {}",
                base_dir.display()
            );
        }

        Ok(Self { enabled, base_dir })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn captures_dir(&self) -> PathBuf {
        self.base_dir.join("captures")
    }

    fn debug_dir(&self) -> PathBuf {
        self.base_dir.join("debug")
    }

    pub fn get_capture_path(&self, prefix: &str, extension: &str) -> PathBuf {
        if self.enabled {
            let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S%.3f");
            self.captures_dir().join(format!("{}_{}.{}", prefix, timestamp, extension))
        } else {
            PathBuf::from(format!("{}.{}", prefix, extension))
        }
    }

    pub fn get_debug_path(&self, prefix: &str) -> PathBuf {
        if self.enabled {
            let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
            self.debug_dir().join(format!("{}_{}.jpg", prefix, timestamp))
        } else {
            PathBuf::from(format!("{}_debug.jpg", prefix))
        }
    }

    /// Log file used while the terminal UI owns the screen.
    pub fn get_log_path(&self) -> PathBuf {
        if self.enabled {
            self.base_dir.join("face-enroll.log")
        } else {
            std::env::temp_dir().join("face-enroll.log")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dev_paths_land_under_base_dir() {
        let dir = tempfile::tempdir().unwrap();
        let dev = DevMode::with_base_dir(true, dir.path().to_path_buf()).unwrap();

        assert!(dir.path().join("captures").is_dir());
        let capture = dev.get_capture_path("front", "jpg");
        assert!(capture.starts_with(dir.path().join("captures")));
        assert_eq!(capture.extension().unwrap(), "jpg");
        assert_eq!(dev.get_log_path(), dir.path().join("face-enroll.log"));
    }

    #[test]
    fn disabled_mode_uses_working_directory() {
        let dev = DevMode::new(false).unwrap();
        assert!(!dev.is_enabled());
        assert_eq!(dev.get_debug_path("detect"), PathBuf::from("detect_debug.jpg"));
        assert_eq!(dev.get_log_path(), std::env::temp_dir().join("face-enroll.log"));
    }
}
