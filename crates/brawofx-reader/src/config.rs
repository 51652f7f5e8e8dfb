//! Reader configuration.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ReaderError, Result};
use crate::quality::Quality;

pub const ENV_BUNDLE_ROOT: &str = "BRAWOFX_BUNDLE_ROOT";
pub const ENV_SDK_DIR: &str = "BRAWOFX_SDK_DIR";

/// Per-instance reader settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Plugin bundle the host loaded the reader from
    pub bundle_root: Option<PathBuf>,
    /// Codec directory, checked before the system locations
    pub sdk_dir: Option<PathBuf>,
    pub default_quality: Quality,
}

impl ReaderConfig {
    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Self {
        Self::default().overlay_env(|key| std::env::var_os(key))
    }

    /// Read a JSON config file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ReaderError::Config(format!("{}: {e}", path.display())))?;
        serde_json::from_str(&text).map_err(|e| ReaderError::Config(format!("{}: {e}", path.display())))
    }

    /// Replace paths with non-empty values from `env`.
    pub fn overlay_env(mut self, env: impl Fn(&str) -> Option<OsString>) -> Self {
        let path = |key: &str| env(key).filter(|v| !v.is_empty()).map(PathBuf::from);
        if let Some(root) = path(ENV_BUNDLE_ROOT) {
            self.bundle_root = Some(root);
        }
        if let Some(dir) = path(ENV_SDK_DIR) {
            self.sdk_dir = Some(dir);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_env_overlay() {
        let config = ReaderConfig::default().overlay_env(|key| match key {
            ENV_SDK_DIR => Some("/opt/braw/Libraries".into()),
            ENV_BUNDLE_ROOT => Some(OsString::new()),
            _ => None,
        });
        assert_eq!(config.sdk_dir, Some(PathBuf::from("/opt/braw/Libraries")));
        assert_eq!(config.bundle_root, None);
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"default_quality": "quarter"}}"#).unwrap();
        let config = ReaderConfig::load(file.path()).unwrap();
        assert_eq!(config.default_quality, Quality::Quarter);
        assert_eq!(config.sdk_dir, None);
    }

    #[test]
    fn test_load_errors_are_config_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(ReaderConfig::load(file.path()), Err(ReaderError::Config(_))));
        assert!(matches!(
            ReaderConfig::load(Path::new("/nonexistent/brawofx.json")),
            Err(ReaderError::Config(_))
        ));
    }
}
