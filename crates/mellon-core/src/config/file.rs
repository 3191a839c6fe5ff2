//! File and environment backed configuration

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{MellonError, MellonResult};
use crate::shell::DEFAULT_PROGRAM;

pub const ENV_PROGRAM: &str = "MELLON_SECURITY_PROGRAM";
pub const ENV_SERIALIZER: &str = "MELLON_SERIALIZER";
pub const ENV_VERIFY_KEYCHAINS: &str = "MELLON_VERIFY_KEYCHAINS";

/// Settings shared by keychains and stores
///
/// # Example
///
/// ```no_run
/// use mellon_core::MellonConfig;
///
/// let config = MellonConfig::load_user()?;
/// println!("using {} with {} stores", config.program, config.serializer);
/// # Ok::<(), mellon_core::MellonError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MellonConfig {
    /// Program invoked for every keychain operation
    pub program: String,
    /// Registered serializer name used by `Store::from_config`
    pub serializer: String,
    /// Whether explicitly named keychain paths are probed before use
    pub verify_keychains: bool,
}

impl Default for MellonConfig {
    fn default() -> Self {
        Self {
            program: DEFAULT_PROGRAM.to_string(),
            serializer: "yaml".to_string(),
            verify_keychains: true,
        }
    }
}

impl MellonConfig {
    /// User-level config path (`<config dir>/mellon/config.yaml`)
    pub fn user_path() -> PathBuf {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".config"));
        config_dir.join("mellon").join("config.yaml")
    }

    /// Load from a YAML file; a missing file yields the defaults
    pub fn load(path: impl AsRef<Path>) -> MellonResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&content)
            .map_err(|e| MellonError::Config(format!("Failed to parse {}: {}", path.display(), e)))
    }

    /// Load the user-level file, then apply environment overrides
    pub fn load_user() -> MellonResult<Self> {
        Self::load(Self::user_path())?.with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Defaults with environment overrides applied
    pub fn from_env() -> MellonResult<Self> {
        Self::default().with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from a variable lookup
    pub fn with_env_overrides<F>(mut self, lookup: F) -> MellonResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(program) = lookup(ENV_PROGRAM).filter(|v| !v.is_empty()) {
            self.program = program;
        }
        if let Some(serializer) = lookup(ENV_SERIALIZER).filter(|v| !v.is_empty()) {
            self.serializer = serializer;
        }
        if let Some(verify) = lookup(ENV_VERIFY_KEYCHAINS) {
            self.verify_keychains = match verify.to_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                other => {
                    return Err(MellonError::Config(format!(
                        "{} must be a boolean, got {:?}",
                        ENV_VERIFY_KEYCHAINS, other
                    )))
                }
            };
        }
        Ok(self)
    }

    /// Save as YAML, creating parent directories
    pub fn save(&self, path: impl AsRef<Path>) -> MellonResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(self)
            .map_err(|e| MellonError::Config(format!("Failed to serialize YAML: {}", e)))?;
        fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempdir().unwrap();
        let config = MellonConfig::load(dir.path().join("config.yaml")).unwrap();
        assert_eq!(config, MellonConfig::default());
        assert_eq!(config.program, "security");
        assert_eq!(config.serializer, "yaml");
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "serializer: json\n").unwrap();

        let config = MellonConfig::load(&path).unwrap();
        assert_eq!(config.serializer, "json");
        assert_eq!(config.program, "security");
        assert!(config.verify_keychains);
    }

    #[test]
    fn test_invalid_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "serializer: [unclosed\n").unwrap();
        assert!(matches!(MellonConfig::load(&path), Err(MellonError::Config(_))));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.yaml");
        let config = MellonConfig {
            program: "/opt/bin/security".into(),
            serializer: "json".into(),
            verify_keychains: false,
        };
        config.save(&path).unwrap();
        assert_eq!(MellonConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            (ENV_PROGRAM, "/usr/local/bin/security"),
            (ENV_VERIFY_KEYCHAINS, "no"),
        ]
        .into_iter()
        .collect();
        let config = MellonConfig::default()
            .with_env_overrides(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.program, "/usr/local/bin/security");
        assert_eq!(config.serializer, "yaml");
        assert!(!config.verify_keychains);

        let err = MellonConfig::default()
            .with_env_overrides(|key| (key == ENV_VERIFY_KEYCHAINS).then(|| "maybe".to_string()))
            .unwrap_err();
        assert!(matches!(err, MellonError::Config(_)));
    }

    #[test]
    fn test_user_path() {
        let path = MellonConfig::user_path();
        assert!(path.ends_with("mellon/config.yaml"));
    }
}
