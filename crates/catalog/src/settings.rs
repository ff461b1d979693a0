//! Engine settings consulted by the catalog
//!
//! Settings are read from a TOML file or built in code. Only the settings
//! the catalog needs are modelled.
//!
//! ```toml
//! # Whether the query history table is maintained and checkpointed
//! brain = false
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use tilestore_core::{Error, Result};

/// Identifies one setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingId {
    /// Query history collection for the self-driving component
    Brain,
}

/// Engine settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Maintain (and checkpoint) `pg_query_history`
    #[serde(default)]
    pub brain: bool,
}

impl Settings {
    /// Enable or disable query history
    pub fn with_brain(mut self, brain: bool) -> Self {
        self.brain = brain;
        self
    }

    /// Boolean value of a setting
    pub fn get_bool(&self, id: SettingId) -> bool {
        match id {
            SettingId::Brain => self.brain,
        }
    }

    /// Parse settings from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| Error::InvalidOperation(format!("Failed to parse settings: {}", e)))
    }

    /// Read and parse settings from a file path
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content).map_err(|e| {
            Error::InvalidOperation(format!("{} ({})", e, path.display()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_is_off() {
        assert!(!Settings::default().get_bool(SettingId::Brain));
        assert!(Settings::default().with_brain(true).get_bool(SettingId::Brain));
    }

    #[test]
    fn test_parse_and_missing_fields() {
        assert!(Settings::from_toml("brain = true").unwrap().brain);
        assert_eq!(Settings::from_toml("").unwrap(), Settings::default());
        assert!(Settings::from_toml("brain = 3").is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "brain = true\n").unwrap();
        assert!(Settings::from_file(&path).unwrap().brain);
        assert!(Settings::from_file(&dir.path().join("missing.toml")).is_err());
    }
}
