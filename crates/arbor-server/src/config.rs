use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use arbor_archive::{ArchiveAttributes, DEFAULT_CEMETERY_DIR};
use arbor_overlay::validate_name;

use crate::error::{ServerError, ServerResult};

/// Where archives are kept.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    Memory,
    #[default]
    Filesystem,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `error`, `warn`, `info`, `debug` or `trace`.
    pub level: String,
    pub ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            ansi: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Project name, reported by the `$Project$` keyword.
    pub project: String,
    pub archive_root: PathBuf,
    pub storage: StorageBackend,
    /// Directory receiving deleted archives.
    pub cemetery_dir: String,
    /// Directory holding archives of files created on a branch.
    pub branch_archive_dir: String,
    /// Where branch and namespace state is saved. Without it the trunk
    /// namespace is rebuilt from the archives at startup.
    pub state_dir: Option<PathBuf>,
    /// Attributes given to newly created archives.
    pub default_attributes: ArchiveAttributes,
    /// Force `exclusive_lock` on every new archive.
    pub exclusive_locks: bool,
    pub log: LogConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            project: "arbor".into(),
            archive_root: PathBuf::from("archives"),
            storage: StorageBackend::Filesystem,
            cemetery_dir: DEFAULT_CEMETERY_DIR.into(),
            branch_archive_dir: ".branch-archives".into(),
            state_dir: None,
            default_attributes: ArchiveAttributes::default(),
            exclusive_locks: false,
            log: LogConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Configuration for an in-memory project, mostly for tests.
    pub fn in_memory(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            storage: StorageBackend::Memory,
            ..Self::default()
        }
    }

    pub fn from_toml(text: &str) -> ServerResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| ServerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> ServerResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ServerError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml(&text)
    }

    pub fn to_toml(&self) -> ServerResult<String> {
        toml::to_string_pretty(self).map_err(|e| ServerError::Config(e.to_string()))
    }

    pub fn validate(&self) -> ServerResult<()> {
        if self.project.trim().is_empty() {
            return Err(ServerError::Config("project name must not be empty".into()));
        }
        for (field, value) in [
            ("cemetery_dir", &self.cemetery_dir),
            ("branch_archive_dir", &self.branch_archive_dir),
        ] {
            validate_name(value).map_err(|e| ServerError::Config(format!("{field}: {e}")))?;
        }
        if self.cemetery_dir == self.branch_archive_dir {
            return Err(ServerError::Config(
                "cemetery_dir and branch_archive_dir must differ".into(),
            ));
        }
        Ok(())
    }

    /// Attributes for a new archive under this configuration.
    pub fn attributes_for_new_archive(&self) -> ArchiveAttributes {
        ArchiveAttributes {
            exclusive_lock: self.default_attributes.exclusive_lock || self.exclusive_locks,
            ..self.default_attributes
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = ServerConfig::default();
        assert_eq!(c.project, "arbor");
        assert_eq!(c.storage, StorageBackend::Filesystem);
        assert_eq!(c.cemetery_dir, DEFAULT_CEMETERY_DIR);
        assert!(c.state_dir.is_none());
        assert_eq!(c.log.level, "info");
        c.validate().unwrap();
    }

    #[test]
    fn parse_partial_toml() {
        let c = ServerConfig::from_toml(
            r#"
            project = "widgets"
            storage = "memory"
            exclusive_locks = true

            [default_attributes]
            expand_keywords = true

            [log]
            level = "debug"
            ansi = false
            "#,
        )
        .unwrap();
        assert_eq!(c.project, "widgets");
        assert_eq!(c.storage, StorageBackend::Memory);
        assert!(c.default_attributes.expand_keywords);
        assert!(c.default_attributes.check_lock);
        assert!(!c.log.ansi);

        let attrs = c.attributes_for_new_archive();
        assert!(attrs.exclusive_lock);
        assert!(attrs.expand_keywords);
    }

    #[test]
    fn toml_round_trip() {
        let c = ServerConfig::in_memory("demo");
        let back = ServerConfig::from_toml(&c.to_toml().unwrap()).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn invalid_config_rejected() {
        assert!(matches!(ServerConfig::from_toml("project = \"\""), Err(ServerError::Config(_))));
        assert!(matches!(
            ServerConfig::from_toml("cemetery_dir = \"a/b\""),
            Err(ServerError::Config(_))
        ));
        assert!(matches!(
            ServerConfig::from_toml("cemetery_dir = \"x\"\nbranch_archive_dir = \"x\""),
            Err(ServerError::Config(_))
        ));
        assert!(matches!(ServerConfig::from_toml("storage = 3"), Err(ServerError::Config(_))));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("arbor.toml");
        std::fs::write(&path, "project = \"disk\"\n").unwrap();
        assert_eq!(ServerConfig::load(&path).unwrap().project, "disk");
        assert!(ServerConfig::load(dir.path().join("missing.toml")).is_err());
    }
}
