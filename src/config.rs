// Library configuration
// Stored as JSON next to the library database. Missing fields fall back to
// the defaults in constants.rs, so older config files keep loading.

use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::error::{LibraryError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct LibraryConfig {
    /// UIDs per statement for batched operations.
    pub chunk_size: usize,
    /// Rename duplicates created by duplicate-insert and duplicate-replace.
    pub rename_duplicates: bool,
    pub consistency: ConsistencyPolicy,
    pub backup: BackupSettings,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            rename_duplicates: true,
            consistency: ConsistencyPolicy::default(),
            backup: BackupSettings::default(),
        }
    }
}

/// Repair policy applied by the startup consistency pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ConsistencyPolicy {
    pub capacity: usize,
    pub trim_overflow: bool,
    pub purge_trimmed_duplicates: bool,
}

impl Default for ConsistencyPolicy {
    fn default() -> Self {
        Self {
            capacity: SLOT_COUNT as usize,
            trim_overflow: true,
            purge_trimmed_duplicates: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct BackupSettings {
    pub enabled: bool,
    pub interval_secs: u64,
    /// Defaults to `<library>/.soundvault/backups`.
    pub directory: Option<PathBuf>,
    pub keep: usize,
    pub pages_per_step: i32,
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: DEFAULT_BACKUP_INTERVAL_SECS,
            directory: None,
            keep: DEFAULT_BACKUP_KEEP,
            pages_per_step: DEFAULT_BACKUP_PAGES_PER_STEP,
        }
    }
}

impl LibraryConfig {
    /// Load from a JSON file; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .map_err(|e| LibraryError::Read(format!("{}: {}", path.display(), e)))?;
        let config: LibraryConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .map_err(|e| LibraryError::Write(format!("{}: {}", path.display(), e)))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !(MIN_CHUNK_SIZE..=MAX_CHUNK_SIZE).contains(&self.chunk_size) {
            return Err(LibraryError::InvalidArgument(format!(
                "chunkSize must be between {} and {}",
                MIN_CHUNK_SIZE, MAX_CHUNK_SIZE
            )));
        }
        if self.consistency.capacity == 0 || self.consistency.capacity > SLOT_COUNT as usize {
            return Err(LibraryError::InvalidArgument(format!(
                "consistency.capacity must be between 1 and {}",
                SLOT_COUNT
            )));
        }
        if self.backup.pages_per_step <= 0 {
            return Err(LibraryError::InvalidArgument("backup.pagesPerStep must be positive".to_string()));
        }
        Ok(())
    }

    /// Backup directory for a library database at `db_path`.
    pub fn backup_dir(&self, db_path: &Path) -> PathBuf {
        match &self.backup.directory {
            Some(dir) => dir.clone(),
            None => db_path
                .parent()
                .map(|p| p.join(BACKUPS_FOLDER))
                .unwrap_or_else(|| PathBuf::from(BACKUPS_FOLDER)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = LibraryConfig::load(&dir.path().join("none.json")).unwrap();
        assert_eq!(config, LibraryConfig::default());
        assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"chunkSize": 250, "backup": {"keep": 2}}"#).unwrap();

        let config = LibraryConfig::load(&path).unwrap();
        assert_eq!(config.chunk_size, 250);
        assert_eq!(config.backup.keep, 2);
        assert_eq!(config.backup.interval_secs, DEFAULT_BACKUP_INTERVAL_SECS);
        assert!(config.consistency.purge_trimmed_duplicates);
    }

    #[test]
    fn test_invalid_chunk_size_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"chunkSize": 0}"#).unwrap();
        assert!(LibraryConfig::load(&path).is_err());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let mut config = LibraryConfig::default();
        config.backup.enabled = true;
        config.save(&path).unwrap();
        assert_eq!(LibraryConfig::load(&path).unwrap(), config);
    }
}
