use std::{
    fs::{self, OpenOptions, rename, write},
    path::{Path, PathBuf},
};

use fs2::FileExt;
use serde_json::{Value, to_string_pretty};
use tracing::debug;
use uuid::Uuid;

use crate::{
    models::store::{CURRENT_VERSION, Store},
    storage::{Storage, StorageError},
};

const DEFAULT_KEPT_BACKUPS: usize = 5;

/// Keeps the whole store in one pretty-printed JSON file. Writes go to a
/// unique temp file which is renamed over the store under an exclusive lock,
/// after the previous file has been copied into `backups/`.
pub struct JsonFileStorage {
    path: PathBuf,
    kept_backups: usize,
}

impl JsonFileStorage {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            kept_backups: DEFAULT_KEPT_BACKUPS,
        }
    }

    pub fn with_kept_backups(mut self, kept_backups: usize) -> Self {
        self.kept_backups = kept_backups;
        self
    }

    fn backup_dir(&self) -> PathBuf {
        let parent = self.path.parent().unwrap_or(Path::new("."));
        parent.join("backups")
    }

    fn backup_path(&self) -> PathBuf {
        let stem = self
            .path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("store");
        // Zero-padded nanoseconds sort chronologically and carry no colons
        let stamp = jiff::Timestamp::now().as_nanosecond();
        self.backup_dir().join(format!("{stem}-{stamp:020}.json"))
    }

    fn back_up_current(&self) -> Result<(), StorageError> {
        let exists = fs::exists(&self.path).map_err(|e| StorageError::BackupFailed {
            path: self.path.clone(),
            source: e,
        })?;
        if !exists || self.kept_backups == 0 {
            return Ok(());
        }

        let dir = self.backup_dir();
        fs::create_dir_all(&dir).map_err(|e| StorageError::BackupFailed {
            path: dir.clone(),
            source: e,
        })?;

        let backup_path = self.backup_path();
        fs::copy(&self.path, &backup_path).map_err(|e| StorageError::BackupFailed {
            path: backup_path.clone(),
            source: e,
        })?;
        debug!(backup = %backup_path.display(), "store backed up");
        Ok(())
    }

    fn prune_backups(&self) -> Result<(), StorageError> {
        let dir = self.backup_dir();
        let cleanup_err = |e| StorageError::CleanupFailed {
            dir: dir.clone(),
            source: e,
        };
        if !fs::exists(&dir).map_err(cleanup_err)? {
            return Ok(());
        }

        let mut backups = fs::read_dir(&dir)
            .map_err(cleanup_err)?
            .flatten()
            .filter(|entry| entry.metadata().map(|m| m.is_file()).unwrap_or(false))
            .map(|entry| entry.path())
            .collect::<Vec<_>>();

        backups.sort();

        let excess = backups.len().saturating_sub(self.kept_backups);
        for stale in &backups[..excess] {
            fs::remove_file(stale).map_err(cleanup_err)?;
        }
        Ok(())
    }

    /// Moves a written temp file over the store while holding the lock.
    fn replace_with(&self, temp_path: &Path) -> Result<(), StorageError> {
        let lock_path = self.path.with_extension("lock");
        let lock_file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| StorageError::SaveFailed {
                path: lock_path.clone(),
                source: e,
            })?;
        lock_file
            .lock_exclusive()
            .map_err(|e| StorageError::SaveFailed {
                path: lock_path.clone(),
                source: e,
            })?;

        self.back_up_current()?;
        self.prune_backups()?;

        rename(temp_path, &self.path).map_err(|e| StorageError::SaveFailed {
            path: self.path.clone(),
            source: e,
        })?;

        lock_file.unlock().map_err(|e| StorageError::SaveFailed {
            path: lock_path,
            source: e,
        })?;

        Ok(())
    }

    fn parse(&self, content: &str) -> Result<Store, StorageError> {
        let parse_err = |e| StorageError::ParseFailed {
            path: self.path.clone(),
            source: e,
        };
        let mut data: Value = serde_json::from_str(content).map_err(parse_err)?;

        // Files without a version field predate versioning and are schema 1
        let version = match data.get("version").and_then(Value::as_u64) {
            None => 1,
            Some(v) => u32::try_from(v).unwrap_or(u32::MAX),
        };
        if version > CURRENT_VERSION {
            return Err(StorageError::FutureVersion(version));
        }
        if let Some(obj) = data.as_object_mut() {
            obj.insert("version".to_string(), Value::from(CURRENT_VERSION));
        }

        serde_json::from_value(data).map_err(parse_err)
    }
}

impl Storage for JsonFileStorage {
    fn load(&self) -> Result<Store, StorageError> {
        match fs::read_to_string(&self.path) {
            Ok(content) => self.parse(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Store::default()),
            Err(e) => Err(StorageError::LoadFailed {
                path: self.path.clone(),
                source: e,
            }),
        }
    }

    fn save(&self, store: &Store) -> Result<(), StorageError> {
        let json =
            to_string_pretty(store).map_err(|e| StorageError::SerializeFailed { source: e })?;

        let temp_path = PathBuf::from(format!("{}.tmp.{}", self.path.display(), Uuid::new_v4()));
        write(&temp_path, json).map_err(|e| StorageError::SaveFailed {
            path: temp_path.clone(),
            source: e,
        })?;

        if let Err(e) = self.replace_with(&temp_path) {
            if let Err(cleanup) = fs::remove_file(&temp_path) {
                debug!(temp = %temp_path.display(), error = %cleanup, "temp file left behind");
            }
            return Err(e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        project::Project,
        team::Team,
        user::{GlobalRole, User},
    };

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonFileStorage::new(dir.path().join("store.json"));

        let mut store = Store::default();
        let owner_id = store.add_user(User {
            name: String::from("Owner"),
            email: String::from("owner@example.com"),
            role: GlobalRole::ProjectManager,
            ..User::default()
        });
        let team_id = store.add_team(Team {
            name: String::from("Platform"),
            owner_id,
            ..Team::default()
        });
        store.add_project(Project {
            team_id,
            name: String::from("Billing"),
            created_by_user_id: owner_id,
            ..Project::default()
        });

        storage.save(&store).unwrap();
        let loaded = storage.load().unwrap();

        assert_eq!(loaded.users[&owner_id].role, GlobalRole::ProjectManager);
        assert_eq!(loaded.teams[&team_id].name, "Platform");
        assert_eq!(loaded.projects[&1].name, "Billing");
        assert_eq!(loaded.sequences.projects, 1);
    }

    #[test]
    fn test_load_missing_file_gives_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonFileStorage::new(dir.path().join("absent.json"));

        let store = storage.load().unwrap();
        assert!(store.users.is_empty());
        assert_eq!(store.version, CURRENT_VERSION);
    }

    #[test]
    fn test_load_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("invalid.json");
        fs::write(&path, "{ this is not valid json }").unwrap();

        let result = JsonFileStorage::new(path).load();
        assert!(matches!(result, Err(StorageError::ParseFailed { .. })));
    }

    #[test]
    fn test_load_without_version_field() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.json");
        fs::write(&path, r#"{ "users": {}, "teams": {} }"#).unwrap();

        let store = JsonFileStorage::new(path).load().unwrap();
        assert_eq!(store.version, CURRENT_VERSION);
    }

    #[test]
    fn test_load_future_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("future.json");
        fs::write(&path, r#"{ "version": 999 }"#).unwrap();

        let result = JsonFileStorage::new(path).load();
        assert!(matches!(result, Err(StorageError::FutureVersion(999))));
    }

    #[test]
    fn test_load_version_beyond_u32_is_future() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("huge.json");
        fs::write(&path, r#"{ "version": 4294967297 }"#).unwrap();

        let result = JsonFileStorage::new(path).load();
        assert!(matches!(result, Err(StorageError::FutureVersion(u32::MAX))));
    }

    #[test]
    fn test_failed_save_removes_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        // a directory where the store should be makes the backup copy fail
        fs::create_dir(&path).unwrap();

        let result = JsonFileStorage::new(path).save(&Store::default());
        assert!(result.is_err());

        let leftovers: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .filter(|name| name.contains(".tmp."))
            .collect();
        assert!(leftovers.is_empty(), "left behind: {leftovers:?}");
    }

    #[test]
    fn test_backups_are_rotated() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonFileStorage::new(dir.path().join("store.json")).with_kept_backups(3);

        for _ in 0..6 {
            storage.save(&Store::default()).unwrap();
            std::thread::sleep(std::time::Duration::from_millis(10));
        }

        let backups = fs::read_dir(dir.path().join("backups"))
            .unwrap()
            .filter_map(|entry| entry.ok())
            .count();
        assert_eq!(backups, 3, "only the newest backups are kept");
    }

    #[test]
    fn test_first_save_creates_no_backup() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonFileStorage::new(dir.path().join("store.json"));

        storage.save(&Store::default()).unwrap();
        assert!(!dir.path().join("backups").exists());

        storage.save(&Store::default()).unwrap();
        assert!(dir.path().join("backups").is_dir());
    }
}
