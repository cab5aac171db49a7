// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Filesystem `ConfigStore`: one JSON file per key under the platform config dir.

use directories::ProjectDirs;
use pingpong_app_core::config::{ConfigStore, PrefsError};
use std::fs;
use std::path::{Path, PathBuf};

/// Stores each key as `<base>/<key>.json`.
#[derive(Debug, Clone)]
pub struct FsConfigStore {
    base: PathBuf,
}

impl FsConfigStore {
    /// Store under the user config directory (e.g. `~/.config/pingpong`).
    pub fn new() -> Result<Self, PrefsError> {
        let dirs = ProjectDirs::from("dev", "flyingrobots", "pingpong")
            .ok_or_else(|| PrefsError::Other("could not resolve config dir".into()))?;
        Self::at(dirs.config_dir())
    }

    /// Store rooted at an explicit directory, created if missing.
    pub fn at(base: impl AsRef<Path>) -> Result<Self, PrefsError> {
        let base = base.as_ref().to_path_buf();
        fs::create_dir_all(&base)?;
        Ok(Self { base })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.base.join(format!("{key}.json"))
    }
}

impl ConfigStore for FsConfigStore {
    fn load_raw(&self, key: &str) -> Result<Vec<u8>, PrefsError> {
        match fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(PrefsError::NotFound),
            Err(err) => Err(PrefsError::Io(err)),
        }
    }

    fn save_raw(&self, key: &str, data: &[u8]) -> Result<(), PrefsError> {
        fs::write(self.path_for(key), data)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pingpong_app_core::{ConfigService, HostPrefs};

    #[test]
    fn missing_key_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsConfigStore::at(dir.path()).unwrap();
        assert!(matches!(store.load_raw("absent"), Err(PrefsError::NotFound)));
    }

    #[test]
    fn load_or_init_persists_defaults_once() {
        let dir = tempfile::tempdir().unwrap();
        let service = ConfigService::new(FsConfigStore::at(dir.path()).unwrap());

        let (prefs, err) = service.load_or_init::<HostPrefs>("pingpongd");
        assert!(err.is_none());
        assert_eq!(prefs, HostPrefs::default());
        assert!(dir.path().join("pingpongd.json").exists());

        let mut edited = prefs;
        edited.poll_interval_ms = 7;
        service.save("pingpongd", &edited).unwrap();
        let (reloaded, _) = service.load_or_init::<HostPrefs>("pingpongd");
        assert_eq!(reloaded.poll_interval_ms, 7);
    }
}
