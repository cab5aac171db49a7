// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Config storage port and the JSON service layered on it.

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

/// Raw blob storage keyed by logical name.
pub trait ConfigStore {
    /// Load the blob for `key`; `PrefsError::NotFound` when absent.
    fn load_raw(&self, key: &str) -> Result<Vec<u8>, PrefsError>;
    /// Persist the blob for `key`.
    fn save_raw(&self, key: &str, data: &[u8]) -> Result<(), PrefsError>;
}

/// Failure while loading or saving preferences.
#[derive(Debug, Error)]
pub enum PrefsError {
    /// Key not present in the store.
    #[error("not found")]
    NotFound,
    /// I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// JSON encode/decode failure.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
    /// Store-specific failure.
    #[error("other: {0}")]
    Other(String),
}

/// Serializes values as JSON and delegates storage to a [`ConfigStore`].
#[derive(Debug)]
pub struct ConfigService<S> {
    store: S,
}

impl<S> ConfigService<S> {
    /// Service over `store`.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Borrow the store.
    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S: ConfigStore> ConfigService<S> {
    /// Load `key`; `Ok(None)` when missing or empty.
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, PrefsError> {
        match self.store.load_raw(key) {
            Ok(bytes) if bytes.is_empty() => Ok(None),
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(PrefsError::NotFound) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Persist `value` under `key`.
    pub fn save<T: Serialize>(&self, key: &str, value: &T) -> Result<(), PrefsError> {
        let data = serde_json::to_vec_pretty(value)?;
        self.store.save_raw(key, &data)
    }

    /// Load `key`, falling back to `T::default()` when missing or unreadable.
    /// Defaults are written back once so operators can find and edit them.
    ///
    /// Returns the value and, if any, the error that forced the fallback.
    pub fn load_or_init<T>(&self, key: &str) -> (T, Option<PrefsError>)
    where
        T: DeserializeOwned + Serialize + Default,
    {
        match self.load::<T>(key) {
            Ok(Some(value)) => (value, None),
            Ok(None) => {
                let value = T::default();
                let err = self.save(key, &value).err();
                (value, err)
            }
            Err(err) => (T::default(), Some(err)),
        }
    }
}
