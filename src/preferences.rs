//! Locally persisted UI preferences
//!
//! Holds the "last selected account" and "last selected locale" that the URL
//! builder falls back to when a call does not name them. Preferences live either
//! in memory or in a small TOML file that is rewritten on every change.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum PreferenceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed preferences file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to encode preferences: {0}")]
    Encode(#[from] toml::ser::Error),
}

pub type Result<T> = std::result::Result<T, PreferenceError>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_account: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
}

#[derive(Debug)]
pub struct PreferenceStore {
    path: Option<PathBuf>,
    current: RwLock<Preferences>,
}

impl PreferenceStore {
    /// Preferences that are never written anywhere
    pub fn in_memory() -> Self {
        Self {
            path: None,
            current: RwLock::new(Preferences::default()),
        }
    }

    /// Open a file-backed store; a missing file yields empty preferences
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let current = match std::fs::read_to_string(&path) {
            Ok(text) => toml::from_str(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No preferences file yet");
                Preferences::default()
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path: Some(path),
            current: RwLock::new(current),
        })
    }

    pub fn snapshot(&self) -> Preferences {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn last_account(&self) -> Option<String> {
        self.snapshot().last_account
    }

    pub fn locale(&self) -> Option<String> {
        self.snapshot().locale
    }

    pub fn set_last_account(&self, account: Option<String>) -> Result<()> {
        self.update(|prefs| prefs.last_account = account)
    }

    pub fn set_locale(&self, locale: Option<String>) -> Result<()> {
        self.update(|prefs| prefs.locale = locale)
    }

    fn update(&self, apply: impl FnOnce(&mut Preferences)) -> Result<()> {
        let snapshot = {
            let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
            apply(&mut current);
            current.clone()
        };

        if let Some(path) = &self.path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, toml::to_string(&snapshot)?)?;
            info!(path = %path.display(), "Preferences saved");
        }

        Ok(())
    }
}

impl Default for PreferenceStore {
    fn default() -> Self {
        Self::in_memory()
    }
}
