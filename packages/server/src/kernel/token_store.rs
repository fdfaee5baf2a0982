//! File-backed OAuth credential record.
//!
//! The record is a small pretty-printed JSON document so an operator can
//! inspect it. Unknown keys are carried through a save so newer fields
//! survive an older binary. Writes go to a sibling temp file which is
//! synced and then renamed over the record, so readers see either the old
//! or the new record and never a torn one.

use std::fmt;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::PersistenceError;

/// OAuth credentials for the upstream platform.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Server-declared expiry of `access_token`, if any was given at issuance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Credentials {
    /// Blank tokens left behind by hand edits count as absent.
    fn normalized(mut self) -> Self {
        for token in [&mut self.access_token, &mut self.refresh_token] {
            if token.as_deref().map(str::trim).is_some_and(str::is_empty) {
                *token = None;
            } else if let Some(value) = token {
                *value = value.trim().to_string();
            }
        }
        self
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |t: &Option<String>| t.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("Credentials")
            .field("access_token", &redact(&self.access_token))
            .field("refresh_token", &redact(&self.refresh_token))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Loads and atomically replaces the credential record.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the record; a missing file means no credentials yet.
    pub fn load(&self) -> Result<Credentials, PersistenceError> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no token record yet");
            return Ok(Credentials::default());
        }

        let raw = fs::read_to_string(&self.path).map_err(PersistenceError::io("read", &self.path))?;
        if raw.trim().is_empty() {
            return Ok(Credentials::default());
        }

        let credentials: Credentials =
            serde_json::from_str(&raw).map_err(|source| PersistenceError::Corrupt {
                path: self.path.clone(),
                source,
            })?;
        Ok(credentials.normalized())
    }

    /// Persist the record, replacing the previous one in a single rename.
    pub fn save(&self, credentials: &Credentials) -> Result<(), PersistenceError> {
        let encoded = serde_json::to_vec_pretty(credentials).map_err(|source| {
            PersistenceError::Corrupt {
                path: self.path.clone(),
                source,
            }
        })?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(PersistenceError::io("create", parent))?;
        }

        let tmp_path = self.path.with_extension("tmp");
        let written = write_synced(&tmp_path, &encoded)
            .and_then(|()| fs::rename(&tmp_path, &self.path));

        if let Err(source) = written {
            let _ = fs::remove_file(&tmp_path);
            return Err(PersistenceError::Io {
                action: "write",
                path: self.path.clone(),
                source,
            });
        }

        debug!(path = %self.path.display(), "token record saved");
        Ok(())
    }
}

/// The file handle is closed when this returns, on success and on error.
fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("tokens.json"));

        let credentials = store.load().unwrap();
        assert_eq!(credentials, Credentials::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("tokens.json"));
        let credentials = Credentials {
            access_token: Some("access-1".into()),
            refresh_token: Some("refresh-1".into()),
            expires_at: Some(Utc::now() + Duration::hours(2)),
            ..Default::default()
        };

        store.save(&credentials).unwrap();

        assert_eq!(store.load().unwrap(), credentials);
        assert!(!dir.path().join("tokens.tmp").exists());
    }

    #[test]
    fn test_unknown_fields_survive_save() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        fs::write(
            &path,
            r#"{"access_token":"a","token_type":"bearer","scope":"employer_vacancies"}"#,
        )
        .unwrap();
        let store = TokenStore::new(&path);

        let mut credentials = store.load().unwrap();
        credentials.refresh_token = Some("r".into());
        store.save(&credentials).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["token_type"], "bearer");
        assert_eq!(raw["scope"], "employer_vacancies");
        assert_eq!(raw["refresh_token"], "r");
    }

    #[test]
    fn test_blank_tokens_are_absent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        fs::write(&path, r#"{"access_token":"  ","refresh_token":" r1 "}"#).unwrap();

        let credentials = TokenStore::new(&path).load().unwrap();
        assert_eq!(credentials.access_token, None);
        assert_eq!(credentials.refresh_token.as_deref(), Some("r1"));
    }

    #[test]
    fn test_corrupt_record_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        fs::write(&path, "access_token = abc").unwrap();

        let err = TokenStore::new(&path).load().unwrap_err();
        assert!(matches!(err, PersistenceError::Corrupt { .. }));
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let credentials = Credentials {
            access_token: Some("very-secret".into()),
            ..Default::default()
        };
        let debug = format!("{:?}", credentials);
        assert!(!debug.contains("very-secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
