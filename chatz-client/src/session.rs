//! The client's notion of the current document, persisted as JSON between
//! invocations.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::{ClientError, ClientResult};
use crate::wizard::DocumentStatus;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSession {
    #[serde(default)]
    pub document_id: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub status: Option<DocumentStatus>,
}

impl ClientSession {
    /// Load the session at `path`; a missing file is an empty session
    pub fn load(path: &Path) -> ClientResult<Self> {
        let data = match fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(ClientError::Io {
                    path: path.to_path_buf(),
                    source: e,
                });
            }
        };

        serde_json::from_str(&data).map_err(|e| ClientError::Session {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Write the session to `path`, replacing it atomically
    pub fn save(&self, path: &Path) -> ClientResult<()> {
        let io_error = |source: io::Error| ClientError::Io {
            path: path.to_path_buf(),
            source,
        };

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let json = serde_json::to_vec_pretty(self).map_err(|e| ClientError::Session {
            path: path.to_path_buf(),
            source: e,
        })?;

        let mut file = NamedTempFile::new_in(dir).map_err(io_error)?;
        file.write_all(&json).map_err(io_error)?;
        file.persist(path).map_err(|e| io_error(e.error))?;
        Ok(())
    }

    /// Current document id and status, if one is selected
    pub fn document(&self) -> Option<(&str, DocumentStatus)> {
        match (&self.document_id, self.status) {
            (Some(id), Some(status)) => Some((id.as_str(), status)),
            _ => None,
        }
    }

    pub fn select(&mut self, id: &str, file_name: &str, status: DocumentStatus) {
        self.document_id = Some(id.to_string());
        self.file_name = Some(file_name.to_string());
        self.status = Some(status);
    }

    pub fn set_status(&mut self, status: DocumentStatus) {
        self.status = Some(status);
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_empty_session() {
        let dir = TempDir::new().unwrap();
        let session = ClientSession::load(&dir.path().join("none.json")).unwrap();
        assert_eq!(session, ClientSession::default());
        assert!(session.document().is_none());
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.json");

        let mut session = ClientSession::default();
        session.select("abc", "report.pdf", DocumentStatus::Uploaded);
        session.save(&path).unwrap();

        let mut loaded = ClientSession::load(&path).unwrap();
        assert_eq!(loaded, session);
        assert_eq!(loaded.document(), Some(("abc", DocumentStatus::Uploaded)));

        loaded.set_status(DocumentStatus::Extracted);
        loaded.save(&path).unwrap();
        let json = fs::read_to_string(&path).unwrap();
        assert!(json.contains("\"extracted\""));

        loaded.clear();
        loaded.save(&path).unwrap();
        assert!(ClientSession::load(&path).unwrap().document().is_none());
    }

    #[test]
    fn test_corrupt_session_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, "{not json").unwrap();

        assert!(matches!(
            ClientSession::load(&path),
            Err(ClientError::Session { .. })
        ));
    }
}
