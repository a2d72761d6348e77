use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};

/// Resolved location and credential of the encrypted database.
/// The credential is redacted in Debug output.
#[derive(Debug)]
pub struct ConnectionParams {
    pub path: PathBuf,
    pub credential: SecretString,
}

impl ConnectionParams {
    pub fn new(path: impl Into<PathBuf>, credential: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            credential: SecretString::from(credential.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn credential(&self) -> &str {
        self.credential.expose_secret()
    }
}
