//! Resolution of the database path and password.
//!
//! Explicit values win. Anything missing is read from the agent's
//! `options.json`, whose `dp` entry holds the encrypted password.

use std::path::{Path, PathBuf};

use rbfeed_core::ConnectionParams;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::crypto::decrypt_password;
use crate::errors::{Result, SettingsError};

const DB_PATH_KEY: &str = "db-path";
const PASSWORD_KEY: &str = "dp";

/// `options.json` as written by the agent: a list of `[key, value]` pairs.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct AgentOptions {
    #[serde(default)]
    pub options: Vec<Value>,
}

impl AgentOptions {
    /// String value of the first pair whose key matches.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.options.iter().find_map(|pair| {
            let pair = pair.as_array()?;
            match (pair.first()?.as_str(), pair.get(1)?.as_str()) {
                (Some(k), Some(v)) if k == key => Some(v),
                _ => None,
            }
        })
    }
}

/// Default location of the agent's `options.json` on this platform.
pub fn options_path() -> PathBuf {
    let home = home_dir();
    if cfg!(target_os = "macos") {
        home.join("Library/Application Support/Pioneer/rekordboxAgent/storage/options.json")
    } else if cfg!(windows) {
        let app_data = std::env::var("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home.join("AppData").join("Roaming"));
        app_data
            .join("Pioneer")
            .join("rekordboxAgent")
            .join("storage")
            .join("options.json")
    } else {
        home.join(".Pioneer/rekordboxAgent/storage/options.json")
    }
}

/// Read and parse the agent's options file.
pub fn read_agent_options(path: &Path) -> Result<AgentOptions> {
    if !path.exists() {
        return Err(SettingsError::ConfigNotFound(format!(
            "options.json not found at: {}",
            path.display()
        )));
    }
    let data = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data)?)
}

/// Resolve the database path and password.
///
/// With both explicit values present the options file is never touched.
pub fn resolve_connection(
    explicit_path: Option<&Path>,
    explicit_password: Option<&str>,
    options_file: &Path,
) -> Result<ConnectionParams> {
    if let (Some(path), Some(password)) = (explicit_path, explicit_password) {
        debug!(path = %path.display(), "using explicit database path and password");
        return Ok(ConnectionParams::new(path, password));
    }

    let options = read_agent_options(options_file)?;
    let (Some(db_path), Some(encrypted)) = (options.get(DB_PATH_KEY), options.get(PASSWORD_KEY)) else {
        return Err(SettingsError::ConfigNotFound(
            "could not find database path or password in options.json".into(),
        ));
    };

    let path = explicit_path.map_or_else(|| PathBuf::from(db_path), Path::to_path_buf);
    let password = match explicit_password {
        Some(p) => p.to_string(),
        None => decrypt_password(encrypted)?,
    };

    debug!(path = %path.display(), "resolved database from options.json");
    Ok(ConnectionParams::new(path, password))
}

fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}
