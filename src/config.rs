use std::path::PathBuf;
use thiserror::Error;

pub const HISTORY_ENV: &str = "TIMEDUPE_HISTORY";
pub const LOG_ENV: &str = "TIMEDUPE_LOG";

const APP_DIR: &str = "timedupe";
const HISTORY_FILE: &str = "history.jsonl";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not find a local data directory; pass --history or set TIMEDUPE_HISTORY")]
    NoDataDir,
}

/// Runtime settings resolved from command-line flags and the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub history_path: PathBuf,
    pub verbosity: u8,
}

impl Settings {
    /// An explicit history path wins; otherwise the per-user data directory.
    pub fn resolve(history_path: Option<PathBuf>, verbosity: u8) -> Result<Self, ConfigError> {
        let history_path = match history_path {
            Some(path) => path,
            None => default_history_path()?,
        };
        Ok(Self {
            history_path,
            verbosity,
        })
    }
}

pub fn default_history_path() -> Result<PathBuf, ConfigError> {
    let data_dir = dirs::data_local_dir().ok_or(ConfigError::NoDataDir)?;
    Ok(data_dir.join(APP_DIR).join(HISTORY_FILE))
}
