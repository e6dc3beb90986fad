//! User configuration loading for razor-router.
//!
//! User config location: $XDG_CONFIG_HOME/razor-router/razor-router.toml
//! Fallback: the platform config directory (`dirs::config_dir()`).

use std::path::PathBuf;

use thiserror::Error;

use super::RouterConfig;

const APP_DIR: &str = "razor-router";
const FILE_NAME: &str = "razor-router.toml";

#[derive(Debug, Error)]
pub enum UserConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

pub type UserConfigResult<T> = Result<T, UserConfigError>;

/// Returns the path to the user configuration file.
///
/// 1. If $XDG_CONFIG_HOME is set: $XDG_CONFIG_HOME/razor-router/razor-router.toml
/// 2. Otherwise: `dirs::config_dir()`/razor-router/razor-router.toml
pub fn user_config_path() -> Option<PathBuf> {
    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME")
        && !xdg_config.is_empty()
    {
        return Some(PathBuf::from(xdg_config).join(APP_DIR).join(FILE_NAME));
    }
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join(FILE_NAME))
}

/// Load the user configuration file.
///
/// A missing file is `Ok(None)`; unreadable or malformed files are errors.
pub fn load_user_config() -> UserConfigResult<Option<RouterConfig>> {
    let Some(path) = user_config_path() else {
        return Ok(None);
    };
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(&path).map_err(|source| UserConfigError::Read {
        path: path.clone(),
        source,
    })?;
    toml::from_str(&contents)
        .map(Some)
        .map_err(|source| UserConfigError::Parse { path, source })
}
