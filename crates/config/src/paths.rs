//! Default on-disk locations.

use rotakey_types::{Result, RotakeyError};
use std::path::PathBuf;

/// Return the user's home directory, or error if unset.
///
/// # Errors
///
/// Returns [`RotakeyError::Config`] if `HOME` is not set.
pub fn home_dir() -> Result<PathBuf> {
    std::env::var("HOME")
        .map(PathBuf::from)
        .map_err(|_| RotakeyError::Config("cannot determine home directory".into()))
}

/// `~/.config/rotakey/config.json`
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn config_path() -> Result<PathBuf> {
    Ok(home_dir()?
        .join(".config")
        .join("rotakey")
        .join("config.json"))
}

/// `~/.rotakey/auth.json`, the active-credential file the host reads.
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn credentials_path() -> Result<PathBuf> {
    Ok(home_dir()?.join(".rotakey").join("auth.json"))
}
