use std::path::{Path, PathBuf};

use vibeguard::config::loader;
use vibeguard::{Config, ConfigError};

/// Load the configuration from an explicit path, or auto-discover one in the
/// working directory (`vibeguard.yaml`, `vibeguard.yml`, `.vibeguard.yaml`,
/// `.vibeguard.yml`, in that order).
pub fn load_config(override_path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = match override_path {
        Some(path) => path.to_path_buf(),
        None => {
            let cwd = std::env::current_dir().map_err(|source| ConfigError::Io {
                path: PathBuf::from("."),
                source,
            })?;
            loader::discover(&cwd).ok_or(ConfigError::NotFound(cwd))?
        }
    };
    loader::load_path(&path)
}
