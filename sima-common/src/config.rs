//! Configuration loading and root folder resolution
//!
//! Root folder priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`SIMA_ROOT_FOLDER`, then `SIMA_ROOT`)
//! 3. TOML config file
//! 4. OS-dependent compiled default (fallback)
//!
//! A missing or malformed config file never aborts startup; a warning is
//! logged and compiled defaults are used instead.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Primary root folder environment variable
pub const ROOT_FOLDER_ENV: &str = "SIMA_ROOT_FOLDER";

/// Secondary root folder environment variable
pub const ROOT_ENV: &str = "SIMA_ROOT";

/// Database filename inside the root folder
pub const DATABASE_FILENAME: &str = "simannotator.db";

/// Optional settings read from `<config_dir>/simannotator/<module>.toml`
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct TomlConfig {
    pub root_folder: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
    /// Prefix prepended to sound filenames when building audio URLs
    pub media_url: Option<String>,
    pub log_level: Option<String>,
}

impl TomlConfig {
    /// Parse a TOML config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }
}

/// Compiled-in defaults for the current platform
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
    pub host: String,
    pub port: u16,
    pub media_url: String,
    pub log_level: String,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        Self {
            root_folder: default_root_folder(),
            host: "127.0.0.1".to_string(),
            port: 5730,
            media_url: "/media/".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Get OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    // ~/.local/share/simannotator, ~/Library/Application Support/simannotator
    // or %LOCALAPPDATA%\simannotator
    dirs::data_local_dir()
        .map(|d| d.join("simannotator"))
        .unwrap_or_else(|| PathBuf::from("./simannotator_data"))
}

/// Resolves the root folder for one module (binary)
#[derive(Debug, Clone)]
pub struct RootFolderResolver {
    module_name: String,
    cli_arg: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new(module_name: &str) -> Self {
        Self {
            module_name: module_name.to_string(),
            cli_arg: None,
        }
    }

    /// Attach the `--root-folder` command-line value, if any
    pub fn with_cli_arg(mut self, cli_arg: Option<PathBuf>) -> Self {
        self.cli_arg = cli_arg;
        self
    }

    /// Location of this module's TOML config file
    pub fn config_path(&self) -> Option<PathBuf> {
        dirs::config_dir().map(|d| {
            d.join("simannotator")
                .join(format!("{}.toml", self.module_name))
        })
    }

    /// Load the TOML config, falling back to an empty config on any error
    pub fn load_toml(&self) -> TomlConfig {
        let Some(path) = self.config_path() else {
            return TomlConfig::default();
        };
        if !path.exists() {
            debug!("No config file at {}, using defaults", path.display());
            return TomlConfig::default();
        }
        match TomlConfig::load(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!("Ignoring unreadable config file: {}", e);
                TomlConfig::default()
            }
        }
    }

    pub fn resolve(&self) -> PathBuf {
        self.resolve_with(&self.load_toml())
    }

    /// Resolve against an already loaded TOML config
    pub fn resolve_with(&self, toml: &TomlConfig) -> PathBuf {
        // Priority 1: Command-line argument
        if let Some(path) = &self.cli_arg {
            return path.clone();
        }

        // Priority 2: Environment variables
        for var in [ROOT_FOLDER_ENV, ROOT_ENV] {
            if let Ok(path) = std::env::var(var) {
                if !path.is_empty() {
                    return PathBuf::from(path);
                }
            }
        }

        // Priority 3: TOML config file
        if let Some(path) = &toml.root_folder {
            return path.clone();
        }

        // Priority 4: OS-dependent compiled default
        CompiledDefaults::for_current_platform().root_folder
    }
}

/// Creates the root folder and names files inside it
#[derive(Debug, Clone)]
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    pub fn ensure_directory_exists(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root_folder)?;
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(DATABASE_FILENAME)
    }

    pub fn database_exists(&self) -> bool {
        self.database_path().exists()
    }
}

/// HTTP listener settings after merging CLI, TOML and defaults
#[derive(Debug, Clone, PartialEq)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub media_url: String,
}

impl ServerSettings {
    pub fn resolve(toml: &TomlConfig, host_arg: Option<String>, port_arg: Option<u16>) -> Self {
        let defaults = CompiledDefaults::for_current_platform();
        Self {
            host: host_arg
                .or_else(|| toml.host.clone())
                .unwrap_or(defaults.host),
            port: port_arg.or(toml.port).unwrap_or(defaults.port),
            media_url: toml.media_url.clone().unwrap_or(defaults.media_url),
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
