//! Configuration file loader with multi-source merging

use super::file_config::FileConfig;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use std::path::{Path, PathBuf};

/// Prefix for environment overrides; `__` separates nested keys.
pub const ENV_PREFIX: &str = "TOOLGATE_";

const PROJECT_FILES: [&str; 2] = ["toolgate.toml", ".toolgate.toml"];

/// One place configuration may come from, for `toolgate config`.
#[derive(Debug, Clone)]
pub struct ConfigSource {
    pub label: &'static str,
    pub path: PathBuf,
    pub found: bool,
}

/// Configuration loader that handles file discovery and merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from all sources with proper priority
    ///
    /// Priority (highest to lowest):
    /// 1. `TOOLGATE_*` environment variables
    /// 2. Explicit config path (if provided)
    /// 3. Project root: `./toolgate.toml` or `./.toolgate.toml`
    /// 4. Global: `$XDG_CONFIG_HOME/toolgate/config.toml`
    /// 5. Default values
    pub fn load(config_path: Option<&PathBuf>) -> Result<FileConfig, Box<figment::Error>> {
        let mut files = Vec::new();

        if let Some(global_path) = Self::global_config_path()
            && global_path.exists()
        {
            files.push(global_path);
        }

        if let Some(project_path) = Self::project_config_path() {
            files.push(project_path);
        }

        // An explicit path must exist; a missing one is an error, not a no-op
        if let Some(path) = config_path {
            files.push(path.clone());
        }

        Self::figment(&files, config_path.map(PathBuf::as_path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(Box::new)
    }

    /// Merge defaults and `files` in order, later files winning.
    ///
    /// `required` must exist on disk; every other file is optional.
    pub fn figment(files: &[PathBuf], required: Option<&Path>) -> Figment {
        let mut figment = Figment::new().merge(Serialized::defaults(FileConfig::default()));
        for path in files {
            let toml = if Some(path.as_path()) == required {
                Toml::file_exact(path)
            } else {
                Toml::file(path)
            };
            figment = figment.merge(toml);
        }
        figment
    }

    /// Load only default configuration (for --no-config)
    pub fn load_defaults() -> FileConfig {
        FileConfig::default()
    }

    /// Get the global config file path
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("toolgate").join("config.toml"))
    }

    /// Get the project-level config file path (if it exists)
    pub fn project_config_path() -> Option<PathBuf> {
        PROJECT_FILES
            .iter()
            .map(PathBuf::from)
            .find(|path| path.exists())
    }

    /// Config file locations in priority order (highest first).
    pub fn sources(config_path: Option<&PathBuf>) -> Vec<ConfigSource> {
        let mut sources = Vec::new();

        if let Some(path) = config_path {
            sources.push(ConfigSource {
                label: "Explicit",
                found: path.exists(),
                path: path.clone(),
            });
        }

        let project = Self::project_config_path();
        sources.push(ConfigSource {
            label: "Project",
            found: project.is_some(),
            path: project.unwrap_or_else(|| PathBuf::from(PROJECT_FILES[0])),
        });

        if let Some(path) = Self::global_config_path() {
            sources.push(ConfigSource {
                label: "Global",
                found: path.exists(),
                path,
            });
        }

        sources
    }
}
