//! Configuration management for runbar.
//!
//! A single string setting matters most: the project root path. It can live
//! in a workspace-local `runbar.toml` (next to where runbar is invoked) or
//! in the global `<config_dir>/runbar/config.toml`; the workspace file wins
//! field by field.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Workspace-scope settings file name, looked up in the working directory.
pub const WORKSPACE_FILE: &str = "runbar.toml";

pub const DEFAULT_MAX_OUTPUT_CHARS: usize = 200_000;
pub const DEFAULT_DEBOUNCE_MS: u64 = 500;

/// Settings parsed from `runbar.toml` / the global config file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Root directory of the Node project to run scripts in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_path: Option<PathBuf>,
    /// Character budget for the shared output buffer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_chars: Option<usize>,
    /// Window for collapsing repeated start requests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debounce_ms: Option<u64>,
}

impl Config {
    pub fn max_output_chars(&self) -> usize {
        self.max_output_chars.unwrap_or(DEFAULT_MAX_OUTPUT_CHARS)
    }

    pub fn debounce_ms(&self) -> u64 {
        self.debounce_ms.unwrap_or(DEFAULT_DEBOUNCE_MS)
    }

    /// Field-wise overlay: values present in `self` win over `fallback`.
    pub fn or(self, fallback: Config) -> Config {
        Config {
            project_path: self.project_path.or(fallback.project_path),
            max_output_chars: self.max_output_chars.or(fallback.max_output_chars),
            debounce_ms: self.debounce_ms.or(fallback.debounce_ms),
        }
    }
}

/// Where a written setting should land.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigScope {
    Workspace,
    Global,
}

pub fn global_config_path() -> Result<PathBuf> {
    let dir = dirs::config_dir()
        .context("could not determine the user config directory")?
        .join("runbar");
    Ok(dir.join("config.toml"))
}

/// Loads the effective configuration: workspace file over global file, both
/// optional.
pub fn load_config(workspace_dir: &Path) -> Result<Config> {
    let workspace = load_file(&workspace_dir.join(WORKSPACE_FILE))?;
    let global = load_file(&global_config_path()?)?;
    Ok(workspace.or(global))
}

/// Parses one settings file; a missing file is the empty config.
pub fn load_file(path: &Path) -> Result<Config> {
    let Ok(raw) = std::fs::read_to_string(path) else {
        return Ok(Config::default());
    };
    toml::from_str(&raw).with_context(|| format!("failed to parse config file {}", path.display()))
}

/// Persists the project path into the file for `scope`, keeping any other
/// settings in that file intact. Returns the path written.
pub fn store_project_path(
    workspace_dir: &Path,
    project_path: &Path,
    scope: ConfigScope,
) -> Result<PathBuf> {
    let target = match scope {
        ConfigScope::Workspace => workspace_dir.join(WORKSPACE_FILE),
        ConfigScope::Global => global_config_path()?,
    };
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let mut config = load_file(&target)?;
    config.project_path = Some(project_path.to_path_buf());
    let raw = toml::to_string_pretty(&config).context("failed to encode config")?;
    std::fs::write(&target, raw)
        .with_context(|| format!("failed to write {}", target.display()))?;
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_fields() {
        let raw = r#"
project_path = "/srv/app"
max_output_chars = 5000
debounce_ms = 250
"#;
        let config: Config = toml::from_str(raw).unwrap();
        assert_eq!(config.project_path.as_deref(), Some(Path::new("/srv/app")));
        assert_eq!(config.max_output_chars(), 5000);
        assert_eq!(config.debounce_ms(), 250);
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config = Config::default();
        assert_eq!(config.max_output_chars(), DEFAULT_MAX_OUTPUT_CHARS);
        assert_eq!(config.debounce_ms(), DEFAULT_DEBOUNCE_MS);
        assert!(config.project_path.is_none());
    }

    #[test]
    fn workspace_values_override_global() {
        let workspace = Config {
            project_path: Some("/work/app".into()),
            ..Default::default()
        };
        let global = Config {
            project_path: Some("/home/app".into()),
            debounce_ms: Some(100),
            ..Default::default()
        };
        let merged = workspace.or(global);
        assert_eq!(merged.project_path.as_deref(), Some(Path::new("/work/app")));
        assert_eq!(merged.debounce_ms(), 100);
    }

    #[test]
    fn missing_file_is_the_empty_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_file(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn store_keeps_other_settings() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(WORKSPACE_FILE),
            "max_output_chars = 1234\n",
        )
        .unwrap();
        let written =
            store_project_path(dir.path(), Path::new("/srv/app"), ConfigScope::Workspace).unwrap();
        let config = load_file(&written).unwrap();
        assert_eq!(config.project_path.as_deref(), Some(Path::new("/srv/app")));
        assert_eq!(config.max_output_chars(), 1234);
    }
}
