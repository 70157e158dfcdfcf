//! Layered configuration document: one file, read once at process start,
//! handed to every project as a closed config struct rather than passed
//! around as a dynamic option dict.
//!
//! Accepts either TOML or YAML on disk — the engine doesn't care which,
//! it tries TOML first (the CLI front-end's native format) and falls
//! back to YAML (the format every note on disk already uses).

use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{ProjectConfig, ProjectMode};

const ENV_DEFAULT_PROJECT: &str = "BASIC_MEMORY_MCP_PROJECT";

fn default_watch_debounce_ms() -> u64 {
    1000
}

fn default_dataview_refresh_debounce_ms() -> u64 {
    5000
}

fn default_ignore_file_name() -> String {
    ".bmignore".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// One entry of the `projects` table; the project's name is the map key,
/// not a field here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectEntry {
    pub path: PathBuf,
    #[serde(default)]
    pub mode: ProjectMode,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub projects: HashMap<String, ProjectEntry>,
    #[serde(default)]
    pub default_project: Option<String>,
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default)]
    pub semantic_search_enabled: bool,
    #[serde(default)]
    pub semantic_embedding_provider: Option<String>,
    #[serde(default)]
    pub semantic_embedding_dimensions: Option<usize>,
    #[serde(default)]
    pub telemetry_enabled: bool,
    #[serde(default = "default_watch_debounce_ms")]
    pub watch_debounce_ms: u64,
    #[serde(default = "default_dataview_refresh_debounce_ms")]
    pub dataview_refresh_debounce_ms: u64,
    #[serde(default = "default_ignore_file_name")]
    pub ignore_file_name: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            projects: HashMap::new(),
            default_project: None,
            database_url: None,
            semantic_search_enabled: false,
            semantic_embedding_provider: None,
            semantic_embedding_dimensions: None,
            telemetry_enabled: false,
            watch_debounce_ms: default_watch_debounce_ms(),
            dataview_refresh_debounce_ms: default_dataview_refresh_debounce_ms(),
            ignore_file_name: default_ignore_file_name(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(text)?;
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let mut config: Config = serde_yaml::from_str(text)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Loads the config document at `path`, dispatching on extension
    /// (`.toml` or `.yaml`/`.yml`); falls back to trying TOML then YAML
    /// if the extension is absent or unrecognized.
    pub async fn load(path: &Path) -> Result<Self> {
        let text = tokio::fs::read_to_string(path).await.map_err(|source| Error::FileError {
            path: path.to_path_buf(),
            source,
        })?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml_str(&text),
            Some("yaml") | Some("yml") => Self::from_yaml_str(&text),
            _ => Self::from_toml_str(&text).or_else(|_| Self::from_yaml_str(&text)),
        }
    }

    /// `BASIC_MEMORY_MCP_PROJECT`, when set, overrides `default_project`
    /// regardless of what the document on disk says.
    fn apply_env_overrides(&mut self) {
        if let Ok(project) = env::var(ENV_DEFAULT_PROJECT) {
            if !project.is_empty() {
                self.default_project = Some(project);
            }
        }
    }

    /// Resolves the name of the project to use when none is given
    /// explicitly: `default_project` if set, else the one entry with
    /// `is_default = true`, else the sole entry if there is exactly one.
    pub fn default_project_name(&self) -> Option<&str> {
        if let Some(name) = &self.default_project {
            return Some(name.as_str());
        }
        if let Some((name, _)) = self.projects.iter().find(|(_, p)| p.is_default) {
            return Some(name.as_str());
        }
        if self.projects.len() == 1 {
            return self.projects.keys().next().map(|s| s.as_str());
        }
        None
    }

    pub fn project(&self, name: &str) -> Result<ProjectConfig> {
        let entry = self.projects.get(name).ok_or_else(|| Error::ProjectNotFound { name: name.to_string() })?;
        Ok(ProjectConfig { name: name.to_string(), path: entry.path.clone(), mode: entry.mode, is_default: entry.is_default })
    }

    /// The SQLite database path for `project`: the global `database_url`
    /// if the document sets one, otherwise the project's own per-project
    /// default under its data directory.
    pub fn database_path(&self, project: &ProjectConfig) -> PathBuf {
        match &self.database_url {
            Some(url) => PathBuf::from(url),
            None => project.default_database_path(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_toml_with_defaults() {
        let config = Config::from_toml_str(
            r#"
            default_project = "notes"

            [projects.notes]
            path = "/home/user/notes"
            "#,
        )
        .unwrap();
        assert_eq!(config.default_project.as_deref(), Some("notes"));
        assert_eq!(config.watch_debounce_ms, 1000);
        assert_eq!(config.dataview_refresh_debounce_ms, 5000);
        assert_eq!(config.ignore_file_name, ".bmignore");
        assert!(!config.semantic_search_enabled);
    }

    #[test]
    fn parses_yaml_equivalently() {
        let config = Config::from_yaml_str(
            "default_project: notes\nprojects:\n  notes:\n    path: /home/user/notes\n",
        )
        .unwrap();
        assert_eq!(config.default_project.as_deref(), Some("notes"));
    }

    #[test]
    fn default_project_name_falls_back_to_sole_entry() {
        let mut config = Config::default();
        config.projects.insert("only".to_string(), ProjectEntry { path: PathBuf::from("/tmp/only"), mode: ProjectMode::Local, is_default: false });
        assert_eq!(config.default_project_name(), Some("only"));
    }

    #[test]
    fn default_project_name_prefers_is_default_flag() {
        let mut config = Config::default();
        config.projects.insert("a".to_string(), ProjectEntry { path: PathBuf::from("/tmp/a"), mode: ProjectMode::Local, is_default: false });
        config.projects.insert("b".to_string(), ProjectEntry { path: PathBuf::from("/tmp/b"), mode: ProjectMode::Local, is_default: true });
        assert_eq!(config.default_project_name(), Some("b"));
    }

    #[test]
    fn explicit_default_project_wins_over_is_default_flag() {
        let mut config = Config::default();
        config.default_project = Some("a".to_string());
        config.projects.insert("a".to_string(), ProjectEntry { path: PathBuf::from("/tmp/a"), mode: ProjectMode::Local, is_default: false });
        config.projects.insert("b".to_string(), ProjectEntry { path: PathBuf::from("/tmp/b"), mode: ProjectMode::Local, is_default: true });
        assert_eq!(config.default_project_name(), Some("a"));
    }

    #[test]
    fn database_path_prefers_global_url() {
        let mut config = Config::default();
        config.database_url = Some("/data/shared.db".to_string());
        let project = ProjectConfig::new("notes", "/home/user/notes");
        assert_eq!(config.database_path(&project), PathBuf::from("/data/shared.db"));
    }

    #[test]
    fn database_path_falls_back_to_per_project_default() {
        let config = Config::default();
        let project = ProjectConfig::new("notes", "/home/user/notes");
        assert_eq!(config.database_path(&project), PathBuf::from("/home/user/notes/.basic-memory/memory.db"));
    }
}
