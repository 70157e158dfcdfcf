//! Project configuration: a named root directory with its own derived store.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectMode {
    Local,
    Cloud,
}

impl Default for ProjectMode {
    fn default() -> Self {
        ProjectMode::Local
    }
}

/// `mode` is opaque to the core engine; cloud sync tooling outside this
/// crate interprets it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    pub path: PathBuf,
    #[serde(default = "default_mode")]
    pub mode: ProjectMode,
    #[serde(default)]
    pub is_default: bool,
}

fn default_mode() -> ProjectMode {
    ProjectMode::Local
}

impl ProjectConfig {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            mode: ProjectMode::Local,
            is_default: false,
        }
    }

    /// Per-project SQLite database path under the project's own data
    /// directory, used when the config document does not set a global
    /// `database_url`.
    pub fn default_database_path(&self) -> PathBuf {
        self.path.join(".basic-memory").join("memory.db")
    }
}
