//! Configuration management with layered loading
//!
//! Precedence (lowest to highest):
//! 1. Compiled defaults
//! 2. Global config: `$XDG_CONFIG_HOME/treenode/treenode.toml`
//! 3. Local config: `<dir>/.treenode.toml`
//! 4. Environment variables: `TREENODE_*` prefix, `__` between sections

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::application::ApplicationError;
use crate::domain::builder::{
    BuildOptions, DEFAULT_CONCURRENCY, DEFAULT_MAX_DEPTH, MAX_DEPTH_LIMIT,
};
use crate::domain::ExpandFields;

/// How the builder finds the children of a node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Re-scan the full record collection for every node
    #[default]
    Scan,
    /// Index records by parent id once, then look children up
    Indexed,
}

/// Rendering of built trees.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Tree,
    Json,
}

/// Post-build ordering of siblings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Keep source order
    #[default]
    None,
    Name,
    Code,
}

/// Tree building settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BuildSettings {
    pub strategy: Strategy,
    /// Levels allowed below the root before descent stops
    pub max_depth: usize,
    /// Sibling subtrees resolved concurrently
    pub concurrency: usize,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            strategy: Strategy::Scan,
            max_depth: DEFAULT_MAX_DEPTH,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

impl BuildSettings {
    /// Reject values the builder cannot honour.
    pub fn validate(&self) -> Result<(), ApplicationError> {
        if self.max_depth > MAX_DEPTH_LIMIT {
            return Err(ApplicationError::Config {
                message: format!(
                    "build.max_depth {} exceeds the supported maximum of {}",
                    self.max_depth, MAX_DEPTH_LIMIT
                ),
            });
        }
        Ok(())
    }

    pub fn options(&self) -> BuildOptions {
        BuildOptions {
            max_depth: self.max_depth,
            concurrency: self.concurrency.max(1),
        }
    }
}

/// Output settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OutputSettings {
    pub format: OutputFormat,
    pub sort: SortOrder,
}

/// Raw build settings for intermediate parsing (None = not specified).
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawBuildSettings {
    pub strategy: Option<Strategy>,
    pub max_depth: Option<usize>,
    pub concurrency: Option<usize>,
}

/// Raw output settings for intermediate parsing.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawOutputSettings {
    pub format: Option<OutputFormat>,
    pub sort: Option<SortOrder>,
}

/// Raw settings for intermediate parsing.
///
/// `expand: None` means not specified, inherit from base; `Some([])` is an
/// explicit empty list.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawSettings {
    pub build: RawBuildSettings,
    pub output: RawOutputSettings,
    pub expand: Option<Vec<String>>,
}

/// Unified configuration for treenode.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Fields expanded onto every node unless overridden on the command line
    pub expand: Vec<String>,
    pub build: BuildSettings,
    pub output: OutputSettings,
}

/// Get the XDG config directory for treenode.
pub fn global_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "treenode").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the global config file.
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("treenode.toml"))
}

/// Get the path to the local config file in a directory.
pub fn local_config_path(dir: &Path) -> PathBuf {
    dir.join(".treenode.toml")
}

/// Load a TOML file into RawSettings for manual merging.
fn load_raw_settings(path: &Path) -> Result<RawSettings, ApplicationError> {
    let content = std::fs::read_to_string(path).map_err(|e| ApplicationError::Config {
        message: format!("read {}: {}", path.display(), e),
    })?;
    toml::from_str(&content).map_err(|e| ApplicationError::Config {
        message: format!("parse {}: {}", path.display(), e),
    })
}

fn config_err(e: ConfigError) -> ApplicationError {
    ApplicationError::Config {
        message: e.to_string(),
    }
}

/// Merge lists with union semantics and `!name` negation, keeping first-seen order.
///
/// # Examples
/// ```ignore
/// merge_list(&["a", "b"], &["c"])       // → ["a", "b", "c"]
/// merge_list(&["a", "b"], &["!a", "c"]) // → ["b", "c"]
/// ```
pub fn merge_list(base: &[String], overlay: &[String]) -> Vec<String> {
    let negated: HashSet<&str> = overlay
        .iter()
        .filter_map(|item| item.strip_prefix('!'))
        .collect();
    let mut seen = HashSet::new();
    base.iter()
        .chain(overlay.iter().filter(|item| !item.starts_with('!')))
        .filter(|item| !negated.contains(item.as_str()))
        .filter(|item| seen.insert(item.as_str()))
        .cloned()
        .collect()
}

impl Settings {
    /// Expansion fields from settings as a domain set.
    pub fn expand_fields(&self) -> ExpandFields {
        self.expand.iter().map(String::as_str).collect()
    }

    /// Overlay scalars; `expand` uses union-with-negation semantics.
    fn merge_with(&self, overlay: &RawSettings) -> Self {
        let mut merged = self.apply_scalars(overlay);
        merged.expand = overlay
            .expand
            .as_ref()
            .map(|o| merge_list(&self.expand, o))
            .unwrap_or_else(|| self.expand.clone());
        merged
    }

    /// Overlay scalars; `expand` is replaced entirely if specified.
    fn apply_global(&self, global: &RawSettings) -> Self {
        let mut merged = self.apply_scalars(global);
        merged.expand = global
            .expand
            .clone()
            .unwrap_or_else(|| self.expand.clone());
        merged
    }

    fn apply_scalars(&self, raw: &RawSettings) -> Self {
        Self {
            build: BuildSettings {
                strategy: raw.build.strategy.unwrap_or(self.build.strategy),
                max_depth: raw.build.max_depth.unwrap_or(self.build.max_depth),
                concurrency: raw.build.concurrency.unwrap_or(self.build.concurrency),
            },
            output: OutputSettings {
                format: raw.output.format.unwrap_or(self.output.format),
                sort: raw.output.sort.unwrap_or(self.output.sort),
            },
            expand: self.expand.clone(),
        }
    }

    /// Load settings with layered precedence.
    ///
    /// # Arguments
    /// * `local_dir` - Optional directory holding a `.treenode.toml`
    ///
    /// # List Merge Semantics
    /// - Defaults → Global: REPLACE
    /// - Global → Local: UNION with `!` negation
    /// - Any → Env vars: REPLACE
    pub fn load(local_dir: Option<&Path>) -> Result<Self, ApplicationError> {
        let mut current = Self::default();

        if let Some(global_path) = global_config_path() {
            if global_path.exists() {
                let raw = load_raw_settings(&global_path)?;
                current = current.apply_global(&raw);
            }
        }

        if let Some(dir) = local_dir {
            let local_path = local_config_path(dir);
            if local_path.exists() {
                let raw = load_raw_settings(&local_path)?;
                current = current.merge_with(&raw);
            }
        }

        let settings = Self::apply_env_overrides(current)?;
        settings.build.validate()?;
        Ok(settings)
    }

    /// Load from a single file on top of defaults, ignoring global config and env.
    pub fn load_file(path: &Path) -> Result<Self, ApplicationError> {
        let raw = load_raw_settings(path)?;
        let settings = Self::default().apply_global(&raw);
        settings.build.validate()?;
        Ok(settings)
    }

    /// Apply TREENODE_* environment variables as explicit overrides.
    fn apply_env_overrides(mut settings: Self) -> Result<Self, ApplicationError> {
        let config = Config::builder()
            .add_source(
                Environment::with_prefix("TREENODE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("expand"),
            )
            .build()
            .map_err(config_err)?;

        if let Ok(val) = config.get::<Strategy>("build.strategy") {
            settings.build.strategy = val;
        }
        if let Ok(val) = config.get::<usize>("build.max_depth") {
            settings.build.max_depth = val;
        }
        if let Ok(val) = config.get::<usize>("build.concurrency") {
            settings.build.concurrency = val;
        }
        if let Ok(val) = config.get::<OutputFormat>("output.format") {
            settings.output.format = val;
        }
        if let Ok(val) = config.get::<SortOrder>("output.sort") {
            settings.output.sort = val;
        }
        if let Ok(val) = config.get::<Vec<String>>("expand") {
            settings.expand = val;
        }

        Ok(settings)
    }

    /// Render as TOML for `config show`.
    pub fn to_toml(&self) -> Result<String, ApplicationError> {
        toml::to_string_pretty(self).map_err(|e| ApplicationError::Config {
            message: format!("serialize settings: {}", e),
        })
    }
}
