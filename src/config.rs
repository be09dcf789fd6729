use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{RepographError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Upstream repository API settings
    pub github: GitHubConfig,

    /// Limits enforced around each import
    pub pipeline: PipelineConfig,

    /// Paths dropped from the fetched tree
    pub filter: FilterConfig,

    /// Thresholds for the relationship heuristics
    pub inference: InferenceConfig,

    /// 3D layout settings
    pub layout: LayoutConfig,

    /// Where finished graphs are written
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    /// API base URL
    pub api_base: String,

    /// Personal access token (falls back to the GITHUB_TOKEN environment variable)
    pub token: Option<String>,

    /// User-Agent header sent with every request
    pub user_agent: String,

    /// Timeout for a single upstream request (in seconds)
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Repositories with more files than this are rejected outright
    pub max_files: usize,

    /// Wall-clock budget for a whole import (in seconds)
    pub timeout_secs: u64,

    /// Imports a single caller may have in flight at once
    pub max_concurrent_per_caller: usize,

    /// Stored graphs a single caller may own
    pub max_graphs_per_caller: usize,

    /// Capacity of the progress channel handed to callers
    pub progress_buffer: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Directory prefixes (ending in `/`) and exact file names to exclude
    pub excluded_paths: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Largest basename group that is still fully connected
    pub related_group_max: usize,

    /// New edges each node may add to its directory siblings
    pub sibling_limit: usize,

    /// Fuzzy cross-directory matching is skipped above this node count
    pub fuzzy_node_limit: usize,

    /// New fuzzy edges per source node
    pub fuzzy_matches_per_node: usize,

    /// Minimum length of a core name used for substring matches
    pub fuzzy_substring_min_len: usize,

    /// Siblings a build/tooling config file fans out to
    pub config_fan_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Half-width of the box positions are rescaled into when they spread too far
    pub max_extent: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding one JSON document per graph
    pub data_dir: PathBuf,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.github.com".to_string(),
            token: None,
            user_agent: format!("repograph/{}", env!("CARGO_PKG_VERSION")),
            request_timeout_secs: 30,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_files: 10_000,
            timeout_secs: 120,
            max_concurrent_per_caller: 2,
            max_graphs_per_caller: 50,
            progress_buffer: 64,
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        let excluded_paths = [
            "node_modules/", ".git/", "dist/", "build/", ".next/",
            "vendor/", "__pycache__/", ".cache/", ".vscode/", ".idea/",
            "coverage/", ".nyc_output/", ".turbo/", ".vercel/",
            "package-lock.json", "yarn.lock", "pnpm-lock.yaml",
        ];

        Self {
            excluded_paths: excluded_paths.iter().map(|p| p.to_string()).collect(),
        }
    }
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            related_group_max: 8,
            sibling_limit: 3,
            fuzzy_node_limit: 2000,
            fuzzy_matches_per_node: 2,
            fuzzy_substring_min_len: 4,
            config_fan_limit: 5,
        }
    }
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self { max_extent: 15.0 }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".repograph/graphs"),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| RepographError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| RepographError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load configuration with fallback to default
    pub fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        let mut config = match path {
            Some(p) => {
                if p.as_ref().exists() {
                    Self::load(p)?
                } else {
                    Self::default()
                }
            }
            None => {
                // Try common config file locations
                let candidates = [
                    "Repograph.toml",
                    "repograph.toml",
                    ".repograph.toml",
                ];

                match candidates.iter().find(|c| Path::new(c).exists()) {
                    Some(candidate) => Self::load(candidate)?,
                    None => Self::default(),
                }
            }
        };

        if config.github.token.is_none() {
            config.github.token = std::env::var("GITHUB_TOKEN").ok().filter(|t| !t.is_empty());
        }

        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.pipeline.max_concurrent_per_caller == 0 {
            return Err(RepographError::Config(
                "pipeline.max_concurrent_per_caller must be at least 1".to_string(),
            ));
        }
        if self.pipeline.timeout_secs == 0 {
            return Err(RepographError::Config(
                "pipeline.timeout_secs must be at least 1".to_string(),
            ));
        }
        if !(self.layout.max_extent > 0.0) {
            return Err(RepographError::Config(
                "layout.max_extent must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
