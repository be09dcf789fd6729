// src/core/model.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A regular file reported by the repository host, after path filtering
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Slash-separated, repository-relative path
    pub path: String,
    /// Size in bytes, when the host reports one
    pub size: Option<u64>,
}

impl FileEntry {
    pub fn new(path: impl Into<String>, size: Option<u64>) -> Self {
        Self {
            path: path.into(),
            size,
        }
    }
}

/// One file in the graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    pub id: String,
    pub path: String,
    pub name: String,
    pub extension: String,
    pub size: u64,
    /// Estimated line count
    pub lines: u64,
    /// Heuristic score in 0..=100
    pub complexity: u8,
    /// Dense index of the node's top-level directory
    pub cluster: usize,
    pub position: [f64; 3],
    /// Outgoing edge count
    pub deps: u32,
    /// Incoming edge count
    pub dependents: u32,
}

/// An inferred relationship between two nodes, stored as indices into the node list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: usize,
    pub target: usize,
}

impl GraphEdge {
    pub fn new(source: usize, target: usize) -> Self {
        Self { source, target }
    }

    /// Order-independent identity of the edge
    pub fn key(&self) -> (usize, usize) {
        (self.source.min(self.target), self.source.max(self.target))
    }
}

/// Repository metadata returned by the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoMetadata {
    pub name: String,
    pub default_branch: String,
    pub star_count: u64,
    pub language: Option<String>,
    pub html_url: Option<String>,
}

/// A finished import
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Graph {
    pub id: String,
    pub caller_id: String,
    /// Display name, `owner/repo`
    pub name: String,
    pub repo_owner: String,
    pub repo_name: String,
    pub repo_url: String,
    pub default_branch: String,
    pub star_count: u64,
    pub language: Option<String>,
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub file_count: usize,
    pub edge_count: usize,
    pub health_score: u8,
    /// Non-fatal notices raised during the import
    #[serde(default)]
    pub warnings: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub last_viewed_at: DateTime<Utc>,
}

/// A graph without its node and edge arrays
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphSummary {
    pub id: String,
    pub name: String,
    pub repo_owner: String,
    pub repo_name: String,
    pub repo_url: String,
    pub file_count: usize,
    pub edge_count: usize,
    pub health_score: u8,
    pub warnings: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub last_viewed_at: DateTime<Utc>,
}

impl Graph {
    pub fn summary(&self) -> GraphSummary {
        GraphSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            repo_owner: self.repo_owner.clone(),
            repo_name: self.repo_name.clone(),
            repo_url: self.repo_url.clone(),
            file_count: self.file_count,
            edge_count: self.edge_count,
            health_score: self.health_score,
            warnings: self.warnings.clone(),
            created_at: self.created_at,
            last_viewed_at: self.last_viewed_at,
        }
    }
}

/// Coarse phase of an import, as reported to progress listeners
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Fetching,
    Parsing,
    Computing,
    Layouting,
    Saving,
    Done,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Fetching => "fetching",
            Stage::Parsing => "parsing",
            Stage::Computing => "computing",
            Stage::Layouting => "layouting",
            Stage::Saving => "saving",
            Stage::Done => "done",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
