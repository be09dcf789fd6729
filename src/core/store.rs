// src/core/store.rs
//! Graph persistence

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{RepographError, Result};
use super::model::{Graph, GraphSummary};

/// Where finished graphs live
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn save(&self, graph: &Graph) -> Result<()>;

    async fn load(&self, id: &str) -> Result<Graph>;

    async fn count_for(&self, caller_id: &str) -> Result<usize>;

    /// Summaries of a caller's graphs, most recently viewed first
    async fn list_for(&self, caller_id: &str) -> Result<Vec<GraphSummary>>;

    /// Bump `last_viewed_at` to now
    async fn touch(&self, id: &str) -> Result<Graph>;

    /// Change the display name; also counts as a view
    async fn rename(&self, id: &str, name: &str) -> Result<Graph>;

    async fn delete(&self, id: &str) -> Result<()>;
}

const MAX_NAME_LEN: usize = 200;

/// Trimmed display name, or `InvalidInput` when empty or too long
pub fn validate_graph_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
        return Err(RepographError::InvalidInput(format!(
            "Graph name must be between 1 and {} characters",
            MAX_NAME_LEN
        )));
    }
    Ok(name.to_string())
}

fn sort_recent_first(summaries: &mut [GraphSummary]) {
    summaries.sort_by(|a, b| b.last_viewed_at.cmp(&a.last_viewed_at));
}

/// Process-local store, used by tests and one-shot runs
#[derive(Default)]
pub struct MemoryStore {
    graphs: RwLock<HashMap<String, Graph>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GraphStore for MemoryStore {
    async fn save(&self, graph: &Graph) -> Result<()> {
        self.graphs.write().insert(graph.id.clone(), graph.clone());
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Graph> {
        self.graphs
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| RepographError::GraphNotFound(id.to_string()))
    }

    async fn count_for(&self, caller_id: &str) -> Result<usize> {
        Ok(self
            .graphs
            .read()
            .values()
            .filter(|g| g.caller_id == caller_id)
            .count())
    }

    async fn list_for(&self, caller_id: &str) -> Result<Vec<GraphSummary>> {
        let mut summaries: Vec<GraphSummary> = self
            .graphs
            .read()
            .values()
            .filter(|g| g.caller_id == caller_id)
            .map(Graph::summary)
            .collect();
        sort_recent_first(&mut summaries);
        Ok(summaries)
    }

    async fn touch(&self, id: &str) -> Result<Graph> {
        let mut graphs = self.graphs.write();
        let graph = graphs
            .get_mut(id)
            .ok_or_else(|| RepographError::GraphNotFound(id.to_string()))?;
        graph.last_viewed_at = Utc::now();
        Ok(graph.clone())
    }

    async fn rename(&self, id: &str, name: &str) -> Result<Graph> {
        let name = validate_graph_name(name)?;
        let mut graphs = self.graphs.write();
        let graph = graphs
            .get_mut(id)
            .ok_or_else(|| RepographError::GraphNotFound(id.to_string()))?;
        graph.name = name;
        graph.last_viewed_at = Utc::now();
        Ok(graph.clone())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.graphs
            .write()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| RepographError::GraphNotFound(id.to_string()))
    }
}

/// One pretty-printed JSON document per graph
///
/// Files are grouped under a directory named by a hash of the caller id, so
/// caller ids never appear in paths and per-caller counts only read one
/// directory: `<data_dir>/<caller hash>/<graph id>.json`.
pub struct JsonFileStore {
    data_dir: PathBuf,
}

impl JsonFileStore {
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
        }
    }

    fn caller_dir(&self, caller_id: &str) -> PathBuf {
        self.data_dir.join(caller_key(caller_id))
    }

    fn graph_path(&self, graph: &Graph) -> Result<PathBuf> {
        let file_name = graph_file_name(&graph.id).ok_or_else(|| {
            RepographError::InvalidInput(format!("Graph id is not a UUID: \"{}\"", graph.id))
        })?;
        Ok(self.caller_dir(&graph.caller_id).join(file_name))
    }

    async fn write_graph(&self, graph: &Graph) -> Result<()> {
        let path = self.graph_path(graph)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(graph)?;
        fs::write(&path, content).await?;
        debug!("Wrote graph {} to {}", graph.id, path.display());
        Ok(())
    }

    async fn read_graph(path: &Path) -> Result<Graph> {
        let content = fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Graph files in one caller directory
    async fn graph_files(dir: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut reader = match fs::read_dir(dir).await {
            Ok(reader) => reader,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(files),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = reader.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                files.push(path);
            }
        }
        Ok(files)
    }

    async fn locate(&self, id: &str) -> Result<PathBuf> {
        let file_name = graph_file_name(id)
            .ok_or_else(|| RepographError::GraphNotFound(id.to_string()))?;
        let mut callers = match fs::read_dir(&self.data_dir).await {
            Ok(reader) => reader,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RepographError::GraphNotFound(id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = callers.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let candidate = entry.path().join(&file_name);
            if fs::try_exists(&candidate).await? {
                return Ok(candidate);
            }
        }
        Err(RepographError::GraphNotFound(id.to_string()))
    }
}

/// `<id>.json`, for ids that are UUIDs; anything else cannot name a stored graph
fn graph_file_name(id: &str) -> Option<String> {
    Uuid::parse_str(id)
        .ok()
        .map(|uuid| format!("{}.json", uuid.hyphenated()))
}

/// Stable directory name for a caller id
fn caller_key(caller_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(caller_id.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..16].to_string()
}

#[async_trait]
impl GraphStore for JsonFileStore {
    async fn save(&self, graph: &Graph) -> Result<()> {
        self.write_graph(graph).await
    }

    async fn load(&self, id: &str) -> Result<Graph> {
        let path = self.locate(id).await?;
        Self::read_graph(&path).await
    }

    async fn count_for(&self, caller_id: &str) -> Result<usize> {
        Ok(Self::graph_files(&self.caller_dir(caller_id)).await?.len())
    }

    async fn list_for(&self, caller_id: &str) -> Result<Vec<GraphSummary>> {
        let mut summaries = Vec::new();
        for path in Self::graph_files(&self.caller_dir(caller_id)).await? {
            match Self::read_graph(&path).await {
                Ok(graph) => summaries.push(graph.summary()),
                Err(e) => warn!("Skipping unreadable graph file {}: {}", path.display(), e),
            }
        }
        sort_recent_first(&mut summaries);
        Ok(summaries)
    }

    async fn touch(&self, id: &str) -> Result<Graph> {
        let mut graph = self.load(id).await?;
        graph.last_viewed_at = Utc::now();
        self.write_graph(&graph).await?;
        Ok(graph)
    }

    async fn rename(&self, id: &str, name: &str) -> Result<Graph> {
        let name = validate_graph_name(name)?;
        let mut graph = self.load(id).await?;
        graph.name = name;
        graph.last_viewed_at = Utc::now();
        self.write_graph(&graph).await?;
        Ok(graph)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let path = self.locate(id).await?;
        fs::remove_file(&path).await?;
        debug!("Deleted graph {} at {}", id, path.display());
        Ok(())
    }
}
