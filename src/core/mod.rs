// src/core/mod.rs
mod engine;
mod model;
mod repo_url;
mod classifier;
mod inference;
mod metrics;
mod layout;
mod fetcher;
mod transform;
mod store;
mod pipeline;

pub use model::{FileEntry, Graph, GraphEdge, GraphNode, GraphSummary, RepoMetadata, Stage};
pub use repo_url::{parse_repo_url, RepoRef, RepoUrlParser};
pub use classifier::{
    classify, descriptor_for_extension, get_extension, get_file_name, ClusterTable,
    FileCategory, FileTypeDescriptor, ROOT_CLUSTER,
};
pub use inference::{infer_dependencies, max_edges_for, DependencyInferencer, EdgeSet};
pub use metrics::{compute_health_score, compute_node_metrics, estimate_lines};
pub use layout::{compute_layout, seeded_float};
pub use fetcher::{
    EntryKind, FetchResult, GitHubClient, PathFilter, RawTree, RepositoryHost, TreeEntry,
    TreeFetcher,
};
pub use transform::{transform_entries, TransformResult, TransformSettings};
pub use store::{GraphStore, JsonFileStore, MemoryStore};
pub use pipeline::{ConcurrencyLimiter, Pipeline, ProgressEvent, ProgressReporter, SlotGuard};

// Export the main engine
pub use engine::Engine;
