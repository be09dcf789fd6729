// src/core/inference.rs
//! Relationship inference from file paths
//!
//! Nothing here reads file contents. Edges come from five naming heuristics
//! applied in a fixed order, all feeding one de-duplicating [`EdgeSet`]
//! capped at `max(3n, 10)` edges:
//!
//! 1. files sharing a basename (`Button.tsx`, `Button.test.tsx`)
//! 2. `index` files linking to their directory
//! 3. a few neighbours per directory
//! 4. fuzzy name matches across directories
//! 5. build/tooling config files fanning out to their siblings

use indexmap::IndexMap;
use std::collections::HashSet;
use tracing::debug;

use crate::config::InferenceConfig;
use super::model::{GraphEdge, GraphNode};

const INDEX_NAMES: &[&str] = &["index.ts", "index.tsx", "index.js", "index.jsx"];

const CONFIG_FILE_NAMES: &[&str] = &[
    "package.json", "tsconfig.json", "tsconfig.node.json",
    "next.config.js", "next.config.ts", "next.config.mjs",
    "vite.config.ts", "vite.config.js",
    "tailwind.config.ts", "tailwind.config.js",
    "postcss.config.js", "postcss.config.mjs",
    ".eslintrc.json", ".eslintrc.js", "eslint.config.js", "eslint.config.mjs",
];

/// Edge accumulator shared by every rule of one inference run
#[derive(Debug)]
pub struct EdgeSet {
    edges: Vec<GraphEdge>,
    seen: HashSet<(usize, usize)>,
    max_edges: usize,
}

impl EdgeSet {
    /// Accumulator sized for `node_count` nodes
    pub fn for_nodes(node_count: usize) -> Self {
        Self::with_capacity_limit(max_edges_for(node_count))
    }

    pub fn with_capacity_limit(max_edges: usize) -> Self {
        Self {
            edges: Vec::new(),
            seen: HashSet::new(),
            max_edges,
        }
    }

    /// Insert an undirected edge; returns whether it was new
    pub fn add(&mut self, source: usize, target: usize) -> bool {
        if self.is_full() || source == target {
            return false;
        }
        let edge = GraphEdge::new(source, target);
        if !self.seen.insert(edge.key()) {
            return false;
        }
        self.edges.push(edge);
        true
    }

    pub fn is_full(&self) -> bool {
        self.edges.len() >= self.max_edges
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn into_edges(self) -> Vec<GraphEdge> {
        self.edges
    }
}

/// Upper bound on the number of inferred edges for a graph of `node_count` nodes
pub fn max_edges_for(node_count: usize) -> usize {
    (node_count * 3).max(10)
}

/// Infer edges with the default thresholds
pub fn infer_dependencies(nodes: &[GraphNode]) -> Vec<GraphEdge> {
    DependencyInferencer::new(InferenceConfig::default()).infer(nodes)
}

pub struct DependencyInferencer {
    config: InferenceConfig,
}

impl DependencyInferencer {
    pub fn new(config: InferenceConfig) -> Self {
        Self { config }
    }

    /// Run every rule over `nodes`; deterministic for a given node order
    pub fn infer(&self, nodes: &[GraphNode]) -> Vec<GraphEdge> {
        if nodes.len() <= 1 {
            return Vec::new();
        }

        let mut edges = EdgeSet::for_nodes(nodes.len());
        let by_dir = group_by(nodes, |node| Some(parent_dir(&node.path)));
        let by_basename = group_by(nodes, |node| {
            let base = basename_key(&node.name);
            (!base.is_empty()).then_some(base)
        });

        self.apply_related_files(&by_basename, &mut edges);
        debug!("related-files rule: {} edges", edges.len());
        self.apply_index_hubs(nodes, &by_dir, &mut edges);
        debug!("index-hub rule: {} edges", edges.len());
        self.apply_siblings(&by_dir, &mut edges);
        debug!("sibling rule: {} edges", edges.len());
        self.apply_fuzzy_matches(nodes, &mut edges);
        debug!("fuzzy-match rule: {} edges", edges.len());
        self.apply_config_fan(nodes, &by_dir, &mut edges);
        debug!("config-fan rule: {} edges", edges.len());

        edges.into_edges()
    }

    fn apply_related_files(&self, by_basename: &IndexMap<&str, Vec<usize>>, edges: &mut EdgeSet) {
        for indices in by_basename.values() {
            // Large groups are coincidental (dozens of `index` files), not related
            if indices.len() < 2 || indices.len() > self.config.related_group_max {
                continue;
            }
            for (pos, &a) in indices.iter().enumerate() {
                for &b in &indices[pos + 1..] {
                    if edges.is_full() {
                        return;
                    }
                    edges.add(a, b);
                }
            }
        }
    }

    fn apply_index_hubs(
        &self,
        nodes: &[GraphNode],
        by_dir: &IndexMap<&str, Vec<usize>>,
        edges: &mut EdgeSet,
    ) {
        for (i, node) in nodes.iter().enumerate() {
            let lower = node.name.to_lowercase();
            if !INDEX_NAMES.contains(&lower.as_str()) {
                continue;
            }
            let Some(siblings) = by_dir.get(parent_dir(&node.path)) else {
                continue;
            };
            for &sibling in siblings {
                if edges.is_full() {
                    return;
                }
                edges.add(i, sibling);
            }
        }
    }

    fn apply_siblings(&self, by_dir: &IndexMap<&str, Vec<usize>>, edges: &mut EdgeSet) {
        for indices in by_dir.values() {
            if indices.len() < 2 {
                continue;
            }
            for &a in indices {
                if edges.is_full() {
                    return;
                }
                let mut added = 0;
                for &b in indices {
                    if added >= self.config.sibling_limit {
                        break;
                    }
                    if a != b && edges.add(a, b) {
                        added += 1;
                    }
                }
            }
        }
    }

    fn apply_fuzzy_matches(&self, nodes: &[GraphNode], edges: &mut EdgeSet) {
        if nodes.len() > self.config.fuzzy_node_limit {
            debug!(
                "skipping fuzzy matching for {} nodes (limit {})",
                nodes.len(),
                self.config.fuzzy_node_limit
            );
            return;
        }

        let cores: Vec<Option<String>> = nodes.iter().map(|n| core_name(&n.name)).collect();
        let dirs: Vec<&str> = nodes.iter().map(|n| parent_dir(&n.path)).collect();

        for i in 0..nodes.len() {
            if edges.is_full() {
                return;
            }
            let Some(core_i) = cores[i].as_deref() else {
                continue;
            };

            let mut matches = 0;
            for j in (i + 1)..nodes.len() {
                if matches >= self.config.fuzzy_matches_per_node {
                    break;
                }
                if dirs[i] == dirs[j] {
                    continue;
                }
                let Some(core_j) = cores[j].as_deref() else {
                    continue;
                };
                if self.cores_match(core_i, core_j) && edges.add(i, j) {
                    matches += 1;
                }
            }
        }
    }

    fn cores_match(&self, a: &str, b: &str) -> bool {
        let min = self.config.fuzzy_substring_min_len;
        a == b || (a.len() >= min && b.contains(a)) || (b.len() >= min && a.contains(b))
    }

    fn apply_config_fan(
        &self,
        nodes: &[GraphNode],
        by_dir: &IndexMap<&str, Vec<usize>>,
        edges: &mut EdgeSet,
    ) {
        for (i, node) in nodes.iter().enumerate() {
            if !CONFIG_FILE_NAMES.contains(&node.name.as_str()) {
                continue;
            }
            if edges.is_full() {
                return;
            }
            let Some(siblings) = by_dir.get(parent_dir(&node.path)) else {
                continue;
            };
            let mut added = 0;
            for &sibling in siblings {
                if added >= self.config.config_fan_limit || edges.is_full() {
                    break;
                }
                if edges.add(i, sibling) {
                    added += 1;
                }
            }
        }
    }
}

/// Group node indices by key, keeping keys in first-seen order
fn group_by<'a, F>(nodes: &'a [GraphNode], key: F) -> IndexMap<&'a str, Vec<usize>>
where
    F: Fn(&'a GraphNode) -> Option<&'a str>,
{
    let mut groups: IndexMap<&str, Vec<usize>> = IndexMap::new();
    for (i, node) in nodes.iter().enumerate() {
        if let Some(k) = key(node) {
            groups.entry(k).or_default().push(i);
        }
    }
    groups
}

/// Directory part of a path, empty for root-level files
fn parent_dir(path: &str) -> &str {
    path.rfind('/').map_or("", |idx| &path[..idx])
}

/// File name up to its first dot
fn basename_key(name: &str) -> &str {
    name.split('.').next().unwrap_or(name)
}

/// Lower-cased basename with a hook-style `use` prefix removed
///
/// Names shorter than three characters carry too little signal and yield `None`.
fn core_name(name: &str) -> Option<String> {
    let base = basename_key(name).to_lowercase();
    let core = match base.strip_prefix("use") {
        Some(rest) if rest.chars().count() >= 3 => rest.to_string(),
        _ => base,
    };
    (core.chars().count() >= 3).then_some(core)
}
