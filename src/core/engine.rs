// src/core/engine.rs
use std::path::{Path, PathBuf};
use std::sync::Arc;
use anyhow::{Context, Result};
use indexmap::IndexMap;
use tracing::{debug, info, warn};

use crate::config::Config;
use super::{
    classify, ConcurrencyLimiter, GitHubClient, Graph, GraphStore, JsonFileStore, PathFilter,
    Pipeline, ProgressEvent, ProgressReporter, TransformSettings, TreeFetcher,
};

/// Wires configuration, the GitHub client, storage and the import pipeline
pub struct Engine {
    config: Config,
    pipeline: Pipeline,
}

impl Engine {
    pub async fn new(config_path: Option<&Path>) -> Result<Self> {
        let config = Config::load_or_default(config_path)?;

        debug!("Loaded configuration: {:?}", config.pipeline);
        if config.github.token.is_none() {
            warn!("⚠️ No GitHub token configured, unauthenticated rate limits apply");
        }

        let client = GitHubClient::new(&config.github)?;
        let fetcher = TreeFetcher::new(Arc::new(client), PathFilter::from_config(&config.filter));
        let store: Arc<dyn GraphStore> = Arc::new(JsonFileStore::new(&config.storage.data_dir));
        let limiter = Arc::new(ConcurrencyLimiter::new(config.pipeline.max_concurrent_per_caller));
        let transform = TransformSettings {
            inference: config.inference.clone(),
            layout: config.layout.clone(),
        };

        let pipeline = Pipeline::new(fetcher, store, limiter, config.pipeline.clone(), transform);

        Ok(Self { config, pipeline })
    }

    /// Write a default configuration file and create the storage directory
    pub async fn init(&self, path: Option<PathBuf>, force: bool) -> Result<()> {
        let target_dir = match path {
            Some(p) => p,
            None => std::env::current_dir()?,
        };
        info!("Initializing repograph in: {}", target_dir.display());

        let config_file = target_dir.join("repograph.toml");
        if config_file.exists() && !force {
            warn!("{} already exists, use --force to overwrite", config_file.display());
        } else {
            tokio::fs::create_dir_all(&target_dir).await?;
            Config::default().save(&config_file)?;
            info!("✅ Wrote {}", config_file.display());
        }

        let data_dir = target_dir.join(&Config::default().storage.data_dir);
        tokio::fs::create_dir_all(&data_dir)
            .await
            .with_context(|| format!("Failed to create {}", data_dir.display()))?;
        info!("📁 Graphs will be stored in {}", data_dir.display());
        Ok(())
    }

    /// Import a repository and optionally export the graph as JSON
    pub async fn import(&mut self, repo: &str, caller: &str, output: Option<PathBuf>) -> Result<()> {
        info!("🔍 Importing {} for {}", repo, caller);

        let (reporter, mut events) = ProgressReporter::channel(self.config.pipeline.progress_buffer);
        let printer = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    ProgressEvent::Progress { stage, progress, detail } => {
                        info!("[{:>3}%] {:<9} {}", progress, stage, detail);
                    }
                    ProgressEvent::Complete { graph } => {
                        info!("🎉 Graph {} ready ({} files, {} edges)", graph.id, graph.file_count, graph.edge_count);
                    }
                    ProgressEvent::Error { message } => {
                        warn!("❌ {}", message);
                    }
                }
            }
        });

        let result = self.pipeline.run(repo, caller, &reporter).await;
        drop(reporter);
        if let Err(e) = printer.await {
            debug!("Progress printer ended abnormally: {}", e);
        }
        let graph = result?;

        for warning in &graph.warnings {
            warn!("⚠️ {}", warning);
        }

        if let Some(output) = output {
            let content = serde_json::to_string_pretty(&graph)?;
            tokio::fs::write(&output, content)
                .await
                .with_context(|| format!("Failed to write {}", output.display()))?;
            info!("📝 Exported graph to {}", output.display());
        }

        println!("{}", graph.id);
        Ok(())
    }

    /// Print a caller's graphs, most recently viewed first
    pub async fn list(&self, caller: &str) -> Result<()> {
        let graphs = self.pipeline.store().list_for(caller).await?;
        if graphs.is_empty() {
            info!("No graphs stored for {}", caller);
            return Ok(());
        }

        for g in graphs {
            println!(
                "{}  {:<40} {:>6} files {:>6} edges  health {:>3}  viewed {}",
                g.id,
                g.name,
                g.file_count,
                g.edge_count,
                g.health_score,
                g.last_viewed_at.format("%Y-%m-%d %H:%M")
            );
        }
        Ok(())
    }

    /// Print one graph, either as a summary or as the full JSON document
    pub async fn show(&self, id: &str, json: bool) -> Result<()> {
        let graph = self.pipeline.store().touch(id).await?;

        if json {
            println!("{}", serde_json::to_string_pretty(&graph)?);
            return Ok(());
        }

        println!("{} ({})", graph.name, graph.repo_url);
        println!("  branch:   {}", graph.default_branch);
        if let Some(language) = &graph.language {
            println!("  language: {}", language);
        }
        println!("  stars:    {}", graph.star_count);
        println!("  files:    {}", graph.file_count);
        println!("  edges:    {}", graph.edge_count);
        println!("  health:   {}/100", graph.health_score);

        println!("  file types:");
        for (label, count) in type_breakdown(&graph) {
            println!("    {:<14} {}", label, count);
        }

        let mut hotspots: Vec<_> = graph.nodes.iter().collect();
        hotspots.sort_by(|a, b| b.complexity.cmp(&a.complexity));
        println!("  most complex:");
        for node in hotspots.iter().take(5) {
            println!("    {:>3}  {}", node.complexity, node.path);
        }

        for warning in &graph.warnings {
            println!("  warning: {}", warning);
        }
        Ok(())
    }

    /// Give a stored graph a new display name
    pub async fn rename(&self, id: &str, name: &str) -> Result<()> {
        let graph = self.pipeline.store().rename(id, name).await?;
        info!("✏️  Renamed graph {} to {}", graph.id, graph.name);
        Ok(())
    }

    /// Remove a stored graph, freeing one slot of the owner's quota
    pub async fn delete(&self, id: &str) -> Result<()> {
        self.pipeline.store().delete(id).await?;
        info!("🗑️  Deleted graph {}", id);
        Ok(())
    }
}

/// File counts per type label, largest first
fn type_breakdown(graph: &Graph) -> Vec<(&'static str, usize)> {
    let mut counts: IndexMap<&'static str, usize> = IndexMap::new();
    for node in &graph.nodes {
        *counts.entry(classify(&node.path).label).or_insert(0) += 1;
    }
    counts.sort_by(|_, a, _, b| b.cmp(a));
    counts.into_iter().collect()
}
