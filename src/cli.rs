use clap::{Parser, Subcommand};
use std::path::PathBuf;
use anyhow::Result;

use crate::core::Engine;

#[derive(Parser)]
#[command(name = "repograph")]
#[command(about = "Turn a GitHub repository's file tree into an explorable dependency graph")]
#[command(version)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a default configuration and create the graph directory
    Init {
        /// Target directory (defaults to current directory)
        #[arg(short, long)]
        path: Option<PathBuf>,

        /// Overwrite an existing configuration file
        #[arg(long)]
        force: bool,
    },

    /// Import a repository as a graph
    Import {
        /// GitHub URL or owner/repo shorthand
        repo: String,

        /// Owner of the resulting graph
        #[arg(long, default_value = "local")]
        caller: String,

        /// Also write the graph JSON to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List stored graphs
    List {
        /// Owner whose graphs to list
        #[arg(long, default_value = "local")]
        caller: String,
    },

    /// Show one stored graph
    Show {
        /// Graph id as printed by `import` or `list`
        id: String,

        /// Print the full graph document as JSON
        #[arg(long)]
        json: bool,
    },

    /// Change a stored graph's display name
    Rename {
        /// Graph id
        id: String,

        /// New name, 1 to 200 characters
        name: String,
    },

    /// Delete a stored graph
    Delete {
        /// Graph id
        id: String,
    },
}

impl Cli {
    pub async fn execute(self, mut engine: Engine) -> Result<()> {
        match self.command {
            Commands::Init { path, force } => {
                engine.init(path, force).await
            }
            Commands::Import { repo, caller, output } => {
                engine.import(&repo, &caller, output).await
            }
            Commands::List { caller } => {
                engine.list(&caller).await
            }
            Commands::Show { id, json } => {
                engine.show(&id, json).await
            }
            Commands::Rename { id, name } => {
                engine.rename(&id, &name).await
            }
            Commands::Delete { id } => {
                engine.delete(&id).await
            }
        }
    }
}
