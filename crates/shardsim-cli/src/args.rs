//! Command-line arguments.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Nearest-neighbour search over sharded graph embeddings.
#[derive(Debug, Parser)]
#[command(name = "shardsim", version, about)]
pub struct Cli {
    /// YAML config with GLOBAL_CONFIG and SIMILARITY_SEARCH_CONFIG sections.
    /// Without it, settings come from SHARDSIM_* environment variables.
    #[arg(long, global = true, env = "SHARDSIM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log filter directive, e.g. `debug` or `shardsim_index=trace,info`.
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Find the entities most similar to a node.
    Similarity(SimilarityArgs),
    /// Build (or load) the index of every shard at the current version.
    Index(IndexArgs),
    /// Show the entity directory, rebuilding it from the listings if stale.
    Directory(DirectoryArgs),
    /// Print the current checkpoint version.
    Version,
}

#[derive(Debug, Args)]
pub struct SimilarityArgs {
    /// Node id, or a property value to look up in the graph export.
    #[arg(long)]
    pub node: String,

    /// Only locate the node among shards of this entity type.
    #[arg(long)]
    pub type_hint: Option<String>,

    /// Number of neighbours; defaults to the configured nearest_neighbors.
    #[arg(short, long)]
    pub k: Option<usize>,

    /// Graph export (JSON lines) used to resolve keys and attach node metadata.
    #[arg(long)]
    pub graph_export: Option<PathBuf>,

    /// Print results as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct IndexArgs {
    /// Exit non-zero when any shard fails to build.
    #[arg(long)]
    pub strict: bool,
}

#[derive(Debug, Args)]
pub struct DirectoryArgs {
    /// Rebuild from the listing files even if the persisted directory is fresh.
    #[arg(long)]
    pub rebuild: bool,

    /// Print the directory summary as JSON.
    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn similarity_args() {
        let cli = Cli::try_parse_from([
            "shardsim", "--log-level", "debug", "similarity", "--node", "42", "-k", "5", "--json",
        ])
        .unwrap();
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        match cli.command {
            Command::Similarity(a) => {
                assert_eq!(a.node, "42");
                assert_eq!(a.k, Some(5));
                assert!(a.json);
                assert!(a.type_hint.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["shardsim", "index", "--strict", "--config", "cfg.yaml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("cfg.yaml")));
        assert!(matches!(cli.command, Command::Index(IndexArgs { strict: true })));
    }

    #[test]
    fn node_is_required() {
        assert!(Cli::try_parse_from(["shardsim", "similarity"]).is_err());
    }
}
