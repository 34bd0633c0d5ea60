//! Command handlers. Each writes its human-facing output to `out`; progress
//! and warnings go through `tracing`.

use std::io::Write;
use std::sync::Arc;

use anyhow::{bail, Context};
use serde_json::json;
use tracing::{info, warn};

use shardsim_core::{EmbeddingStore, ShardSimConfig};
use shardsim_directory::{discover, DirectOnlyResolver, EntityDirectory, GraphResolver, InMemoryGraph};
use shardsim_index::{BuildOutcome, IndexOrigin, ShardIndexManager};
use shardsim_query::{CancelToken, QueryRouter};

use crate::args::{Cli, Command, DirectoryArgs, IndexArgs, SimilarityArgs};

/// Config from `--config` (YAML) or the environment, with `--log-level`
/// applied on top.
pub fn load_config(cli: &Cli) -> anyhow::Result<ShardSimConfig> {
    let mut config = match &cli.config {
        Some(path) => ShardSimConfig::from_yaml_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ShardSimConfig::from_env(),
    };
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }
    config.validate()?;
    Ok(config)
}

pub fn run(command: &Command, config: &ShardSimConfig, out: &mut impl Write) -> anyhow::Result<()> {
    match command {
        Command::Similarity(args) => similarity(args, config, out),
        Command::Index(args) => index(args, config, out),
        Command::Directory(args) => directory(args, config, out),
        Command::Version => version(config, out),
    }
}

// ── similarity ──────────────────────────────────────────────────────────────

fn similarity(args: &SimilarityArgs, config: &ShardSimConfig, out: &mut impl Write) -> anyhow::Result<()> {
    let directory = Arc::new(EntityDirectory::load_or_build(config).context("entity directory")?);
    let resolver: Arc<dyn GraphResolver> = match &args.graph_export {
        Some(path) => Arc::new(InMemoryGraph::from_jsonl(
            path,
            config.resolver_scan_limit,
            config.resolver_timeout(),
        )?),
        None => Arc::new(DirectOnlyResolver::new(Arc::clone(&directory))),
    };
    let router = QueryRouter::new(config, directory, resolver)?;

    let k = args.k.unwrap_or(config.nearest_neighbors);
    let results = router
        .similarity_search_with(&args.node, args.type_hint.as_deref(), k, &CancelToken::new())
        .with_context(|| format!("similarity search for {:?}", args.node))?;

    if args.json {
        serde_json::to_writer_pretty(&mut *out, &results)?;
        writeln!(out)?;
        return Ok(());
    }
    for (rank, r) in results.iter().enumerate() {
        writeln!(out, "{:>3}  {:<12} {:<24} {:.6}", rank + 1, r.entity_type, r.entity_id, r.distance)?;
    }
    Ok(())
}

// ── index ───────────────────────────────────────────────────────────────────

fn index(args: &IndexArgs, config: &ShardSimConfig, out: &mut impl Write) -> anyhow::Result<()> {
    let directory = EntityDirectory::load_or_build(config).context("entity directory")?;
    let manager = ShardIndexManager::new(config);

    let too_small = manager.preflight(directory.shard_sizes());
    if !too_small.is_empty() {
        warn!(shards = too_small.len(), "some shards cannot hold a clustered index");
    }

    let report = manager.build_all(directory.shards())?;
    writeln!(out, "version {}", report.version)?;
    for (shard, outcome) in &report.shards {
        let shard = shard.to_string();
        match outcome {
            BuildOutcome::Ready { origin, vectors } => {
                let origin = match origin {
                    IndexOrigin::Built => "built",
                    IndexOrigin::Loaded => "loaded",
                    IndexOrigin::Cached => "cached",
                };
                writeln!(out, "{shard:<24} {origin:<7} {vectors}")?;
            }
            BuildOutcome::Failed(e) => writeln!(out, "{shard:<24} failed  {e}")?,
        }
    }

    let failed = report.failed();
    info!(shards = report.shards.len(), failed, "index command finished");
    if args.strict && failed > 0 {
        bail!("{failed} of {} shards failed to build", report.shards.len());
    }
    Ok(())
}

// ── directory ───────────────────────────────────────────────────────────────

fn directory(args: &DirectoryArgs, config: &ShardSimConfig, out: &mut impl Write) -> anyhow::Result<()> {
    let dir = if args.rebuild {
        let data_dir = config.data_dir();
        let listings = discover(&data_dir, config.catch_all)?;
        let dir = EntityDirectory::build(&data_dir, &listings)?;
        let path = dir.persist(&data_dir)?;
        info!(path = %path.display(), "entity directory rebuilt");
        dir
    } else {
        EntityDirectory::load_or_build(config)?
    };

    if args.json {
        let shards: Vec<_> = dir
            .entries()
            .iter()
            .map(|e| {
                json!({
                    "shard": e.shard().to_string(),
                    "entity_type": e.entity_type,
                    "partition": e.partition_number,
                    "entities": e.entity_ids.len(),
                    "file": e.entity_file,
                })
            })
            .collect();
        let summary = json!({ "entities": dir.entity_count(), "shards": shards });
        serde_json::to_writer_pretty(&mut *out, &summary)?;
        writeln!(out)?;
        return Ok(());
    }

    for e in dir.entries() {
        writeln!(out, "{:<24} {:>8}  {}", e.shard().to_string(), e.entity_ids.len(), e.entity_file)?;
    }
    writeln!(out, "{} shards, {} entities", dir.len(), dir.entity_count())?;
    Ok(())
}

// ── version ─────────────────────────────────────────────────────────────────

fn version(config: &ShardSimConfig, out: &mut impl Write) -> anyhow::Result<()> {
    let store = EmbeddingStore::from_config(config);
    writeln!(out, "{}", store.current_version()?)?;
    Ok(())
}
