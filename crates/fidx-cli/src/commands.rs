use anyhow::{bail, Context};
use bytes::Bytes;
use colored::Colorize;
use fidx_index::{
    FilterParams, IndexManager, MaintenanceKind, QueryResult, TaskReport, TaskState,
};
use fidx_server::{open_store, FidxServer, ServerConfig};
use fidx_types::{FileMetadata, FileRecord, Timestamp};
use serde::Serialize;
use serde_json::json;

use crate::cli::*;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli).await?;
    let format = cli.format;
    match cli.command {
        Command::Serve(args) => cmd_serve(config, args).await,
        Command::List(args) => cmd_list(&open_manager(&config).await?, args, format).await,
        Command::Rebuild => {
            cmd_maintenance(&open_manager(&config).await?, MaintenanceKind::Rebuild, format).await
        }
        Command::Merge => {
            cmd_maintenance(&open_manager(&config).await?, MaintenanceKind::Merge, format).await
        }
        Command::PurgeOperations => {
            let manager = open_manager(&config).await?;
            cmd_maintenance(&manager, MaintenanceKind::PurgeOperations, format).await
        }
        Command::Info => cmd_info(&open_manager(&config).await?, format).await,
        Command::Stats => cmd_stats(&open_manager(&config).await?, format).await,
        Command::Put(args) => cmd_put(&open_manager(&config).await?, args).await,
        Command::Delete(args) => cmd_delete(&open_manager(&config).await?, args).await,
    }
}

async fn load_config(cli: &Cli) -> anyhow::Result<ServerConfig> {
    let mut config = match &cli.config {
        Some(path) => ServerConfig::load(path).await?,
        None => ServerConfig::default(),
    };
    if let Some(dir) = &cli.data_dir {
        config.data_dir = Some(dir.clone());
    }
    tracing::debug!(data_dir = ?config.data_dir, bind = %config.bind_addr, "configuration loaded");
    Ok(config)
}

async fn open_manager(config: &ServerConfig) -> anyhow::Result<IndexManager> {
    let store = open_store(config).await?;
    Ok(IndexManager::new(store, config.index.clone()))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn cmd_serve(mut config: ServerConfig, args: ServeArgs) -> anyhow::Result<()> {
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    println!("fidx server on {}", config.bind_addr.to_string().bold());
    FidxServer::open(config).await?.serve().await?;
    Ok(())
}

pub(crate) fn filter_params(args: &ListArgs) -> FilterParams {
    let count = match (&args.count, args.sum) {
        (None, true) => Some("-1".to_string()),
        (count, _) => count.clone(),
    };
    FilterParams {
        search: args.search.clone(),
        dir: args.dir.clone(),
        start: args.start.clone(),
        count,
        sum: args.sum.then(|| "true".to_string()),
        recursive: args.recursive.then(|| "true".to_string()),
        channel: args.channel.clone(),
        list_type: args.list_type.clone(),
        include_tags: args.include_tags.clone(),
        exclude_tags: args.exclude_tags.clone(),
    }
}

async fn cmd_list(manager: &IndexManager, args: ListArgs, format: OutputFormat) -> anyhow::Result<()> {
    let validated = filter_params(&args).validate(manager.config().default_count);
    for sub in &validated.substitutions {
        eprintln!(
            "{} invalid {} {:?}, using {}",
            "warning:".yellow().bold(),
            sub.field,
            sub.raw,
            sub.substituted
        );
    }
    let filter = validated.value;

    let result = if args.scan {
        manager.fallback_list(&filter).await?
    } else {
        manager.list(&filter).await?
    };

    if filter.count_only {
        return match format {
            OutputFormat::Json => print_json(&json!({
                "sum": result.total_count,
                "indexLastUpdated": result.index_last_updated,
            })),
            OutputFormat::Text => {
                println!("{} records", result.total_count.to_string().bold());
                Ok(())
            }
        };
    }

    match format {
        OutputFormat::Json => print_json(&result),
        OutputFormat::Text => {
            print_listing(&result);
            Ok(())
        }
    }
}

fn print_listing(result: &QueryResult) {
    for dir in &result.directories {
        println!("  {}/", dir.blue().bold());
    }
    for file in &result.files {
        let tags: Vec<&str> = file.metadata.tags.iter().map(String::as_str).collect();
        if tags.is_empty() {
            println!("  {}", file.id);
        } else {
            println!("  {}  {}", file.id, format!("[{}]", tags.join(", ")).dimmed());
        }
    }
    let source = if result.is_indexed {
        "index".green()
    } else {
        "store scan".yellow()
    };
    let updated = result
        .index_last_updated
        .map(|t| t.to_string())
        .unwrap_or_else(|| "never".into());
    println!(
        "{} of {} records from {} (updated {})",
        result.returned_count.to_string().bold(),
        result.total_count.to_string().bold(),
        source,
        updated.dimmed()
    );
}

async fn cmd_maintenance(
    manager: &IndexManager,
    kind: MaintenanceKind,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let handle = manager.spawn_queue().submit(kind).await?;
    if format == OutputFormat::Text {
        println!("{} {} ({})", "started".cyan(), kind.as_str().bold(), handle.id.to_string().dimmed());
    }

    let report = match handle.wait().await {
        TaskState::Succeeded(report) => report,
        TaskState::Failed(reason) => bail!("{kind} failed: {reason}"),
        other => bail!("{kind} ended in state {other:?}"),
    };
    if format == OutputFormat::Json {
        return print_json(&report);
    }

    match report {
        TaskReport::Rebuilt(outcome) => {
            println!(
                "{} Rebuilt index v{}: {} records in {} directories",
                "✓".green().bold(),
                outcome.version,
                outcome.total_count.to_string().bold(),
                outcome.directory_count
            );
            println!(
                "  Scanned {} keys in {} pages, skipped {}",
                outcome.processed, outcome.pages, outcome.skipped
            );
            println!("  Operations covered by the scan: {}", outcome.consumed_operations);
        }
        TaskReport::Merged(outcome) => match outcome.version {
            Some(version) => {
                println!(
                    "{} Merged {} operations into index v{} ({} records)",
                    "✓".green().bold(),
                    outcome.applied().to_string().bold(),
                    version,
                    outcome.total_count
                );
                println!(
                    "  upserted {}, removed {}, absent {}, skipped {}",
                    outcome.upserted, outcome.removed, outcome.absent, outcome.skipped
                );
            }
            None => println!("{} No pending operations.", "✓".green()),
        },
        TaskReport::Purged { removed } => {
            println!("{} Deleted {} pending operations.", "✓".green().bold(), removed);
        }
    }
    Ok(())
}

async fn cmd_info(manager: &IndexManager, format: OutputFormat) -> anyhow::Result<()> {
    let info = manager.index_info().await?;
    if format == OutputFormat::Json {
        return print_json(&info);
    }

    if !info.exists {
        println!("No index. Run {} to build one.", "fidx rebuild".bold());
    } else if !info.readable {
        println!("{} Index meta record is unreadable; rebuild required.", "✗".red().bold());
    } else {
        println!("Index v{}", info.version.to_string().bold());
        if let Some(updated) = info.last_updated {
            println!("  Last updated: {updated}");
        }
        println!("  Records: {}", info.total_count);
        println!("  Directories: {}", info.directory_count);
    }
    let pending = info.pending_operations.to_string();
    let pending = if info.pending_operations == 0 {
        pending.green()
    } else {
        pending.yellow()
    };
    println!("  Pending operations: {pending}");
    if let Some(guard) = info.maintenance {
        if guard.is_expired(Timestamp::now()) {
            println!("  Maintenance: {} (expired {})", guard.task, guard.expires_at);
        } else {
            println!("  Maintenance: {} until {}", guard.task.as_str().cyan(), guard.expires_at);
        }
    }
    Ok(())
}

async fn cmd_stats(manager: &IndexManager, format: OutputFormat) -> anyhow::Result<()> {
    let stats = manager.storage_stats().await?;
    if format == OutputFormat::Json {
        return print_json(&stats);
    }
    if !stats.exists {
        println!("No index.");
        return Ok(());
    }
    println!("Index v{}", stats.version.to_string().bold());
    println!("  Records: {}", stats.total_records);
    println!(
        "  Chunks: {} (up to {} records each)",
        stats.chunk_count, stats.chunk_size
    );
    println!("  Size: {} bytes (meta {})", stats.total_bytes, stats.meta_bytes);
    for chunk in &stats.chunks {
        println!("    {}  {} records, {} bytes", chunk.key.dimmed(), chunk.records, chunk.bytes);
    }
    if stats.orphaned_chunks > 0 {
        println!("  {} orphaned chunks", stats.orphaned_chunks.to_string().yellow());
    }
    Ok(())
}

pub(crate) fn record_from_args(args: &PutArgs, time_stamp: Timestamp) -> anyhow::Result<FileRecord> {
    let mut metadata = FileMetadata::new(time_stamp).with_tags(args.tags.iter().cloned());
    if let Some(file_type) = &args.file_type {
        metadata = metadata.with_file_type(file_type.clone());
    }
    if let Some(channel) = &args.channel {
        metadata = metadata.with_channel(channel.clone());
    }
    if let Some(list_type) = &args.list_type {
        metadata = metadata.with_list_type(list_type.clone());
    }
    let record = FileRecord::new(args.id.clone(), metadata)?;
    if !record.is_indexable() {
        bail!("{} is a reserved key", record.id);
    }
    Ok(record)
}

async fn cmd_put(manager: &IndexManager, args: PutArgs) -> anyhow::Result<()> {
    let record = record_from_args(&args, Timestamp::now())?;
    let value = match &args.from_file {
        Some(path) => Bytes::from(
            tokio::fs::read(path)
                .await
                .with_context(|| format!("reading {}", path.display()))?,
        ),
        None => Bytes::new(),
    };
    manager
        .store()
        .put(&record.id, value, Some(record.metadata.clone()))
        .await?;
    manager.oplog().log_add(record.clone()).await?;
    println!("{} Stored {} (pending merge)", "✓".green().bold(), record.id.bold());
    Ok(())
}

async fn cmd_delete(manager: &IndexManager, args: DeleteArgs) -> anyhow::Result<()> {
    if !manager.store().delete(&args.id).await? {
        bail!("no record named {}", args.id);
    }
    manager.oplog().log_delete(args.id.clone()).await?;
    println!("{} Deleted {} (pending merge)", "✓".green().bold(), args.id.bold());
    Ok(())
}
