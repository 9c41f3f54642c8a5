use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use futures_util::future::join_all;
use tracing::info;
use tripsync::config::SyncConfig;
use tripsync::sync::{
    AttachmentStore, EngineRegistry, FileIdentity, FsLocalStore, PathResolver, RunOutcome,
    SyncAction, SyncEngine,
};
use tripsync_core::StorageClient;

const DEFAULT_OWNER: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Sync(Vec<String>),
    Delete(Vec<String>),
    Save { file: PathBuf, prefix: String },
    Reconcile(String),
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Cli {
    owner: String,
    command: Command,
}

fn parse_cli<I>(args: I) -> anyhow::Result<Cli>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter().skip(1);
    let mut owner = DEFAULT_OWNER.to_string();
    let mut rest = Vec::new();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--help" | "-h" => {
                return Ok(Cli {
                    owner,
                    command: Command::Help,
                });
            }
            "--owner" => owner = args.next().context("--owner needs a value")?,
            _ => {
                rest.push(arg);
                rest.extend(args.by_ref());
            }
        }
    }

    let mut rest = rest.into_iter();
    let command = match rest.next().as_deref() {
        None => Command::Help,
        Some("sync") => Command::Sync(non_empty(rest.collect(), "sync")?),
        Some("delete") => Command::Delete(non_empty(rest.collect(), "delete")?),
        Some("save") => {
            let file = rest.next().context("save needs <file> <prefix>")?;
            let prefix = rest.next().context("save needs <file> <prefix>")?;
            if let Some(extra) = rest.next() {
                anyhow::bail!("unexpected argument: {extra}");
            }
            Command::Save {
                file: PathBuf::from(file),
                prefix,
            }
        }
        Some("reconcile") => {
            let identity = rest.next().context("reconcile needs <identity>")?;
            if let Some(extra) = rest.next() {
                anyhow::bail!("unexpected argument: {extra}");
            }
            Command::Reconcile(identity)
        }
        Some(other) => anyhow::bail!("unknown command: {other}"),
    };
    Ok(Cli { owner, command })
}

fn non_empty(values: Vec<String>, command: &str) -> anyhow::Result<Vec<String>> {
    if values.is_empty() {
        anyhow::bail!("{command} needs at least one <identity>");
    }
    Ok(values)
}

fn parse_identities(raw: &[String]) -> anyhow::Result<Vec<FileIdentity>> {
    raw.iter()
        .map(|value| FileIdentity::new(value).with_context(|| format!("invalid identity: {value}")))
        .collect()
}

fn print_usage() {
    println!("Usage: tripsync [--owner <id>] <command>");
    println!("  sync <identity>...      Queue identities for reconciliation and drain the queue");
    println!("  delete <identity>...    Delete local and remote copies");
    println!("  save <file> <prefix>    Move a new file into local storage and upload it");
    println!("  reconcile <identity>    Reconcile a single identity now");
    println!("  --owner <id>            Queue owner, e.g. a trip id (default: {DEFAULT_OWNER})");
}

async fn drain(engine: &SyncEngine) -> anyhow::Result<()> {
    match engine.run_next().await? {
        RunOutcome::Idle | RunOutcome::Busy => println!("nothing to sync"),
        RunOutcome::Drained(report) => {
            println!(
                "synced {} file(s) in {} batch(es)",
                report.succeeded.len(),
                report.batches.len()
            );
        }
        RunOutcome::Stalled(report) => {
            for failure in &report.failed {
                eprintln!("failed: {}: {}", failure.identity, failure.error);
            }
            anyhow::bail!(
                "sync stalled: {} failed, {} still queued",
                report.failed.len(),
                engine.pending().await
            );
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tripsync::logging::init();

    let cli = parse_cli(std::env::args())?;
    if cli.command == Command::Help {
        print_usage();
        return Ok(());
    }

    let config = SyncConfig::from_env()?;
    let client = StorageClient::with_config(
        &config.storage_url,
        config.bucket.clone(),
        config.token.clone(),
        config.transfer,
    )
    .context("failed to build storage client")?;
    let store = AttachmentStore::new(
        Arc::new(client),
        Arc::new(FsLocalStore),
        PathResolver::new(&config.docs_root),
    );
    let registry = EngineRegistry::new(store, config.batch_size);
    let engine = registry.engine_for(&cli.owner).await;
    info!(owner = %cli.owner, docs_root = %config.docs_root.display(), "engine ready");

    match cli.command {
        Command::Sync(raw) => {
            let identities = parse_identities(&raw)?;
            engine.enqueue_files(identities, SyncAction::Sync).await;
            drain(&engine).await?;
        }
        Command::Delete(raw) => {
            let identities = parse_identities(&raw)?;
            let deletions = join_all(identities.iter().map(|identity| engine.delete_file(identity))).await;
            let mut pushes = Vec::with_capacity(deletions.len());
            for (identity, deletion) in identities.iter().zip(deletions) {
                pushes.push(deletion.with_context(|| format!("failed to delete {identity}"))?);
            }
            // The process exits with the runtime; let remote deletes finish first.
            for push in pushes {
                push.await?;
            }
            println!("deleted {} file(s)", identities.len());
        }
        Command::Save { file, prefix } => {
            let saved = engine
                .save_new_file(&file, &prefix)
                .await
                .with_context(|| format!("failed to save {}", file.display()))?;
            println!("{} -> {}", saved.identity, saved.local_path.display());
            saved.push.await?;
        }
        Command::Reconcile(raw) => {
            let identity = FileIdentity::new(&raw).with_context(|| format!("invalid identity: {raw}"))?;
            let outcome = engine.reconcile(&identity).await?;
            println!("{identity}: {outcome:?}");
        }
        Command::Help => print_usage(),
    }
    Ok(())
}
