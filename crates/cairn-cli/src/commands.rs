use std::collections::{BinaryHeap, HashSet};
use std::sync::Arc;

use anyhow::Context;
use cairn_chunks::{BatchStore, MemoryStore};
use cairn_client::{ClientConfig, HttpBatchStore};
use cairn_datas::{Commit, Database};
use cairn_server::{CairnServer, ServerConfig};
use cairn_sync::{pull_dataset, PullStatus};
use cairn_types::{Hash, Value};
use colored::Colorize;

use crate::cli::*;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let auth = cli.auth;
    match cli.command {
        Command::Serve(args) => cmd_serve(args).await,
        Command::Root(args) => cmd_root(args, auth).await,
        Command::Datasets(args) => cmd_datasets(args, auth).await,
        Command::Log(args) => cmd_log(args, auth).await,
        Command::Sync(args) => cmd_sync(args, auth).await,
    }
}

fn connect(url: &str, auth: Option<String>) -> anyhow::Result<Arc<HttpBatchStore>> {
    let config = ClientConfig {
        auth_header: auth,
        ..ClientConfig::new(url)
    };
    let store = HttpBatchStore::new(config).with_context(|| format!("cannot open {url}"))?;
    Ok(Arc::new(store))
}

async fn cmd_serve(args: ServeArgs) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => ServerConfig::from_toml_file(path)
            .with_context(|| format!("cannot load {}", path.display()))?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if args.namespace.is_some() {
        config.namespace = args.namespace;
    }
    config.trusted_bulk_import |= args.trusted;

    println!(
        "{} serving an in-memory database on {}",
        "cairn".bold(),
        config.bind_addr.to_string().cyan()
    );
    CairnServer::new(config, Arc::new(MemoryStore::new()))
        .serve()
        .await?;
    Ok(())
}

async fn cmd_root(args: RootArgs, auth: Option<String>) -> anyhow::Result<()> {
    let store = connect(&args.url, auth)?;
    let root = store.root().await?;
    println!("{root}");
    store.close().await?;
    Ok(())
}

async fn cmd_datasets(args: DatasetsArgs, auth: Option<String>) -> anyhow::Result<()> {
    let db = Database::new(connect(&args.url, auth)?);
    let datasets = db.datasets().await?;
    if datasets.is_empty() {
        println!("No datasets.");
    }
    for (id, head) in &datasets {
        println!("{}  {}", head.target().short().yellow(), id.bold());
    }
    db.close().await?;
    Ok(())
}

/// Newest first: commits are ordered by height, so a commit always
/// prints before its parents.
async fn cmd_log(args: LogArgs, auth: Option<String>) -> anyhow::Result<()> {
    let db = Database::new(connect(&args.url, auth)?);
    let head = db.head_ref(&args.dataset).await?;
    let limit = args.limit.unwrap_or(usize::MAX);

    let mut queue = BinaryHeap::from([(head.height(), head.target())]);
    let mut seen = HashSet::from([head.target()]);
    let mut shown = 0;
    while let Some((_, hash)) = queue.pop() {
        if shown == limit {
            break;
        }
        let value = db
            .read_value(&hash)
            .await?
            .with_context(|| format!("commit {hash} is missing"))?;
        let commit = Commit::from_value(hash, &value)?;
        print_commit(&hash, &commit, args.oneline);
        shown += 1;

        for parent in commit.parents() {
            if seen.insert(parent.target()) {
                queue.push((parent.height(), parent.target()));
            }
        }
    }
    db.close().await?;
    Ok(())
}

fn print_commit(hash: &Hash, commit: &Commit, oneline: bool) {
    if oneline {
        println!("{} {}", hash.short().yellow(), describe(commit.value()));
        return;
    }
    println!("{} {}", "commit".yellow(), hash.to_string().yellow());
    for parent in commit.parents() {
        println!("parent {}", parent.target().short().dimmed());
    }
    if let Some(meta) = commit.meta() {
        for (field, value) in &meta.fields {
            println!("{field}: {}", describe(value));
        }
    }
    println!("\n    {}\n", describe(commit.value()));
}

/// A one-line rendering of a value for humans.
fn describe(value: &Value) -> String {
    match value {
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => format!("{s:?}"),
        Value::Blob(b) => format!("<blob, {} bytes>", b.len()),
        Value::List(items) => format!("<list, {} items>", items.len()),
        Value::Set(items) => format!("<set, {} items>", items.len()),
        Value::Map(entries) => format!("<map, {} entries>", entries.len()),
        Value::Struct(s) => format!("<struct {}>", s.name),
        Value::Ref(r) => format!("#{}", r.target().short()),
    }
}

async fn cmd_sync(args: SyncArgs, auth: Option<String>) -> anyhow::Result<()> {
    let source = Database::new(connect(&args.source, auth.clone())?);
    let sink = Database::new(connect(&args.sink, auth)?);

    let (sink, result) = pull_dataset(&source, &sink, &args.dataset, args.concurrency).await?;
    let status = match result.status {
        PullStatus::UpToDate => "up to date".green(),
        PullStatus::FastForward => "fast-forwarded".green(),
        PullStatus::Created => "created".cyan(),
    };
    println!(
        "{} {}: {} ({} chunks, {} bytes copied)",
        "✓".green().bold(),
        args.dataset.bold(),
        status,
        result.stats.chunks_copied,
        result.stats.bytes_copied
    );
    source.close().await?;
    sink.close().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_types::{Ref, Struct};

    #[test]
    fn describe_is_one_line() {
        assert_eq!(describe(&Value::from("hi")), "\"hi\"");
        assert_eq!(describe(&Value::from(3)), "3");
        assert_eq!(describe(&Value::list([Value::from(1), Value::from(2)])), "<list, 2 items>");
        assert_eq!(describe(&Value::Struct(Struct::new("Point"))), "<struct Point>");
        let r = Ref::new(&Value::from("x"));
        assert_eq!(describe(&Value::Ref(r.clone())), format!("#{}", r.target().short()));
    }

    #[test]
    fn cli_parses_sync() {
        use clap::Parser;
        let cli = Cli::try_parse_from([
            "cairn", "sync", "http://a", "http://b", "notes", "--concurrency", "2",
        ])
        .unwrap();
        match cli.command {
            Command::Sync(args) => {
                assert_eq!(args.dataset, "notes");
                assert_eq!(args.concurrency, 2);
            }
            _ => panic!("expected sync"),
        }
    }
}
