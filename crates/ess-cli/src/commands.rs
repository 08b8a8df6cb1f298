use std::sync::Arc;

use anyhow::Context;
use colored::Colorize;
use ess_metrics::{
    Collector, FnGauge, LogSink, MetricsError, MetricsReport, MetricsReporter, MetricsResult,
};
use ess_storage::{
    HolderCache, JsonFileBackend, MissingPolicy, PersistenceBackend, Revision, StorageError,
    StorageKey, StorageObjectHolder,
};
use serde_json::Value;
use tracing::debug;

use crate::cli::*;
use crate::config::EssConfig;
use crate::document::{parse_value, Document};
use crate::stats::StoreStats;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = EssConfig::resolve(&cli)?;
    if let Command::Config = cli.command {
        print!("{}", config.to_toml_string()?);
        return Ok(());
    }

    let store = Store::open(config)?;
    let result = match cli.command {
        Command::Get(args) => cmd_get(&store, args, &cli.format),
        Command::Set(args) => cmd_set(&store, args),
        Command::RemoveField(args) => cmd_remove_field(&store, args),
        Command::List(args) => cmd_list(&store, args, &cli.format),
        Command::Metrics(args) => cmd_metrics(&store, args, &cli.format),
        Command::Config => Ok(()),
    };
    finish(result, store.close())
}

/// The command's outcome, with a failed close attached rather than
/// replacing it.
fn finish(result: anyhow::Result<()>, closed: anyhow::Result<()>) -> anyhow::Result<()> {
    match (result, closed) {
        (Err(e), Err(close_err)) => Err(e.context(format!("closing the store also failed: {close_err:#}"))),
        (Err(e), Ok(())) => Err(e),
        (Ok(()), closed) => closed,
    }
}

/// Documents on disk plus the cache that mediates writes to them.
pub struct Store {
    backend: Arc<JsonFileBackend<Document>>,
    cache: Arc<HolderCache<Document>>,
    config: EssConfig,
}

impl Store {
    pub fn open(config: EssConfig) -> anyhow::Result<Self> {
        let backend = Arc::new(
            JsonFileBackend::<Document>::open(&config.data_dir)
                .with_context(|| format!("opening {}", config.data_dir.display()))?,
        );
        let cache = Arc::new(HolderCache::<Document>::new(backend.clone(), config.storage.clone()));
        Ok(Self {
            backend,
            cache,
            config,
        })
    }

    /// Snapshot a stored document without creating it.
    pub fn get(&self, key: &StorageKey) -> anyhow::Result<Option<(Revision, Document)>> {
        let Some(holder) = self.open_existing(key)? else {
            return Ok(None);
        };
        let guard = holder.read()?;
        let snapshot = (guard.revision(), Document::clone(&guard));
        guard.unlock();
        holder.close()?;
        Ok(Some(snapshot))
    }

    /// Set `field`, returning the value it replaced.
    pub fn set(&self, key: &StorageKey, field: &str, value: Value) -> anyhow::Result<Option<Value>> {
        let holder = self.cache.get_or_open(key)?;
        let mut guard = holder.write()?;
        let previous = guard.insert(field.to_string(), value);
        guard.unlock()?;
        self.cache.evict(key)?;
        Ok(previous)
    }

    /// Remove `field`. Returns `false` when the document or field is absent.
    pub fn remove_field(&self, key: &StorageKey, field: &str) -> anyhow::Result<bool> {
        let Some(holder) = self.open_existing(key)? else {
            return Ok(false);
        };
        let mut guard = holder.write()?;
        let removed = guard.contains_key(field);
        if removed {
            guard.remove(field);
        }
        guard.unlock()?;
        holder.close()?;
        Ok(removed)
    }

    pub fn list(&self, namespace: Option<&str>) -> anyhow::Result<Vec<StorageKey>> {
        let keys = self.backend.keys()?;
        Ok(keys
            .into_iter()
            .filter(|k| namespace.map_or(true, |ns| k.namespace() == ns))
            .collect())
    }

    pub fn reporter(&self) -> MetricsReporter {
        let mut collector = Collector::new();
        collector.register_gauge("Open Documents", self.cache.clone());
        let backend = self.backend.clone();
        collector.register_gauge(
            "Stored Documents",
            Arc::new(FnGauge(move || -> MetricsResult<u64> {
                Ok(backend.keys()?.len() as u64)
            })),
        );
        let stats = StoreStats::new(self.backend.clone(), self.config.server.clone());
        let sink = LogSink::new(self.config.metrics.endpoint.clone());
        MetricsReporter::new(
            self.config.metrics.clone(),
            Arc::new(stats),
            Arc::new(sink),
            collector,
        )
    }

    pub fn close(&self) -> anyhow::Result<()> {
        self.cache.close_all()?;
        Ok(())
    }

    fn open_existing(
        &self,
        key: &StorageKey,
    ) -> anyhow::Result<Option<StorageObjectHolder<Document>>> {
        let config = self
            .config
            .storage
            .clone()
            .with_missing_policy(MissingPolicy::Fail);
        match StorageObjectHolder::<Document>::open(key.clone(), self.backend.clone(), config) {
            Ok(holder) => Ok(Some(holder)),
            Err(StorageError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

fn parse_key(raw: &str) -> anyhow::Result<StorageKey> {
    raw.parse::<StorageKey>()
        .with_context(|| format!("invalid key {raw:?}"))
}

fn cmd_get(store: &Store, args: GetArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let key = parse_key(&args.key)?;
    let Some((revision, doc)) = store.get(&key)? else {
        anyhow::bail!("no document stored under {key}");
    };
    let value = match &args.field {
        Some(field) => doc
            .get(field)
            .cloned()
            .with_context(|| format!("{key} has no field {field:?}"))?,
        None => serde_json::to_value(&doc)?,
    };
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&value)?),
        OutputFormat::Text => {
            let modified = chrono::DateTime::from_timestamp_millis(revision.modified_ms as i64)
                .map(|t| t.to_rfc3339())
                .unwrap_or_default();
            println!(
                "{} r{} {}",
                key.to_string().bold(),
                revision.counter,
                modified.dimmed()
            );
            match value {
                Value::Object(fields) => {
                    for (name, v) in fields {
                        println!("  {} = {}", name.cyan(), v);
                    }
                }
                other => println!("  {}", other),
            }
        }
    }
    Ok(())
}

fn cmd_set(store: &Store, args: SetArgs) -> anyhow::Result<()> {
    let key = parse_key(&args.key)?;
    let value = parse_value(&args.value);
    let previous = store.set(&key, &args.field, value.clone())?;
    match previous {
        Some(old) => println!("{} {}.{}: {} -> {}", "✓".green().bold(), key, args.field.cyan(), old, value),
        None => println!("{} {}.{} = {}", "✓".green().bold(), key, args.field.cyan(), value),
    }
    Ok(())
}

fn cmd_remove_field(store: &Store, args: RemoveFieldArgs) -> anyhow::Result<()> {
    let key = parse_key(&args.key)?;
    if store.remove_field(&key, &args.field)? {
        println!("{} Removed {}.{}", "✓".green().bold(), key, args.field.cyan());
    } else {
        println!("{} {}.{} not present", "!".yellow().bold(), key, args.field);
    }
    Ok(())
}

fn cmd_list(store: &Store, args: ListArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let keys = store.list(args.namespace.as_deref())?;
    match format {
        OutputFormat::Json => {
            let keys: Vec<&str> = keys.iter().map(StorageKey::as_str).collect();
            println!("{}", serde_json::to_string_pretty(&keys)?);
        }
        OutputFormat::Text => {
            if keys.is_empty() {
                println!("No documents.");
            }
            for key in &keys {
                println!("{}:{}", key.namespace().dimmed(), key.id());
            }
        }
    }
    Ok(())
}

fn cmd_metrics(store: &Store, args: MetricsArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let reporter = store.reporter();
    let report = match reporter.collect() {
        Ok(report) => report,
        Err(MetricsError::OptedOut) => {
            println!("{} Metrics are opted out.", "!".yellow().bold());
            return Ok(());
        }
        Err(e) => {
            reporter.report_error(&e);
            return Err(e.into());
        }
    };
    print_report(&report, format)?;

    if args.submit {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        if let Err(e) = runtime.block_on(reporter.run_once()) {
            reporter.report_error(&e);
            return Err(e.into());
        }
        debug!(endpoint = %store.config.metrics.endpoint, "report submitted");
        println!("{} Submitted.", "✓".green().bold());
    }
    Ok(())
}

fn print_report(report: &MetricsReport, format: &OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
        OutputFormat::Text => {
            for graph in &report.graphs {
                println!("{}", graph.name.bold());
                for plotter in &graph.plotters {
                    println!("  {:<24} {}", plotter.name, plotter.value.to_string().yellow());
                }
            }
        }
    }
    Ok(())
}
