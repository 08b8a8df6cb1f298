use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "ess",
    about = "Inspect and edit the Essentials document store",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Overrides `data_dir` from the configuration file
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Lock timeout in milliseconds; 0 waits forever
    #[arg(long, global = true)]
    pub lock_timeout_ms: Option<u64>,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print a document, or one field of it
    Get(GetArgs),
    /// Set a field on a document, creating the document if needed
    Set(SetArgs),
    /// Remove a field from a document
    RemoveField(RemoveFieldArgs),
    /// List stored document keys
    List(ListArgs),
    /// Collect and print one usage-statistics report
    Metrics(MetricsArgs),
    /// Print the effective configuration
    Config,
}

#[derive(Args)]
pub struct GetArgs {
    /// Document key, `namespace:id`
    pub key: String,
    pub field: Option<String>,
}

#[derive(Args)]
pub struct SetArgs {
    pub key: String,
    pub field: String,
    /// JSON value; anything that does not parse is stored as a string
    pub value: String,
}

#[derive(Args)]
pub struct RemoveFieldArgs {
    pub key: String,
    pub field: String,
}

#[derive(Args)]
pub struct ListArgs {
    /// Only keys in this namespace
    pub namespace: Option<String>,
}

#[derive(Args)]
pub struct MetricsArgs {
    /// Also submit the report to the configured log sink
    #[arg(long)]
    pub submit: bool,
}
