use clap::Parser;

mod cli;
mod commands;
mod config;
mod document;
mod stats;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();
    let cli = cli::Cli::parse();
    commands::run_command(cli)
}
