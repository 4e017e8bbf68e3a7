use clap::Parser;
use std::path::PathBuf;

/// Terminal client for realtime chat rooms.
#[derive(Parser, Debug, Default)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to configuration file.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Path to the document store database (`:memory:` for a throwaway store).
    #[arg(long)]
    pub db: Option<PathBuf>,
    /// Keep everything in memory.
    #[arg(long)]
    pub memory: bool,
    /// Enable or disable logging (true/false).
    #[arg(long)]
    pub logging: Option<bool>,
    /// Interval in milliseconds for noticing writes from other processes.
    #[arg(long)]
    pub poll_ms: Option<u64>,
}
