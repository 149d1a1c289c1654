use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use fleetwatch::model::DaemonName;

#[derive(Parser, Debug)]
#[command(name = "fleetwatch")]
#[command(about = "Track configuration-derived state of Kea DHCP daemons")]
pub struct Cli {
    /// Settings file. Built-in defaults are used when omitted.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// State database, overriding the settings file.
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(clap::Subcommand, Debug)]
pub enum Command {
    /// Show parsed structure of a single configuration file.
    Inspect(InspectArgs),
    /// Show HA peers, log targets and subnets read from one configuration.
    Facts(FactsArgs),
    /// Register an app and its daemons.
    AddApp(AddAppArgs),
    /// Apply a configuration file to a registered daemon.
    Refresh(RefreshArgs),
    /// List detected HA services.
    Services(ServicesArgs),
    /// Check whether a daemon's log file may be viewed.
    LogAllowed(LogAllowedArgs),
    /// Record a review of a daemon's configuration.
    Review(ReviewArgs),
}

#[derive(Clone, Copy, Debug, ValueEnum, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
pub struct InspectArgs {
    pub file: PathBuf,
    /// Only show the subtree under this top-level key.
    #[arg(long)]
    pub section: Option<String>,
    #[arg(long, default_value_t = 3)]
    pub depth: usize,
    /// Mask passwords, secrets and tokens.
    #[arg(long)]
    pub redact: bool,
}

#[derive(Parser, Debug)]
pub struct FactsArgs {
    pub file: PathBuf,
    /// Daemon kind. Derived from the configuration root when omitted.
    #[arg(long)]
    pub daemon: Option<DaemonName>,
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Parser, Debug)]
pub struct AddAppArgs {
    #[arg(long)]
    pub name: String,
    /// Control agent URL, e.g. http://192.0.2.1:8000/.
    #[arg(long)]
    pub control_url: String,
    /// Daemon hosted by the app. May be repeated.
    #[arg(long = "daemon", required = true)]
    pub daemons: Vec<DaemonName>,
}

#[derive(Parser, Debug)]
pub struct RefreshArgs {
    #[arg(long)]
    pub daemon_id: i64,
    /// Configuration file as reported by the daemon.
    pub file: PathBuf,
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    /// Re-read the daemon and try again this many times when another writer
    /// got in first.
    #[arg(long, default_value_t = 2)]
    pub retries: u32,
}

#[derive(Parser, Debug)]
pub struct ServicesArgs {
    /// Only show services this daemon belongs to.
    #[arg(long)]
    pub daemon_id: Option<i64>,
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Parser, Debug)]
pub struct LogAllowedArgs {
    #[arg(long)]
    pub daemon_id: i64,
    pub path: String,
}

#[derive(Parser, Debug)]
pub struct ReviewArgs {
    #[arg(long)]
    pub daemon_id: i64,
    /// Configuration hash the review was based on. Defaults to the stored one.
    #[arg(long)]
    pub hash: Option<String>,
    /// Number of issues the review reported.
    #[arg(long, default_value_t = 0)]
    pub reports: u32,
}
