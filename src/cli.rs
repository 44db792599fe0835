use clap::{Parser, Subcommand, ValueEnum};
use costdash::humanize::HumanDuration;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "costdash")]
#[command(about = "Cloud cost dashboard client", long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to $COSTDASH_CONFIG or config/costdash.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch an endpoint and print the decoded JSON
    Get(GetArgs),
    /// Issue a POST, PUT or DELETE request
    Send(SendArgs),
    /// Trigger a resource scan and follow its progress
    Scan(ScanArgs),
    /// Inspect or change persisted preferences
    #[command(subcommand)]
    Prefs(PrefsCommand),
}

#[derive(clap::Args, Debug)]
pub struct TargetArgs {
    /// Query parameter, repeatable
    #[arg(short = 'p', long = "param", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    pub params: Vec<(String, String)>,

    /// Account override (beats the remembered account)
    #[arg(long)]
    pub account: Option<String>,

    #[arg(long)]
    pub locale: Option<String>,

    /// Total attempts
    #[arg(long)]
    pub retries: Option<u32>,

    /// Per-attempt deadline, e.g. "500ms" or "30s"
    #[arg(long)]
    pub timeout: Option<HumanDuration>,
}

#[derive(clap::Args, Debug)]
pub struct GetArgs {
    pub endpoint: String,

    #[command(flatten)]
    pub target: TargetArgs,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum MutationMethod {
    Post,
    Put,
    Delete,
}

#[derive(clap::Args, Debug)]
pub struct SendArgs {
    #[arg(value_enum)]
    pub method: MutationMethod,

    pub endpoint: String,

    /// JSON request body
    #[arg(long)]
    pub body: Option<String>,

    #[command(flatten)]
    pub target: TargetArgs,
}

#[derive(clap::Args, Debug)]
pub struct ScanArgs {
    pub account: String,

    /// Ignore cached scan results
    #[arg(long)]
    pub force: bool,
}

#[derive(Subcommand, Debug)]
pub enum PrefsCommand {
    Show,
    Set {
        #[arg(long)]
        account: Option<String>,

        #[arg(long)]
        locale: Option<String>,
    },
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected KEY=VALUE, got `{}`", s))
}
