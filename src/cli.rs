use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

#[derive(Parser)]
#[command(name = "aapsync")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Populate, clean up and download AWX / AAP controller resources", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Controller connection flags. Each falls back to its env var, then to
/// `config.toml`, then to the built-in default.
#[derive(Args, Debug, Clone, Default)]
pub struct ConnectionArgs {
    /// Controller base URL
    #[arg(long, env = "AWX_HOST", global = true)]
    pub host: Option<String>,

    /// API prefix (use /api/controller/v2/ behind a platform gateway)
    #[arg(long, env = "AWX_API_PREFIX", global = true)]
    pub api_prefix: Option<String>,

    /// Username for basic auth
    #[arg(long, env = "AWX_USERNAME", global = true)]
    pub username: Option<String>,

    /// Password for basic auth
    #[arg(long, env = "AWX_PASSWORD", global = true, hide_env_values = true)]
    pub password: Option<String>,

    /// OAuth2 token (takes precedence over username/password)
    #[arg(long, env = "AWX_TOKEN", global = true, hide_env_values = true)]
    pub token: Option<String>,

    /// Verify TLS certificates
    #[arg(long, global = true)]
    pub verify_tls: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create every declared resource in dependency order
    Populate(PopulateArgs),

    /// Delete declared resources in reverse dependency order
    Cleanup(CleanupArgs),

    /// Download workflow/job templates and everything they reference
    Download(DownloadArgs),

    /// Show the provisioning order and each kind's dependencies
    Kinds,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Populate
// ============================================================================

#[derive(Args)]
pub struct PopulateArgs {
    /// Manifest file (defaults to manifest.toml in the config dir, then the built-in sample)
    #[arg(short, long)]
    pub manifest: Option<String>,

    /// Don't wait for project syncs to finish
    #[arg(long)]
    pub no_wait: bool,

    /// Give up waiting for project syncs after this many seconds
    #[arg(long, value_name = "SECS")]
    pub sync_timeout: Option<u64>,

    /// Seconds between project status polls
    #[arg(long, value_name = "SECS")]
    pub poll_interval: Option<u64>,
}

// ============================================================================
// Cleanup
// ============================================================================

#[derive(Args)]
pub struct CleanupArgs {
    /// Manifest file (defaults to manifest.toml in the config dir, then the built-in sample)
    #[arg(short, long, conflicts_with = "all_non_default")]
    pub manifest: Option<String>,

    /// Delete everything that is neither protected nor managed
    #[arg(long)]
    pub all_non_default: bool,

    /// Skip confirmation prompts
    #[arg(short, long)]
    pub yes: bool,
}

// ============================================================================
// Download
// ============================================================================

#[derive(Args)]
pub struct DownloadArgs {
    /// Output directory
    #[arg(short, long, default_value = "./aap_assets")]
    pub output: String,

    /// Workflow job template id to start from (repeatable)
    #[arg(long = "workflow", value_name = "ID")]
    pub workflows: Vec<u64>,

    /// Job template id to start from (repeatable)
    #[arg(long = "job-template", value_name = "ID")]
    pub job_templates: Vec<u64>,
}

impl DownloadArgs {
    /// Whether explicit roots were given.
    pub fn has_roots(&self) -> bool {
        !self.workflows.is_empty() || !self.job_templates.is_empty()
    }
}
