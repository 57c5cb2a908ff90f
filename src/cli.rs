use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "splitshell")]
#[command(about = "Split-pane generator shell: sites, prompts, characters, self-update", long_about = None)]
#[command(version)]
pub(crate) struct Cli {
    /// Install/data directory (default: SPLITSHELL_HOME, then the executable's directory)
    #[arg(long, global = true)]
    pub(crate) dir: Option<PathBuf>,

    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Check for and stage application updates.
    Update {
        #[command(subcommand)]
        command: UpdateCommand,
    },

    /// Manage the generator site list.
    Sites {
        #[command(subcommand)]
        command: SitesCommand,
    },

    /// Manage the prompt library.
    Prompts {
        #[command(subcommand)]
        command: PromptsCommand,
    },

    /// Manage the character name list.
    Characters {
        #[command(subcommand)]
        command: CharactersCommand,
    },

    /// Manage the mail site list.
    Mail {
        #[command(subcommand)]
        command: MailCommand,
    },

    /// Show or change window/ui settings.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Internal: finish a deferred update swap after the main process exits.
    #[command(hide = true, name = "swap-helper")]
    SwapHelper {
        #[arg(long)]
        install_dir: PathBuf,
        #[arg(long)]
        program_name: String,
        #[arg(long)]
        config_name: String,
    },
}

#[derive(Subcommand)]
pub(crate) enum UpdateCommand {
    /// Compare the local version against the remote manifest; stage with --yes.
    Check {
        /// Download and stage the update when one is available.
        #[arg(long)]
        yes: bool,
        /// Override the remote manifest URL.
        #[arg(long)]
        manifest_url: Option<String>,
        /// Override the remote payload URL.
        #[arg(long)]
        payload_url: Option<String>,
    },
}

#[derive(Subcommand)]
pub(crate) enum SitesCommand {
    /// List sites in the working set.
    List,
    /// Add a site (deduplicated by base domain; https:// assumed).
    Add { url: String },
    /// Remove the site with this id, plus any others on the same base domain.
    Remove { id: u32 },
    /// Replace the working set with the shipped defaults.
    Restore {
        #[arg(long)]
        yes: bool,
    },
    /// Empty the working set (defaults are untouched).
    Clear {
        #[arg(long)]
        yes: bool,
    },
    /// Replace the working set from a JSON file.
    Import { file: PathBuf },
    /// Write the working set to a JSON file.
    Export { file: PathBuf },
}

#[derive(Subcommand)]
pub(crate) enum PromptsCommand {
    /// List prompts, optionally filtered by category.
    List {
        #[arg(short, long)]
        category: Option<String>,
    },
    /// List prompt categories in first-appearance order.
    Categories,
    /// Print one prompt in full.
    Show { id: String },
    /// Add a prompt.
    Add {
        /// Prompt text; empty "" pairs are fill slots.
        text: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        category: Option<String>,
        /// Tag (repeatable).
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// Remove a prompt by id (explicit or derived).
    Remove { id: String },
    /// Edit a prompt's title, category or text.
    Edit {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        text: Option<String>,
    },
    /// Substitute fill slots in a prompt and print the result.
    Render {
        id: String,
        /// Named fill value in priority order (repeatable; first four apply).
        #[arg(long = "name")]
        names: Vec<String>,
        /// Leave every slot empty instead of applying named fills.
        #[arg(long)]
        no_names: bool,
        /// Manual fill for a remaining slot (repeatable, left to right).
        #[arg(long = "fill")]
        fills: Vec<String>,
    },
    /// Replace the working set with the shipped defaults.
    Restore {
        #[arg(long)]
        yes: bool,
    },
    /// Empty the working set (defaults are untouched).
    Clear {
        #[arg(long)]
        yes: bool,
    },
    /// Replace the working set from a JSON file ({"prompts": [...]}).
    Import { file: PathBuf },
    /// Write the working set to a JSON file.
    Export { file: PathBuf },
}

#[derive(Subcommand)]
pub(crate) enum CharactersCommand {
    /// List character names with their base-layer categories.
    List,
    /// Add a character name (sanitized; duplicates ignored case-insensitively).
    Add { name: String },
    /// Remove a character name (case-insensitive match).
    Remove { name: String },
    /// Replace the working set with the shipped defaults.
    Restore {
        #[arg(long)]
        yes: bool,
    },
    /// Empty the working set (defaults are untouched).
    Clear {
        #[arg(long)]
        yes: bool,
    },
    /// Replace the working set from a JSON file.
    Import { file: PathBuf },
    /// Write the working set to a JSON file.
    Export { file: PathBuf },
}

#[derive(Subcommand)]
pub(crate) enum MailCommand {
    /// List mail site URLs.
    List,
    /// Add a mail site URL (https:// assumed; duplicates ignored).
    Add { url: String },
    /// Remove a mail site URL.
    Remove { url: String },
    /// Replace the working set with the shipped defaults.
    Restore {
        #[arg(long)]
        yes: bool,
    },
    /// Empty the working set (defaults are untouched).
    Clear {
        #[arg(long)]
        yes: bool,
    },
    /// Replace the working set from a JSON file.
    Import { file: PathBuf },
    /// Write the working set to a JSON file.
    Export { file: PathBuf },
}

#[derive(Subcommand)]
pub(crate) enum ConfigCommand {
    /// Print the effective window/ui settings as JSON.
    Show,
    /// Change window/ui settings and persist them.
    Set {
        #[arg(long)]
        width: Option<u32>,
        #[arg(long)]
        height: Option<u32>,
        #[arg(long)]
        fullscreen: Option<bool>,
        /// Pane layout: horizontal | vertical
        #[arg(long)]
        orientation: Option<String>,
        #[arg(long)]
        pane_ratio: Option<f64>,
        #[arg(long)]
        window_title: Option<String>,
        #[arg(long)]
        mail_url: Option<String>,
        #[arg(long)]
        download_path: Option<String>,
    },
}
