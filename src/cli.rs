use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "keytree")]
#[command(about = "A keyboard-driven directory navigation overlay")]
pub struct Cli {
    /// Configuration file (defaults to <config dir>/keytree/config.toml)
    #[arg(long, global = true)]
    pub config: Option<String>,
    /// Log debug output to stderr for non-interactive commands
    #[arg(short, long, global = true)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Commands {
    /// Run the interactive overlay (default)
    Run {
        /// JSON tree definition (defaults to the built-in demo tree)
        #[arg(short, long)]
        tree: Option<String>,
    },
    /// Run a key script against a tree and print the resulting view as JSON
    Execute {
        /// JSON tree definition (defaults to the built-in demo tree)
        #[arg(short, long)]
        tree: Option<String>,
        /// Whitespace separated commands (e.g. "1 palette type:docs enter")
        #[arg(short = 'x', long)]
        keys: String,
        /// Output file for the resulting view (defaults to stdout)
        #[arg(short, long)]
        output: Option<String>,
        /// Also print a text rendering of the result
        #[arg(long)]
        screenshot: bool,
        /// Terminal width for the screenshot
        #[arg(long, default_value = "60")]
        width: u16,
        /// Terminal height for the screenshot
        #[arg(long, default_value = "18")]
        height: u16,
    },
    /// Rank the leaves of a tree against a query
    Search {
        /// JSON tree definition (defaults to the built-in demo tree)
        #[arg(short, long)]
        tree: Option<String>,
        query: String,
        /// Override the configured maximum number of results
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Check a tree definition and print its statistics
    Validate {
        /// JSON tree definition (defaults to the built-in demo tree)
        #[arg(short, long)]
        tree: Option<String>,
    },
}
