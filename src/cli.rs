use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

#[derive(Debug, Parser)]
#[command(
    name = "aventine",
    about = "Incremental lemma indexing and semantic search for classical texts"
)]
pub struct Cli {
    /// Override the XDG data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Index a document from sources/<key>.txt, resuming if interrupted
    Index(IndexArgs),
    /// Search lemmata by meaning
    Search(SearchArgs),
    /// Show indexing progress and statistics
    Status(StatusArgs),
    /// Manage installation settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Print the lemmatised text of an indexed document
    ExportLemmatised(ExportArgs),
    /// Start MCP server for AI agent integration
    Mcp,
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

// -- Index --

#[derive(Debug, Parser)]
pub struct IndexArgs {
    /// Document key
    pub key: String,

    /// Disable the progress bar
    #[arg(long)]
    pub no_progress: bool,
}

// -- Search --

#[derive(Debug, Parser)]
pub struct SearchArgs {
    /// Query text
    pub query: String,

    /// Query language: "target" (definitions) or "source" (lemmata)
    #[arg(short, long, default_value = "target")]
    pub language: String,

    /// Restrict hits to a document (repeatable)
    #[arg(short, long = "document")]
    pub documents: Vec<String>,

    /// Accept hits that occur in no document
    #[arg(long, conflicts_with = "documents")]
    pub anywhere: bool,

    /// Number of results
    #[arg(short = 'n', long, default_value_t = 50)]
    pub count: usize,

    /// Embedding space for source queries: "universal" or a document key
    #[arg(long, default_value = "universal")]
    pub scope: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Config --

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Print a setting
    Get {
        /// Setting name
        name: String,
    },
    /// Store a setting
    Set {
        /// Setting name
        name: String,
        /// Value
        value: String,
    },
    /// Remove a setting
    Unset {
        /// Setting name
        name: String,
    },
    /// List stored settings
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

// -- Export --

#[derive(Debug, Parser)]
pub struct ExportArgs {
    /// Document key
    pub key: String,

    /// Write to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

// -- Status --

#[derive(Debug, Parser)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Completions --

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate shell completions and print to stdout.
    pub fn generate(&self) {
        let mut cmd = Cli::command();
        clap_complete::generate(
            self.shell,
            &mut cmd,
            "aventine",
            &mut std::io::stdout(),
        );
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn parse_search_defaults() {
        let cli = Cli::parse_from(["aventine", "search", "love"]);
        match cli.command {
            Command::Search(args) => {
                assert_eq!(args.query, "love");
                assert_eq!(args.language, "target");
                assert!(args.documents.is_empty());
                assert!(!args.anywhere);
                assert_eq!(args.count, 50);
                assert_eq!(args.scope, "universal");
                assert!(!args.json);
            }
            _ => panic!("expected search command"),
        }
    }

    #[test]
    fn parse_repeated_documents() {
        let cli = Cli::parse_from([
            "aventine", "search", "amor", "-l", "source", "-d", "aeneid", "-d",
            "georgics", "-n", "5",
        ]);
        match cli.command {
            Command::Search(args) => {
                assert_eq!(args.language, "source");
                assert_eq!(args.documents, vec!["aeneid", "georgics"]);
                assert_eq!(args.count, 5);
            }
            _ => panic!("expected search command"),
        }
    }

    #[test]
    fn parse_export_and_config() {
        let cli = Cli::parse_from(["aventine", "export-lemmatised", "aeneid"]);
        assert!(matches!(cli.command, Command::ExportLemmatised(ref a) if a.key == "aeneid"));

        let cli = Cli::parse_from(["aventine", "-q", "config", "set", "dimension", "32"]);
        assert!(cli.quiet);
        assert!(matches!(
            cli.command,
            Command::Config {
                action: ConfigAction::Set { .. }
            }
        ));
    }

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }
}
