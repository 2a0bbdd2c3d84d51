use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "fidx",
    about = "fidx: indexed file listings over a key-value object store",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Root of the directory-backed record store
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// TOML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the HTTP server
    Serve(ServeArgs),
    /// List records, from the index when available
    List(ListArgs),
    /// Rebuild the index from a full store scan
    Rebuild,
    /// Fold pending operations into the index
    Merge,
    /// Discard every pending operation
    PurgeOperations,
    /// Show index freshness and backlog
    Info,
    /// Show the persisted index footprint
    Stats,
    /// Store a record and log it for the next merge
    Put(PutArgs),
    /// Delete a record and log it for the next merge
    Delete(DeleteArgs),
}

#[derive(Args)]
pub struct ServeArgs {
    /// Override the configured bind address
    #[arg(long)]
    pub bind: Option<SocketAddr>,
}

/// Filter options; values are validated the same way as HTTP parameters.
#[derive(Args)]
pub struct ListArgs {
    #[arg(long)]
    pub dir: Option<String>,
    #[arg(long)]
    pub search: Option<String>,
    #[arg(long)]
    pub start: Option<String>,
    /// Page size; -1 for all
    #[arg(long, allow_hyphen_values = true)]
    pub count: Option<String>,
    /// Include files in subdirectories
    #[arg(short, long)]
    pub recursive: bool,
    #[arg(long)]
    pub channel: Option<String>,
    #[arg(long)]
    pub list_type: Option<String>,
    /// Comma-separated tags that must all be present
    #[arg(long)]
    pub include_tags: Option<String>,
    /// Comma-separated tags that must all be absent
    #[arg(long)]
    pub exclude_tags: Option<String>,
    /// Only print the number of matching records
    #[arg(long)]
    pub sum: bool,
    /// Skip the index and scan the store directly
    #[arg(long)]
    pub scan: bool,
}

#[derive(Args)]
pub struct PutArgs {
    pub id: String,
    #[arg(long = "tag")]
    pub tags: Vec<String>,
    #[arg(long)]
    pub file_type: Option<String>,
    #[arg(long)]
    pub channel: Option<String>,
    #[arg(long)]
    pub list_type: Option<String>,
    /// File whose contents become the record value
    #[arg(long)]
    pub from_file: Option<PathBuf>,
}

#[derive(Args)]
pub struct DeleteArgs {
    pub id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_list_with_negative_count() {
        let cli = Cli::try_parse_from([
            "fidx", "--format", "json", "list", "--dir", "docs", "--count", "-1", "--sum",
        ])
        .unwrap();
        assert_eq!(cli.format, OutputFormat::Json);
        match cli.command {
            Command::List(args) => {
                assert_eq!(args.count.as_deref(), Some("-1"));
                assert!(args.sum);
                assert_eq!(args.dir.as_deref(), Some("docs"));
            }
            _ => panic!("expected list"),
        }
    }

    #[test]
    fn parses_put_with_tags() {
        let cli = Cli::try_parse_from([
            "fidx", "--data-dir", "/tmp/x", "put", "img/a.png", "--tag", "a", "--tag", "b",
        ])
        .unwrap();
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/x")));
        match cli.command {
            Command::Put(args) => assert_eq!(args.tags, vec!["a", "b"]),
            _ => panic!("expected put"),
        }
    }
}
