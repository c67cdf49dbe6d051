//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::app::config::SecretSource;

/// Deliver e-books to a reading device by mail.
///
/// Bookrelay resolves a catalog page to its ISBN, finds a verified copy on a
/// live mirror (or through the paid API when no mirror answers) and mails it
/// to the given address.
#[derive(Parser, Debug)]
#[command(name = "bookrelay")]
#[command(author, version, about, arg_required_else_help = true)]
pub struct Cli {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (default: $XDG_CONFIG_HOME/bookrelay/config.toml)
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Also write logs to this file
    #[arg(long, value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,

    /// Where to load credentials from
    #[arg(long, value_enum, global = true)]
    pub secrets: Option<SecretSource>,

    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch one book and mail it
    Fetch(FetchArgs),
    /// Serve the HTTP trigger endpoint
    Serve(ServeArgs),
}

/// Arguments of `fetch`.
#[derive(Args, Debug)]
pub struct FetchArgs {
    /// Catalog page of the book (for example a Goodreads book page)
    pub source_url: String,

    /// Device mailbox to deliver to
    pub recipient: String,

    /// Directory the browser downloads into
    #[arg(long, value_name = "DIR")]
    pub download_dir: Option<PathBuf>,

    /// Show the browser window
    #[arg(long)]
    pub headed: bool,
}

/// Arguments of `serve`.
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to bind (default 0.0.0.0)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind (default 19191)
    #[arg(long, short)]
    pub port: Option<u16>,
}
