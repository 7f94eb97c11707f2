use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "folio", version)]
#[command(about = "Inspect and maintain a folio page revision store", long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to folio.toml in the platform config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Report what purge commands would delete without deleting anything
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List the live revisions of a page, newest first
    History {
        /// Page name or navigation key
        page: String,
        #[command(flatten)]
        paging: PagingArgs,
    },
    /// List the files attached to a page
    Attachments {
        /// Page name or navigation key
        page: String,
        /// Page revision to inspect (defaults to the current one)
        #[arg(long)]
        revision: Option<u32>,
    },
    /// Find or delete file revisions no page revision links to
    Orphans {
        #[command(subcommand)]
        command: OrphanCommand,
    },
    /// Inspect, restore or purge archived pages
    Archive {
        #[command(subcommand)]
        command: ArchiveCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum OrphanCommand {
    List {
        #[command(flatten)]
        paging: PagingArgs,
    },
    /// Delete one orphan, or every orphan when no file is given
    Purge {
        #[arg(long, requires = "revision")]
        file_id: Option<i64>,
        #[arg(long, requires = "file_id")]
        revision: Option<u32>,
    },
}

#[derive(Debug, Subcommand)]
pub enum ArchiveCommand {
    List {
        #[command(flatten)]
        paging: PagingArgs,
    },
    Restore {
        id: i64,
    },
    Purge {
        id: i64,
    },
}

#[derive(Debug, Clone, Copy, Args)]
pub struct PagingArgs {
    #[arg(long, default_value_t = 0)]
    pub offset: u32,
    #[arg(long, default_value_t = 50)]
    pub limit: u32,
}
impl From<PagingArgs> for folio_store::models::Paging {
    fn from(args: PagingArgs) -> Self {
        Self::new(args.offset, args.limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[rstest]
    #[case(&["folio", "history", "Help::Intro"])]
    #[case(&["folio", "attachments", "a", "--revision", "3"])]
    #[case(&["folio", "orphans", "purge"])]
    #[case(&["folio", "orphans", "purge", "--file-id", "4", "--revision", "1"])]
    #[case(&["folio", "--dry-run", "archive", "purge", "7"])]
    #[case(&["folio", "archive", "list", "--limit", "10", "-vv"])]
    fn test_accepted(#[case] args: &[&str]) {
        Cli::try_parse_from(args).unwrap();
    }

    #[rstest]
    #[case(&["folio"])]
    #[case(&["folio", "orphans", "purge", "--file-id", "4"])]
    #[case(&["folio", "archive", "restore", "seven"])]
    fn test_rejected(#[case] args: &[&str]) {
        assert!(Cli::try_parse_from(args).is_err());
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::try_parse_from(["folio", "orphans", "list", "--dry-run", "-v"]).unwrap();
        assert!(cli.dry_run);
        assert_eq!(cli.verbose, 1);
        let Command::Orphans { command: OrphanCommand::List { paging } } = cli.command else {
            panic!("unexpected command");
        };
        assert_eq!((paging.offset, paging.limit), (0, 50));
    }
}
