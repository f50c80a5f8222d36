use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "metalite", version, about = "Query remote SQLite databases over SSH")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a SQL query against the remote database
    Query {
        #[command(flatten)]
        target: TargetArgs,
        /// SQL to execute remotely
        sql: String,
        /// Print the raw sqlite3 output instead of pretty JSON
        #[arg(long)]
        raw: bool,
    },
    /// List tables in the remote database
    Tables {
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Preview the first rows of a table
    Show {
        #[command(flatten)]
        target: TargetArgs,
        /// Table name
        table: String,
        /// Maximum number of rows
        #[arg(long, default_value_t = 100)]
        limit: u32,
        /// Print the raw sqlite3 output instead of pretty JSON
        #[arg(long)]
        raw: bool,
    },
    /// Check that the SSH connection and authentication work
    Ping {
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Manage saved connection profiles
    #[command(subcommand)]
    Profile(ProfileCommand),
}

/// Where to connect: a saved profile, or an explicit host/user/key/db
#[derive(Debug, Args)]
pub struct TargetArgs {
    /// Saved profile name or id
    #[arg(short, long, conflicts_with_all = ["host", "user", "key", "db"])]
    pub profile: Option<String>,

    /// Remote host (optionally host:port)
    #[arg(long)]
    pub host: Option<String>,

    /// SSH username
    #[arg(long)]
    pub user: Option<String>,

    /// Path to the SSH private key file
    #[arg(long)]
    pub key: Option<PathBuf>,

    /// Passphrase for an encrypted private key
    #[arg(long)]
    pub passphrase: Option<String>,

    /// Remote SQLite database path
    #[arg(long)]
    pub db: Option<String>,

    /// SSH port (a :port suffix on the host wins)
    #[arg(long, default_value_t = 22)]
    pub port: u16,

    /// Connect timeout in seconds
    #[arg(long, default_value_t = 30)]
    pub timeout: u64,

    /// Skip host key verification
    #[arg(long, conflicts_with = "strict_host_key")]
    pub insecure: bool,

    /// Reject unknown host keys instead of trusting them on first use
    #[arg(long)]
    pub strict_host_key: bool,
}

#[derive(Debug, Subcommand)]
pub enum ProfileCommand {
    /// List saved connections
    List,
    /// Save a connection (replaces an existing one with the same id)
    Add {
        /// Display name
        name: String,
        #[arg(long)]
        host: String,
        #[arg(long)]
        user: String,
        /// Path to the SSH private key file
        #[arg(long)]
        key: String,
        /// Remote SQLite database path
        #[arg(long)]
        db: String,
        /// Reuse an existing id to update a profile in place
        #[arg(long)]
        id: Option<String>,
    },
    /// Delete a saved connection by name or id
    Remove { profile: String },
    /// Print a saved connection as JSON
    Show { profile: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_profile_conflicts_with_manual_target() {
        let res = Cli::try_parse_from([
            "metalite",
            "query",
            "--profile",
            "prod",
            "--host",
            "db.internal",
            "SELECT 1;",
        ]);
        assert!(res.is_err());
    }

    #[test]
    fn test_query_parses_with_profile() {
        let cli = Cli::try_parse_from(["metalite", "query", "-p", "prod", "SELECT 1;"]).unwrap();
        match cli.command {
            Command::Query { target, sql, raw } => {
                assert_eq!(target.profile.as_deref(), Some("prod"));
                assert_eq!(sql, "SELECT 1;");
                assert!(!raw);
            }
            other => panic!("expected query command, got {other:?}"),
        }
    }

    #[test]
    fn test_passphrase_flag() {
        let cli = Cli::try_parse_from([
            "metalite",
            "ping",
            "--host",
            "db.internal",
            "--user",
            "deploy",
            "--key",
            "/tmp/id_rsa",
            "--db",
            "/var/data/app.db",
            "--passphrase",
            "hunter2",
        ])
        .unwrap();
        match cli.command {
            Command::Ping { target } => {
                assert_eq!(target.passphrase.as_deref(), Some("hunter2"));
            }
            other => panic!("expected ping command, got {other:?}"),
        }
    }

    #[test]
    fn test_show_defaults_limit() {
        let cli = Cli::try_parse_from(["metalite", "show", "-p", "prod", "users"]).unwrap();
        match cli.command {
            Command::Show { table, limit, .. } => {
                assert_eq!(table, "users");
                assert_eq!(limit, 100);
            }
            other => panic!("expected show command, got {other:?}"),
        }
    }
}
