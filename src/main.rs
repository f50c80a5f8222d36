mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use metalite::config::{ensure_config_dir, ProfileStore, SavedConnection};
use metalite::error::AppResult;
use metalite::logging;
use metalite::query::{self, QueryOutput};
use metalite::ssh::{split_host_port, HostKeyPolicy, SessionConfig, SshSession};

use cli::{Cli, Command, ProfileCommand, TargetArgs};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "metalite=info,warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("error: {}", logging::sanitize(&format!("{e:#}")));
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Query { target, sql, raw } => {
            let (config, db_path) = resolve_target(&target)?;
            let mut session = connect(config)?;
            let result = query::run_query(&session, &db_path, &sql);
            session.disconnect();
            print_rows(&result?, raw)?;
        }
        Command::Tables { target } => {
            let (config, db_path) = resolve_target(&target)?;
            let mut session = connect(config)?;
            let result = query::list_tables(&session, &db_path);
            session.disconnect();
            for table in result? {
                println!("{table}");
            }
        }
        Command::Show {
            target,
            table,
            limit,
            raw,
        } => {
            let (config, db_path) = resolve_target(&target)?;
            let mut session = connect(config)?;
            let result = query::table_preview(&session, &db_path, &table, limit);
            session.disconnect();
            print_rows(&result?, raw)?;
        }
        Command::Ping { target } => {
            let (config, _) = resolve_target(&target)?;
            let mut session = connect(config)?;
            println!(
                "connected to {}@{}:{}",
                session.config().username,
                session.config().host,
                session.config().port
            );
            session.disconnect();
        }
        Command::Profile(cmd) => run_profile(cmd)?,
    }

    Ok(())
}

fn run_profile(cmd: ProfileCommand) -> AppResult<()> {
    let store = ProfileStore::open_default()?;

    match cmd {
        ProfileCommand::List => {
            let connections = store.load()?;
            if connections.is_empty() {
                println!("no saved connections");
            }
            for c in connections {
                println!("{}  {}  {}@{}  {}", c.id, c.name, c.user, c.host, c.db_path);
            }
        }
        ProfileCommand::Add {
            name,
            host,
            user,
            key,
            db,
            id,
        } => {
            let mut conn = SavedConnection::new(name, host, user, key, db);
            if let Some(id) = id {
                conn.id = id;
            }
            let id = conn.id.clone();
            store.save(conn)?;
            println!("{id}");
        }
        ProfileCommand::Remove { profile } => {
            let conn = store.find(&profile)?;
            store.delete(&conn.id)?;
            tracing::info!("Deleted profile {} ({})", conn.name, conn.id);
        }
        ProfileCommand::Show { profile } => {
            let conn = store.find(&profile)?;
            println!("{}", serde_json::to_string_pretty(&conn)?);
        }
    }

    Ok(())
}

/// Resolve CLI target flags (or a saved profile) into a session config
/// plus the remote database path.
fn resolve_target(args: &TargetArgs) -> Result<(SessionConfig, String)> {
    let (host, user, key_path, db_path) = if let Some(ref profile) = args.profile {
        let store = ProfileStore::open_default()?;
        let p = store.find(profile)?;
        (p.host, p.user, PathBuf::from(p.key_path), p.db_path)
    } else {
        (
            args.host
                .clone()
                .context("--host is required (or use --profile)")?,
            args.user
                .clone()
                .context("--user is required (or use --profile)")?,
            args.key
                .clone()
                .context("--key is required (or use --profile)")?,
            args.db
                .clone()
                .context("--db is required (or use --profile)")?,
        )
    };

    let (host, port) = split_host_port(&host, args.port);

    let host_key_policy = if args.insecure {
        HostKeyPolicy::Insecure
    } else if args.strict_host_key {
        HostKeyPolicy::Strict
    } else {
        HostKeyPolicy::AcceptNew
    };

    let config = SessionConfig {
        host,
        port,
        username: user,
        key_path,
        passphrase: args.passphrase.clone(),
        connect_timeout_secs: args.timeout,
        keepalive_interval: 20,
        host_key_policy,
    };

    Ok((config, db_path))
}

fn connect(config: SessionConfig) -> Result<SshSession> {
    let config_dir = ensure_config_dir()?;
    Ok(SshSession::connect(config, &config_dir)?)
}

fn print_rows(output: &QueryOutput, raw: bool) -> Result<()> {
    if raw {
        let trimmed = output.raw.trim_end();
        if !trimmed.is_empty() {
            println!("{trimmed}");
        }
    } else {
        println!("{}", serde_json::to_string_pretty(&output.rows)?);
    }
    Ok(())
}
