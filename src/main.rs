//! sftp-batch CLI - upload, check and delete remote files over SFTP.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use sftp_batch::{logging, ConnectionParameters, ConnectionProfile, SftpClient, TransferUnit};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sftp-batch")]
#[command(about = "Batch SFTP uploads, existence checks and recursive deletes")]
#[command(version)]
struct Cli {
    /// TOML connection profile
    #[arg(long)]
    profile: Option<PathBuf>,

    /// Remote host
    #[arg(long, env = "SFTP_BATCH_HOST")]
    host: Option<String>,

    /// Remote port
    #[arg(short, long, env = "SFTP_BATCH_PORT")]
    port: Option<u16>,

    /// Remote user (defaults to the local user)
    #[arg(short, long, env = "SFTP_BATCH_USER")]
    user: Option<String>,

    /// Name of the environment variable holding the password
    #[arg(long, default_value = "SFTP_BATCH_PASSWORD")]
    password_env: String,

    /// Accept host keys missing from ~/.ssh/known_hosts
    #[arg(long)]
    trust_unknown_hosts: bool,

    /// Verbose output (debug logging)
    #[arg(short, long)]
    verbose: bool,

    /// Disable logging entirely
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload local files, given as LOCAL:REMOTE pairs
    Upload {
        #[arg(required = true)]
        pairs: Vec<String>,

        /// Files per task; below 2 uploads everything in one task
        #[arg(short, long, default_value = "0")]
        batch_size: usize,

        /// Seconds to wait; below 1 allows one hour per file
        #[arg(short, long, default_value = "0", allow_negative_numbers = true)]
        timeout: i64,
    },
    /// Check that every remote path exists
    Check {
        #[arg(required = true)]
        paths: Vec<String>,
    },
    /// Recursively delete remote paths
    Delete {
        #[arg(required = true)]
        paths: Vec<String>,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn parse_pair(pair: &str) -> Result<TransferUnit> {
    match pair.split_once(':') {
        Some((local, remote)) if !local.is_empty() && !remote.is_empty() => {
            Ok(TransferUnit::new(local, remote))
        }
        _ => bail!("Expected LOCAL:REMOTE, got '{}'", pair),
    }
}

fn connection_parameters(cli: &Cli) -> Result<ConnectionParameters> {
    let mut builder = ConnectionParameters::builder();

    if let Some(ref path) = cli.profile {
        let profile = ConnectionProfile::load(path)
            .with_context(|| format!("Failed to load profile {}", path.display()))?;
        builder = profile.apply(builder);
    }
    if let Some(ref host) = cli.host {
        builder = builder.host(host.clone());
    }
    if let Some(port) = cli.port {
        builder = builder.port(port);
    }
    if let Some(ref user) = cli.user {
        builder = builder.username(user.clone());
    }
    builder = builder.password_from_env(&cli.password_env);
    if cli.trust_unknown_hosts {
        builder = builder.trust_unknown_hosts();
    }

    Ok(builder.create()?)
}

fn run(cli: Cli) -> Result<bool> {
    let params = connection_parameters(&cli)?;
    let client = SftpClient::new(params);

    let ok = match cli.command {
        Commands::Upload {
            pairs,
            batch_size,
            timeout,
        } => {
            let units = pairs
                .iter()
                .map(|p| parse_pair(p))
                .collect::<Result<Vec<_>>>()?;
            client.upload_batched(units, batch_size, timeout)?
        }
        Commands::Check { paths } => client.check_files(&paths),
        Commands::Delete { paths } => client.delete(&paths),
    };
    Ok(ok)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    init_tracing(cli.verbose);
    logging::init();
    if cli.quiet {
        logging::set_enabled(false);
    }

    match run(cli) {
        Ok(true) => {
            println!("{}", "OK".green().bold());
            ExitCode::SUCCESS
        }
        Ok(false) => {
            println!("{}", "FAILED (see log for details)".red().bold());
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}
