//! rivulet server entry point.

use rivulet::server::replication;
use rivulet::{persistence, Config, Server, VERSION};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let cli = match parse_args(&args) {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    if cli.help {
        print_help();
        return Ok(());
    }
    if cli.version {
        println!("rivulet {VERSION}");
        return Ok(());
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_target(false).init();

    let config = cli.config;
    let server = Arc::new(Server::new(config.clone()));

    // Load the startup snapshot when both --dir and --dbfilename are given
    // and the file exists. A parse failure is logged, not fatal.
    if let Some(path) = config.snapshot_path() {
        if path.exists() {
            match persistence::load_file(&path, server.kv()) {
                Ok(stats) => info!(
                    path = %path.display(),
                    keys = stats.keys,
                    expires = stats.expires,
                    "snapshot loaded"
                ),
                Err(e) => warn!(path = %path.display(), error = %e, "snapshot load failed"),
            }
        }
    }

    let listener = match TcpListener::bind(("0.0.0.0", config.port)).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(port = config.port, error = %e, "failed to bind");
            std::process::exit(1);
        }
    };

    // A replica completes its handshake before accepting clients.
    if config.replicaof.is_some() {
        if let Err(e) = replication::establish(&server).await {
            error!(error = %e, "replication handshake failed");
            std::process::exit(1);
        }
    }

    server.serve(listener).await?;
    Ok(())
}

struct CliArgs {
    config: Config,
    help: bool,
    version: bool,
}

fn parse_args(args: &[String]) -> Result<CliArgs, String> {
    let mut cli = CliArgs {
        config: Config::default(),
        help: false,
        version: false,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--port" | "-p" => {
                i += 1;
                cli.config.port = args
                    .get(i)
                    .and_then(|s| s.parse().ok())
                    .ok_or("--port expects a port number")?;
            }
            "--replicaof" => {
                i += 1;
                let value = args.get(i).ok_or("--replicaof expects \"<host> <port>\"")?;
                let mut parts = value.split_whitespace();
                let (host, port) = match (parts.next(), parts.next(), parts.next()) {
                    (Some(host), Some(port), None) => (host, port),
                    _ => return Err("--replicaof expects \"<host> <port>\"".to_string()),
                };
                let port: u16 = port
                    .parse()
                    .map_err(|_| "--replicaof expects a numeric port".to_string())?;
                cli.config.replicaof = Some((host.to_string(), port));
            }
            "--dir" => {
                i += 1;
                cli.config.dir = args.get(i).map(PathBuf::from);
            }
            "--dbfilename" => {
                i += 1;
                cli.config.dbfilename = args.get(i).cloned();
            }
            "--help" | "-h" => {
                cli.help = true;
            }
            "--version" | "-v" => {
                cli.version = true;
            }
            arg => {
                return Err(format!("Unknown option: {arg}"));
            }
        }
        i += 1;
    }

    Ok(cli)
}

fn print_help() {
    println!(
        "rivulet {VERSION}

USAGE:
    rivulet [OPTIONS]

OPTIONS:
    -p, --port <port>              Port to listen on (default: 6379)
        --replicaof \"<host> <port>\"  Replicate from the given primary
        --dir <path>               Directory of the startup snapshot
        --dbfilename <name>        Snapshot filename
    -h, --help                     Print help
    -v, --version                  Print version"
    );
}
