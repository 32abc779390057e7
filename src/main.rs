use clap::{Parser, Subcommand};
use log::{error, info, warn};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use tspipe::cell::Registry;
use tspipe::config::create_default_config_template;
use tspipe::graph::Graph;
use tspipe::Config;

#[derive(Parser, Debug)]
#[command(name = "tspipe")]
#[command(version)]
#[command(about = "MPEG transport stream pipelines and VBV analysis")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a pipeline, e.g. `file_reader name=in.ts ! bytes_converter output_format=ts_packet ! vbv pcr=0x100`
    Pipe {
        /// List available cells
        #[arg(long)]
        list: bool,

        /// Show the help of every cell
        #[arg(long)]
        full: bool,

        /// Show the help of one cell
        #[arg(long, value_name = "NAME")]
        cell: Option<String>,

        /// Configuration file, instead of ./tspipe.toml or ./config.toml
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Pipeline expression; words are joined with spaces
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        expr: Vec<String>,
    },
    /// Write a commented configuration file, unless one already exists
    Init {
        #[arg(default_value = "tspipe.toml")]
        path: PathBuf,
    },
}

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn pipe(registry: &Registry, expr: &str) -> ExitCode {
    let graph = match Graph::new(expr, registry) {
        Ok(graph) => graph,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    info!("running {} cells: {}", graph.len(), graph.ids().join(" ! "));

    let stop = graph.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, stopping pipeline");
            stop.stop();
        }
    });

    let summary = graph.run().await;
    info!("{} cells stopped", summary.stopped);
    if summary.is_success() {
        ExitCode::SUCCESS
    } else {
        for (id, e) in &summary.failures {
            error!("{}: {}", id, e);
        }
        ExitCode::FAILURE
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let (list, full, cell, config, expr) = match cli.command {
        Command::Pipe {
            list,
            full,
            cell,
            config,
            expr,
        } => (list, full, cell, config, expr),
        Command::Init { path } => {
            return match create_default_config_template(&path) {
                Ok(()) => {
                    println!("{}", path.display());
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    eprintln!("{}: {}", path.display(), e);
                    ExitCode::FAILURE
                }
            };
        }
    };

    let config = match config {
        Some(path) => Config::from_file(path),
        None => Config::load(),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    init_logging(&config);

    let registry = Registry::new(config);
    if list {
        print!("{}", registry.list());
        return ExitCode::SUCCESS;
    }
    if full {
        print!("{}", registry.full_help());
        return ExitCode::SUCCESS;
    }
    if let Some(name) = cell {
        return match registry.help(&name) {
            Some(help) => {
                print!("{}", help);
                ExitCode::SUCCESS
            }
            None => {
                eprintln!("unknown cell {}", name);
                ExitCode::FAILURE
            }
        };
    }

    let expr = expr.join(" ");
    if expr.trim().is_empty() {
        eprintln!("no pipeline given, see --list");
        return ExitCode::FAILURE;
    }
    pipe(&registry, &expr).await
}
