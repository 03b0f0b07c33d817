use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::cell::Cell;
use crate::config::Config;
use crate::interpreter::{json_to_val, val_to_json, Val};

#[derive(Parser)]
#[command(name = "jail")]
#[command(about = "Jail - run scripts in isolated cells", long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default search)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Stop timeout in milliseconds (overrides config file and env vars)
    #[arg(long, global = true)]
    pub stop_timeout_ms: Option<u64>,

    /// Maximum script call depth (overrides config file and env vars)
    #[arg(long, global = true)]
    pub max_call_depth: Option<usize>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a script file in a fresh cell
    Run {
        /// Script to run
        file: PathBuf,

        /// How long to keep the loop running for timers and fetches
        #[arg(short = 'w', long = "wait-ms", default_value = "0")]
        wait_ms: u64,

        /// Global function to call once the script has run
        #[arg(short = 'c', long = "call")]
        call: Option<String>,

        /// Arguments for --call (JSON array)
        #[arg(long = "args", requires = "call")]
        args: Option<String>,
    },

    /// Evaluate source in a fresh cell and print the result
    Eval {
        /// Script source
        source: String,

        /// How long to keep the loop running for timers and fetches
        #[arg(short = 'w', long = "wait-ms", default_value = "0")]
        wait_ms: u64,
    },

    /// Print the resolved configuration as TOML
    Config,
}

/// Run the CLI by parsing process arguments
pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    run_cli_with_args(cli).await
}

/// Run the CLI with provided arguments
pub async fn run_cli_from_args(args: Vec<String>) -> Result<()> {
    let cli = Cli::parse_from(args);
    run_cli_with_args(cli).await
}

async fn run_cli_with_args(cli: Cli) -> Result<()> {
    // Load and validate configuration before running anything
    let config = Config::builder()
        .config_path(cli.config)
        .stop_timeout_ms(cli.stop_timeout_ms)
        .max_call_depth(cli.max_call_depth)
        .build()?;

    match cli.command {
        Commands::Run {
            file,
            wait_ms,
            call,
            args,
        } => {
            let source = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read script: {:?}", file))?;
            let call = match call {
                Some(name) => Some((name, parse_args(args.as_deref().unwrap_or("[]"))?)),
                None => None,
            };
            let id = file
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| "script".to_string());

            let value = run_in_cell(&config, &id, source, call, wait_ms).await?;
            print_value(&value)?;
        }

        Commands::Eval { source, wait_ms } => {
            let value = run_in_cell(&config, "eval", source, None, wait_ms).await?;
            print_value(&value)?;
        }

        Commands::Config => {
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}

/// Run a script, optionally call a function it defined, then let the loop
/// drain for `wait_ms` before stopping the cell
async fn run_in_cell(
    config: &Config,
    id: &str,
    source: String,
    call: Option<(String, Vec<Val>)>,
    wait_ms: u64,
) -> Result<Val> {
    let cell = Cell::builder(id)
        .config(config)
        .build()
        .context("Failed to create cell")?;

    let outcome = async {
        let mut value = cell.run_script(source).await?;
        if let Some((name, args)) = call {
            value = cell.call_async(name.as_str(), args).await?;
        }
        Ok::<_, crate::event_loop::CallError>(value)
    }
    .await;

    if wait_ms > 0 {
        tokio::time::sleep(Duration::from_millis(wait_ms)).await;
    }
    let stopped = cell.stop().await;

    let value = outcome.context("Script failed")?;
    stopped.context("Cell did not stop cleanly")?;
    Ok(value)
}

fn parse_args(args: &str) -> Result<Vec<Val>> {
    let parsed: serde_json::Value =
        serde_json::from_str(args).with_context(|| format!("Invalid --args JSON: {}", args))?;
    match json_to_val(parsed) {
        Val::List(items) => Ok(items),
        other => Ok(vec![other]),
    }
}

fn print_value(value: &Val) -> Result<()> {
    if *value == Val::Undefined {
        return Ok(());
    }
    println!("{}", serde_json::to_string_pretty(&val_to_json(value))?);
    Ok(())
}
