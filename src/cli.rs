//! Command-line interface: parse, check, and run flow files.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::config::Config;
use crate::executor::{EchoHandler, Executor};
use crate::parser::{has_errors, parse_flow, validate};
use crate::types::{Val, VariableInfo};

#[derive(Debug, Parser)]
#[command(name = "cascade", about = "Flow definition parser and executor", version)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Parse a flow file and print the model as JSON.
    Parse { file: PathBuf },
    /// Parse a flow file and report validation issues.
    Check { file: PathBuf },
    /// Execute a flow file with the built-in echo handler.
    Run {
        file: PathBuf,

        /// Input values, repeatable as -i KEY=VALUE.
        #[arg(short = 'i', long = "input", value_name = "KEY=VALUE")]
        inputs: Vec<String>,

        /// Flow id for this run (default: file stem plus a UUID).
        #[arg(long = "flow-id")]
        flow_id: Option<String>,
    },
}

pub async fn run_cli() -> Result<()> {
    run_cli_with_args(Cli::parse()).await
}

pub async fn run_cli_from_args<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    run_cli_with_args(Cli::try_parse_from(args)?).await
}

pub async fn run_cli_with_args(cli: Cli) -> Result<()> {
    if let Some(path) = &cli.config {
        std::env::set_var("CASCADE_CONFIG_PATH", path);
    }
    let config = Config::load()?;

    match cli.command {
        Commands::Parse { file } => {
            let flow = parse_file(&file)?;
            println!("{}", serde_json::to_string_pretty(&flow)?);
            if !flow.success {
                std::process::exit(1);
            }
        }
        Commands::Check { file } => {
            let flow = parse_file(&file)?;
            if !flow.success {
                eprintln!("error: {}", flow.error);
                std::process::exit(1);
            }
            let issues = validate(&flow);
            for issue in &issues {
                println!("{}:{}: {}: {}", file.display(), issue.line, issue.severity, issue.message);
            }
            if has_errors(&issues) {
                std::process::exit(1);
            }
            println!("{}: ok ({} warnings)", file.display(), issues.len());
        }
        Commands::Run {
            file,
            inputs,
            flow_id,
        } => {
            let mut flow = parse_file(&file)?;
            let id = flow_id.unwrap_or_else(|| {
                let stem = file
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "flow".to_string());
                format!("{}-{}", stem, Uuid::new_v4())
            });
            flow.flow_id = id;

            for pair in &inputs {
                let (key, raw) = pair
                    .split_once('=')
                    .with_context(|| format!("input '{}' is not KEY=VALUE", pair))?;
                let value = Val::from_literal(raw);
                flow.input_vars.insert(key.to_string(), value.clone());
                flow.variables.insert(
                    key.to_string(),
                    VariableInfo {
                        name: key.to_string(),
                        var_type: value.type_name().to_string(),
                        value,
                        source: "input".to_string(),
                        line_num: 0,
                        is_input: true,
                    },
                );
            }

            let executor = Executor::new(Arc::new(EchoHandler))
                .with_retry_backoff(Duration::from_millis(config.engine.retry_backoff_ms))
                .with_default_timeout_ms(config.engine.default_timeout_ms);
            executor.start(&mut flow).await?;
            println!("{}", serde_json::to_string_pretty(&flow.variables)?);
        }
    }
    Ok(())
}

fn parse_file(file: &PathBuf) -> Result<crate::types::FlowModel> {
    let source = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let name = file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "flow".to_string());
    Ok(parse_flow(&name, &source))
}
