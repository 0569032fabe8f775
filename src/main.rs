mod app;
mod domain;
mod infra;
mod util;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::{json, Map, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::app::{Tool, UexCorpSkill};
use crate::infra::llm::{ChatCompletion, OpenAiChatClient};
use crate::infra::uex::UexClient;
use crate::util::config::{load_config, save_config, SkillConfig};

/// Star Citizen trade routes and prices from UEX Corp data
#[derive(Parser)]
#[command(name = "uex-trader", version, about)]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(short, long, env = "UEX_TRADER_CONFIG")]
    config: Option<PathBuf>,

    /// UEX API key, overrides the config file
    #[arg(long, env = "UEX_API_KEY", hide_env_values = true)]
    uex_api_key: Option<String>,

    /// Key for the chat completion used to disambiguate names
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    llm_api_key: Option<String>,

    /// Print the resolver's name corrections after each response
    #[arg(long)]
    show_notes: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a single tool and print its response
    Call {
        /// Tool name, e.g. get_trading_routes
        tool: String,
        /// Parameters as a JSON object
        #[arg(short, long, default_value = "{}")]
        params: String,
    },
    /// Read `<tool> <json>` lines from stdin, keeping caches between calls
    Session,
    /// List the available tools
    Tools,
    /// Write the effective configuration to the config file
    InitConfig,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info,uex_trader=info",
        1 => "info,uex_trader=debug",
        2 => "debug",
        _ => "trace",
    };

    // stdout carries tool responses
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = load_config(cli.config.as_deref())?;
    if let Some(key) = cli.uex_api_key {
        config.uex_api_key = Some(key);
    }
    if let Some(key) = cli.llm_api_key {
        config.llm.api_key = Some(key);
    }

    match cli.command {
        Command::Tools => {
            for tool in Tool::ALL {
                println!("{}", tool.name());
            }
            Ok(())
        }
        Command::InitConfig => {
            let path = save_config(cli.config.as_deref(), &config)?;
            info!(path = %path.display(), "config written");
            Ok(())
        }
        Command::Call { tool, params } => {
            let params = parse_params(&params)?;
            let mut skill = start_skill(config).await?;
            let response = skill.execute_tool(&tool, &params).await;
            println!("{}", serde_json::to_string(&response)?);
            print_notes(&skill, cli.show_notes);
            Ok(())
        }
        Command::Session => {
            let refresh = config.price_refresh_interval();
            let mut skill = start_skill(config).await?;
            let _refresh = refresh.map(|interval| skill.spawn_price_refresh(interval));
            run_session(&mut skill, cli.show_notes).await
        }
    }
}

async fn start_skill(config: SkillConfig) -> anyhow::Result<UexCorpSkill> {
    let source = UexClient::with_base_url(
        &config.uex_api_url,
        config.uex_api_key.clone(),
        config.request_timeout(),
    )?;

    let llm: Option<Arc<dyn ChatCompletion>> = match config.llm.api_key.clone() {
        Some(key) if !key.is_empty() => Some(Arc::new(OpenAiChatClient::with_base_url(
            &config.llm.base_url,
            key,
            config.llm.model.clone(),
            config.llm.timeout(),
        )?)),
        _ => {
            info!("no LLM key configured, names are matched by similarity only");
            None
        }
    };

    Ok(UexCorpSkill::start(config, Arc::new(source), llm).await?)
}

async fn run_session(skill: &mut UexCorpSkill, show_notes: bool) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "quit" | "exit") {
            break;
        }

        let (tool, raw_params) = line.split_once(char::is_whitespace).unwrap_or((line, "{}"));
        let params = match parse_params(raw_params) {
            Ok(params) => params,
            Err(e) => {
                warn!(tool, "ignoring call: {e}");
                continue;
            }
        };

        let response = skill.execute_tool(tool, &params).await;
        println!("{}", serde_json::to_string(&response)?);
        print_notes(skill, show_notes);
    }
    Ok(())
}

fn parse_params(raw: &str) -> anyhow::Result<Map<String, Value>> {
    match serde_json::from_str::<Value>(raw.trim())? {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => anyhow::bail!("parameters must be a JSON object, got {other}"),
    }
}

fn print_notes(skill: &UexCorpSkill, show_notes: bool) {
    if show_notes && !skill.notes().is_empty() {
        println!("{}", json!({ "notes": skill.notes() }));
    }
}
