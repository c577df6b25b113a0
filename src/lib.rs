pub mod agent;
pub mod cli;
pub mod config;
pub mod logging;
pub mod model;
pub mod model_gateway;
pub mod providers;
pub mod render;
pub mod repl;
pub mod session;
pub mod spinner;

use anyhow::{Context, Result};
use clap::Parser;
use reqwest::Client;
use std::io;
use std::time::Duration;
use tracing::info;

use agent::Agent;
use agent::tools::ToolRegistry;
use cli::Cli;
use config::Config;
use model_gateway::HostModelGateway;
use render::{format_stats, terminal_width, wrap_text};
use repl::Repl;
use session::SessionSettings;

pub async fn run() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Cli::parse();
    let cfg = Config::from_env();
    info!(
        model = %args.model,
        api_base_url = %cfg.api_base_url,
        api_key_set = cfg.api_key.is_some(),
        model_timeout_secs = cfg.model_timeout_secs,
        max_tool_rounds = cfg.max_tool_rounds,
        context_files = args.files.len(),
        "loaded runtime configuration"
    );
    exit_on_interrupt();

    if args.list_models {
        println!("{}", cli::model_listing());
        return Ok(());
    }
    cli::validate_model(&args.model)?;

    let developer_message = cli::developer_message(&cfg.system_prompt, &args.files)?;
    let settings = SessionSettings::new(args.model.clone(), args.web, args.stats)?;
    let registry = ToolRegistry::with_builtins().context("Failed to register built-in tools")?;
    let client = Client::builder()
        .timeout(Duration::from_secs(cfg.model_timeout_secs))
        .build()
        .context("Failed to initialize HTTP client")?;
    let gateway = HostModelGateway::new(&client, &cfg);
    let mut agent = Agent::new(&gateway, &registry, &developer_message)
        .with_max_tool_rounds(cfg.max_tool_rounds);

    if let Some(prompt) = args.one_shot_prompt() {
        let turn = agent.run_turn(&settings, &prompt).await?;
        println!("{}", wrap_text(turn.text.trim(), terminal_width()));
        if settings.stats() {
            println!("{}", format_stats(&turn.usage));
        }
        return Ok(());
    }

    println!("hlpr: chatting with {}", settings.model());
    println!("type a prompt, ':edit', ':show <key>', ':set <key>=<value>', or 'exit' to quit");

    let mut repl = Repl::new(agent.with_spinner(true), settings, &cfg.editor, io::stdout());
    repl.run(io::stdin().lock()).await
}

/// Ctrl-C exits with status 0 in both modes, even mid-request or while
/// reading input.
fn exit_on_interrupt() {
    tokio::spawn(async {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("\nExiting.");
            std::process::exit(0);
        }
    });
}
