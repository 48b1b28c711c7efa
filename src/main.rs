use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;

use mcpscope::api::{self, AppState};
use mcpscope::engine::{AgentConfig, AgentOrchestrator};
use mcpscope::indexer::ResourceIndexer;
use mcpscope::providers::{provider_for, LlmClient};
use mcpscope::proxy::{ProxyInterceptor, RpcToolClient, StdioServerTransport, StdioTransport};
use mcpscope::store::ProfileStore;
use mcpscope::types::{AgentEventType, StepStatus};
use mcpscope::Config;

#[derive(Parser)]
#[command(name = "mcpscope")]
#[command(about = "Inspector and autonomous driver for MCP tool servers", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sit between a client on this process's stdio and a downstream
    /// tool server, observing and indexing every exchange
    Proxy {
        /// Command that launches the downstream server
        #[arg(trailing_var_arg = true, required = true)]
        command: Vec<String>,
    },
    /// Serve the control API in front of a downstream tool server
    Serve {
        #[arg(long)]
        port: Option<u16>,
        /// Command that launches the downstream server, e.g. `npx some-mcp-server`
        #[arg(trailing_var_arg = true, required = true)]
        command: Vec<String>,
    },
    /// Run the autonomous agent once against a downstream tool server
    Agent {
        #[arg(long, default_value = "claude")]
        provider: String,
        #[arg(long)]
        model: Option<String>,
        #[arg(long, default_value_t = 10)]
        max_depth: u32,
        /// Command that launches the downstream server
        #[arg(trailing_var_arg = true, required = true)]
        command: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mcpscope=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Proxy { command } => run_proxy(&command).await?,
        Commands::Serve { port, command } => serve(port, &command).await?,
        Commands::Agent {
            provider,
            model,
            max_depth,
            command,
        } => run_agent(&provider, model, max_depth, &command).await?,
    }

    Ok(())
}

fn open_stores(config: &Config) -> (ProfileStore, ResourceIndexer) {
    match &config.data_dir {
        Some(dir) => (
            ProfileStore::open(dir.join("auth.json")),
            ResourceIndexer::open(dir.join("resources.json")),
        ),
        None => (
            ProfileStore::open_default(),
            ResourceIndexer::open_default(),
        ),
    }
}

/// Pass-through mode: the operator's client launches this process in
/// place of the server, and every `tools/call` result that flows back is
/// mined into the resource index under the active profile.
async fn run_proxy(command: &[String]) -> Result<()> {
    let config = Config::from_env();
    let (profiles, indexer) = open_stores(&config);

    let server = StdioTransport::spawn(&command[0], &command[1..])?;
    let client = StdioServerTransport::new();

    let interceptor = ProxyInterceptor::new(
        Arc::new(client),
        Arc::new(server),
        Arc::new(indexer),
        Arc::new(profiles),
    );
    interceptor.run().await;
    Ok(())
}

async fn connect(command: &[String]) -> Result<Arc<RpcToolClient>> {
    let transport = StdioTransport::spawn(&command[0], &command[1..])?;
    let client = RpcToolClient::new(Arc::new(transport));
    client.initialize().await?;
    Ok(client)
}

async fn serve(port: Option<u16>, command: &[String]) -> Result<()> {
    let config = Config::from_env();
    let port = port.unwrap_or(config.port);
    let tools = connect(command).await?;
    let (profiles, indexer) = open_stores(&config);

    let state = AppState {
        orchestrator: Arc::new(AgentOrchestrator::new()),
        profiles: Arc::new(profiles),
        indexer: Arc::new(indexer),
        tools,
        config: Arc::new(config),
    };

    api::serve(state, port).await
}

async fn run_agent(
    provider_name: &str,
    model: Option<String>,
    max_depth: u32,
    command: &[String],
) -> Result<()> {
    let config = Config::from_env();
    let api_key = match provider_name.to_lowercase().as_str() {
        "claude" | "anthropic" => config.anthropic_api_key.clone(),
        "gemini" | "google" => config.gemini_api_key.clone(),
        _ => None,
    };
    let Some(api_key) = api_key else {
        bail!("No API key configured. Set ANTHROPIC_API_KEY or GEMINI_API_KEY");
    };

    let tools = connect(command).await?;
    let provider = provider_for(provider_name, api_key, model)?;

    let orchestrator = Arc::new(AgentOrchestrator::new());
    orchestrator.configure(
        AgentConfig::new(LlmClient::new(provider), tools).with_max_depth(max_depth),
    );

    let mut events = orchestrator.subscribe();
    orchestrator.start()?;

    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        };
        match event.event_type {
            AgentEventType::ToolStart => {
                println!(
                    "-> {} (depth {})",
                    event.data["tool"].as_str().unwrap_or("?"),
                    event.data["depth"]
                );
            }
            AgentEventType::ToolComplete => {
                println!("   completed {}", event.data["tool"].as_str().unwrap_or("?"));
            }
            AgentEventType::ToolFailed => {
                println!(
                    "   failed {}: {}",
                    event.data["tool"].as_str().unwrap_or("?"),
                    event.data["error"].as_str().unwrap_or("")
                );
            }
            AgentEventType::ToolSkipped => {
                println!(
                    "   skipped {}: {}",
                    event.data["tool"].as_str().unwrap_or("?"),
                    event.data["reason"].as_str().unwrap_or("")
                );
            }
            AgentEventType::AgentComplete | AgentEventType::Error => break,
            _ => {}
        }
    }

    let state = orchestrator.state();
    println!("\nAgent finished with status: {:?}", state.status);
    println!("Steps executed: {}", state.execution_history.len());
    for step in &state.execution_history {
        let marker = match step.status {
            StepStatus::Completed => "ok",
            StepStatus::Failed => "failed",
            _ => "other",
        };
        println!("  - {} [{}] depth {}", step.tool_name, marker, step.depth);
    }
    if !state.flagged_tools.is_empty() {
        println!("Flagged tools:");
        for flagged in &state.flagged_tools {
            println!("  - {}: {}", flagged.tool, flagged.reason);
        }
    }

    Ok(())
}
