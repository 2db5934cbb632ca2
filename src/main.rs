//! agentmesh command line entry point.
//!
//! Thin driver over the library: load a mesh configuration, build an
//! orchestrator over HTTP transports, then create tasks and send messages
//! to the configured agents.

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use agentmesh::config::{load_config, MeshConfig};
use agentmesh::error::MeshError;
use agentmesh::observability::init_default_logging;
use agentmesh::orchestrator::Orchestrator;
use agentmesh::protocol::Message;
use agentmesh::transport::{AgentTransport, HttpAgentClient};
use clap::{Parser, Subcommand};
use tracing::{error, info};

/// Multi-agent task routing and delegation mesh
#[derive(Parser)]
#[command(name = "agentmesh")]
#[command(about = "Route tasks and messages across a mesh of HTTP agents")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the mesh configuration and print a summary
    Validate,
    /// Create a task at an agent, send a message, and print the final task
    Send {
        /// Entry agent id (as named in the [agents] section)
        #[arg(long)]
        agent: String,

        /// Message text to send
        #[arg(long)]
        text: String,

        /// Stream incremental task deltas instead of waiting for the reply
        #[arg(long)]
        stream: bool,
    },
    /// Fetch a task by id and print it
    Get {
        /// Task id returned by a previous send
        #[arg(long)]
        task_id: String,
    },
    /// Request cancellation of a task
    Cancel {
        /// Task id returned by a previous send
        #[arg(long)]
        task_id: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging();

    let config = match load_configuration(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Validate => handle_validate(&config),
        Commands::Send {
            agent,
            text,
            stream,
        } => handle_send(&config, &agent, &text, stream).await,
        Commands::Get { task_id } => handle_get(&config, &task_id).await,
        Commands::Cancel { task_id } => handle_cancel(&config, &task_id).await,
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }
}

fn load_configuration(
    config_path: &Option<PathBuf>,
) -> Result<MeshConfig, Box<dyn std::error::Error>> {
    match config_path {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            Ok(load_config(path)?)
        }
        None => {
            let default_paths = ["mesh.toml", "config/mesh.toml"];

            for path_str in default_paths {
                let path = PathBuf::from(path_str);
                if path.exists() {
                    info!("Loading configuration from: {}", path.display());
                    return Ok(load_config(&path)?);
                }
            }

            error!("No configuration file found. Provide one with -c/--config or create mesh.toml");
            process::exit(1);
        }
    }
}

fn handle_validate(config: &MeshConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!("mesh id:          {}", config.mesh.id);
    println!("max route depth:  {}", config.mesh.max_routing_depth);
    println!("agents:           {}", config.agents.len());
    for (id, agent) in &config.agents {
        println!("  {} -> {}", id, agent.endpoint);
    }
    println!("routes:           {}", config.routes.len());
    println!("Configuration is valid");
    Ok(())
}

fn build_orchestrator(config: &MeshConfig) -> Result<Orchestrator, Box<dyn std::error::Error>> {
    let transport = Arc::new(HttpAgentClient::with_endpoints(config.endpoint_map()));
    let orchestrator =
        Orchestrator::new(transport).with_max_routing_depth(config.mesh.max_routing_depth);

    for route in &config.routes {
        orchestrator.add_route(route.clone())?;
    }

    Ok(orchestrator)
}

async fn handle_send(
    config: &MeshConfig,
    agent: &str,
    text: &str,
    stream: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let orchestrator = build_orchestrator(config)?;

    let task = orchestrator.create_task(agent).await?;
    info!(task_id = %task.id, agent = %agent, "Task created");

    let message = Message::user_text(text);

    if stream {
        let mut deltas = orchestrator
            .send_message_streaming(&task.id, message)
            .await?;

        while let Some(delta) = deltas.recv().await {
            let delta = delta?;
            println!("{}", serde_json::to_string(&delta)?);
            if delta.done {
                break;
            }
        }
    } else {
        let task = orchestrator.send_message(&task.id, message).await?;
        println!("{}", serde_json::to_string_pretty(&task)?);
    }

    Ok(())
}

// A fresh process has no routing history, so locate the task by asking each
// configured agent in turn.
async fn find_owner(
    config: &MeshConfig,
    transport: &HttpAgentClient,
    task_id: &str,
) -> Result<String, Box<dyn std::error::Error>> {
    for agent_id in config.agents.keys() {
        match transport.get_task(agent_id, task_id).await {
            Ok(_) => return Ok(agent_id.clone()),
            Err(MeshError::UnknownTask { .. }) => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Err(MeshError::unknown_task(task_id).into())
}

async fn handle_get(
    config: &MeshConfig,
    task_id: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let transport = HttpAgentClient::with_endpoints(config.endpoint_map());
    let owner = find_owner(config, &transport, task_id).await?;
    let task = transport.get_task(&owner, task_id).await?;
    println!("{}", serde_json::to_string_pretty(&task)?);
    Ok(())
}

async fn handle_cancel(
    config: &MeshConfig,
    task_id: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let transport = HttpAgentClient::with_endpoints(config.endpoint_map());
    let owner = find_owner(config, &transport, task_id).await?;
    let task = transport.cancel_task(&owner, task_id).await?;
    println!("{}", serde_json::to_string_pretty(&task)?);
    Ok(())
}
