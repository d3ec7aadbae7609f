use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use helixrun_core::{init_tracing, AgentRegistry, ExecutionEngine, InMemorySessionStore};
use helixrund::{serve, AppState, ServerArgs};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional
    dotenvy::dotenv().ok();
    let args = ServerArgs::parse();
    init_tracing(args.json, args.log_level());

    let registry = AgentRegistry::load_dir(&args.config_dir).with_context(|| {
        format!("failed to load agent configs from {}", args.config_dir.display())
    })?;
    info!(agents = ?registry.list_agent_ids(), "agent registry loaded");

    for (id, err) in registry.validate() {
        warn!(agent_id = %id, error = %err, "agent will fail to build");
    }

    let engine = ExecutionEngine::new(Arc::new(registry), Arc::new(InMemorySessionStore::new()))
        .with_runner_name(&args.runner_name);

    serve(args.addr, AppState::new(engine)).await
}
