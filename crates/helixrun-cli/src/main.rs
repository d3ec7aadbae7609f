//! HelixRun CLI
//!
//! The `helixrun` command inspects and runs declarative agents locally.
//!
//! ## Commands
//!
//! - `list`: print the agent ids found in the config directory
//! - `validate`: build every agent and report failures
//! - `run`: run one agent and print its canonical events as JSON lines

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use helixrun_core::{
    init_tracing, project_stream, AgentRegistry, ExecutionEngine, InMemorySessionStore,
    RunRequest,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, Level};

#[derive(Parser)]
#[command(name = "helixrun")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run and inspect HelixRun agents", long_about = None)]
struct Cli {
    /// Directory of agent config files (*.json)
    #[arg(long, global = true, env = "HELIXRUN_CONFIG_DIR", default_value = "./configs/agents")]
    config_dir: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured agent ids
    List,

    /// Build every agent; exits non-zero if any fails
    Validate,

    /// Run an agent and print each event as one JSON line
    Run {
        /// Agent id
        agent_id: String,

        /// User message
        message: String,

        /// User id (default: anonymous)
        #[arg(long)]
        user: Option<String>,

        /// Session id to continue
        #[arg(long)]
        session: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    let registry = AgentRegistry::load_dir(&cli.config_dir).with_context(|| {
        format!("Failed to load agent configs from {}", cli.config_dir.display())
    })?;

    let mut stdout = std::io::stdout().lock();
    match cli.command {
        Commands::List => cmd_list(&registry, &mut stdout),
        Commands::Validate => cmd_validate(&registry, &mut stdout),
        Commands::Run {
            agent_id,
            message,
            user,
            session,
        } => {
            let mut request = RunRequest::new(agent_id, message);
            request.user_id = user;
            request.session_id = session;

            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    on_interrupt.cancel();
                }
            });
            cmd_run(registry, request, cancel, &mut stdout).await
        }
    }
}

fn cmd_list(registry: &AgentRegistry, out: &mut impl Write) -> Result<()> {
    for id in registry.list_agent_ids() {
        writeln!(out, "{id}")?;
    }
    Ok(())
}

fn cmd_validate(registry: &AgentRegistry, out: &mut impl Write) -> Result<()> {
    let mut failed = 0;
    for id in registry.list_agent_ids() {
        match registry.build(&id) {
            Ok(agent) => writeln!(out, "ok    {id} ({})", agent.kind())?,
            Err(err) => {
                failed += 1;
                writeln!(out, "FAIL  {id}: {err}")?;
            }
        }
    }
    if failed > 0 {
        bail!("{failed} of {} agents failed to build", registry.len());
    }
    Ok(())
}

async fn cmd_run(
    registry: AgentRegistry,
    request: RunRequest,
    cancel: CancellationToken,
    out: &mut impl Write,
) -> Result<()> {
    let engine = ExecutionEngine::new(Arc::new(registry), Arc::new(InMemorySessionStore::new()));
    let agent_id = request.agent_id.clone();
    let events = engine
        .run(request, cancel)
        .await
        .with_context(|| format!("Failed to start agent '{agent_id}'"))?;
    debug!(request_id = %events.request_id(), session = %events.session(), "run started");

    let mut events = Box::pin(project_stream(events));
    let mut failure = None;
    let mut completed = false;
    while let Some(event) = events.next().await {
        writeln!(out, "{}", serde_json::to_string(&event)?)?;
        out.flush()?;
        if let Some(error) = &event.error {
            failure = Some(error.message.clone());
        }
        completed |= event.runner_completion;
    }

    if let Some(message) = failure {
        bail!("run failed: {message}");
    }
    if !completed {
        bail!("run cancelled before completion");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use helixrun_core::{AgentBuilder, AgentConfig, ScriptedModel, StaticResolver, ToolCatalog};
    use serde_json::Value;

    fn registry(configs: &[&str], reply: &str) -> AgentRegistry {
        let configs: Vec<AgentConfig> = configs
            .iter()
            .map(|raw| serde_json::from_str(raw).unwrap())
            .collect();
        let model = Arc::new(ScriptedModel::replying("fake", reply));
        AgentRegistry::from_configs(configs)
            .unwrap()
            .with_builder(AgentBuilder::new(
                Arc::new(StaticResolver::new(model)),
                ToolCatalog::builtin(),
            ))
    }

    const ECHO: &str =
        r#"{"id": "echo", "type": "single", "model": {"provider": "openai", "model": "m"}}"#;
    const BROKEN: &str = r#"{"id": "broken", "type": "single",
        "model": {"provider": "openai", "model": "m"}, "tools": [{"type": "web_search"}]}"#;

    #[test]
    fn test_cli_parses_run() {
        let cli = Cli::try_parse_from([
            "helixrun",
            "--config-dir",
            "agents",
            "run",
            "calc-bot",
            "add 2 and 3",
            "--user",
            "ada",
        ])
        .unwrap();
        assert_eq!(cli.config_dir, PathBuf::from("agents"));
        match cli.command {
            Commands::Run { agent_id, user, session, .. } => {
                assert_eq!(agent_id, "calc-bot");
                assert_eq!(user.as_deref(), Some("ada"));
                assert!(session.is_none());
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_list_prints_sorted_ids() {
        let registry = registry(&[ECHO, BROKEN], "hi");
        let mut out = Vec::new();
        cmd_list(&registry, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "broken\necho\n");
    }

    #[test]
    fn test_validate_reports_failures() {
        let registry = registry(&[ECHO, BROKEN], "hi");
        let mut out = Vec::new();
        let err = cmd_validate(&registry, &mut out).unwrap_err();
        assert!(err.to_string().contains("1 of 2"));

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("ok    echo (single)"));
        assert!(text.contains("FAIL  broken: unsupported tool type: web_search"));
    }

    #[tokio::test]
    async fn test_run_prints_json_lines() {
        let registry = registry(&[ECHO], "hello");
        let mut out = Vec::new();
        cmd_run(
            registry,
            RunRequest::new("echo", "hi"),
            CancellationToken::new(),
            &mut out,
        )
        .await
        .unwrap();

        let lines: Vec<Value> = String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["type"], "chat.completion");
        assert_eq!(lines[1]["runnerCompletion"], true);
        assert_eq!(lines[1]["content"], "hello");
    }

    #[tokio::test]
    async fn test_run_unknown_agent_fails() {
        let registry = registry(&[ECHO], "hello");
        let mut out = Vec::new();
        let err = cmd_run(
            registry,
            RunRequest::new("ghost", "hi"),
            CancellationToken::new(),
            &mut out,
        )
        .await
        .unwrap_err();
        assert!(format!("{err:#}").contains("unknown agent ID: ghost"));
        assert!(out.is_empty());
    }
}
