//! Process configuration for the daemon.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tracing::Level;

pub const DEFAULT_CONFIG_DIR: &str = "./configs/agents";
pub const DEFAULT_ADDR: &str = "0.0.0.0:8081";

#[derive(Debug, Clone, Parser)]
#[command(name = "helixrund")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "HelixRun daemon: run declarative agents and stream their events over SSE", long_about = None)]
pub struct ServerArgs {
    /// Directory of agent config files (*.json)
    #[arg(long, env = "HELIXRUN_CONFIG_DIR", default_value = DEFAULT_CONFIG_DIR)]
    pub config_dir: PathBuf,

    /// Listen address
    #[arg(long, env = "HELIXRUN_HTTP_ADDR", default_value = DEFAULT_ADDR)]
    pub addr: SocketAddr,

    /// App name sessions are stored under and runner events are authored by
    #[arg(long, env = "HELIXRUN_RUNNER_NAME", default_value = helixrun_core::runner::DEFAULT_RUNNER_NAME)]
    pub runner_name: String,

    /// Emit JSON-formatted log lines
    #[arg(long, env = "HELIXRUN_LOG_JSON")]
    pub json: bool,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl ServerArgs {
    pub fn log_level(&self) -> Level {
        if self.verbose {
            Level::DEBUG
        } else {
            Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = ServerArgs::try_parse_from(["helixrund"]).unwrap();
        assert_eq!(args.addr.port(), 8081);
        assert_eq!(args.runner_name, "helixrun");
        assert_eq!(args.log_level(), Level::INFO);
    }

    #[test]
    fn test_flags_override() {
        let args = ServerArgs::try_parse_from([
            "helixrund",
            "--config-dir",
            "/etc/helixrun/agents",
            "--addr",
            "127.0.0.1:9000",
            "--verbose",
        ])
        .unwrap();
        assert_eq!(args.config_dir, PathBuf::from("/etc/helixrun/agents"));
        assert_eq!(args.addr.port(), 9000);
        assert_eq!(args.log_level(), Level::DEBUG);
    }

    #[test]
    fn test_rejects_bad_addr() {
        assert!(ServerArgs::try_parse_from(["helixrund", "--addr", "not-an-addr"]).is_err());
    }
}
