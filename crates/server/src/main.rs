//! Agentdeck session host.
//!
//! Hosts one managed agent session and speaks NDJSON over stdio: commands
//! in, session events out. Everything interesting happens in
//! `agentdeck-connector`; this binary is transport glue.

mod logging;
mod stdio;

use std::path::PathBuf;

use agentdeck_connector::SessionManager;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "agentdeck", about = "Session host for the external agent CLI")]
struct Cli {
    /// Working directory for agent subprocesses.
    #[arg(long, default_value = ".")]
    working_dir: PathBuf,

    /// Agent binary override (otherwise resolved from the environment).
    #[arg(long, env = "AGENTDECK_AGENT_BIN")]
    agent_bin: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _logging = logging::init_logging()?;

    let working_dir = cli.working_dir.canonicalize()?;
    info!(
        component = "server",
        event = "server.starting",
        working_dir = %working_dir.display(),
        "Starting Agentdeck session host"
    );

    let (events_tx, events_rx) = mpsc::channel(256);
    let mut manager = SessionManager::new(&working_dir, events_tx.clone());
    if let Some(bin) = cli.agent_bin {
        manager = manager.with_binary(bin);
    }

    stdio::run(manager, events_tx, events_rx).await
}
