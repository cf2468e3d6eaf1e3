//! `cowork-server` binary: loads ambient config, wires up the tool registry
//! and session store, and serves the Protocol Router over a websocket.

use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use clap::Parser;
use cowork_core::config::Config;
use cowork_core::provider::echo::EchoModel;
use cowork_core::tools::ToolRegistry;
use cowork_core::tools::memory::MemoryTool;
use cowork_core::tools::skill::SkillTool;
use cowork_server::registry::SessionRegistry;
use cowork_server::store::JsonFileSessionStore;
use cowork_server::ws::ws_handler;
use tokio::net::TcpListener;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "cowork-server", about = "Interactive agent session server")]
struct Args {
    /// Address to bind the websocket server to.
    #[arg(long, default_value = "127.0.0.1:8787")]
    bind: String,

    /// Overrides the COWORK_HOME directory used for config and session storage.
    #[arg(long)]
    cowork_home: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    if let Some(home) = &args.cowork_home {
        // SAFETY: single-threaded at this point in `main`, before any other
        // task reads the environment.
        unsafe { std::env::set_var("COWORK_HOME", home) };
    }

    let cwd = std::env::current_dir()?;
    let config = Config::load(&cwd)?;
    let cowork_home = config.cowork_home.clone();

    let sessions_dir = cowork_home.join("sessions");
    let store = Arc::new(JsonFileSessionStore::new(sessions_dir));

    let skill = SkillTool {
        skill_roots: vec![cowork_home.join("skills")],
    };
    let memory = MemoryTool {
        memory_root: cowork_home.join("memory"),
    };
    let model = Arc::new(EchoModel);
    let tools = ToolRegistry::full(skill, memory, model.clone(), config.model.clone(), config.sub_agent_model.clone());

    let registry = SessionRegistry::new(config, store, tools, model);

    let app = Router::new().route("/ws", get(ws_handler)).with_state(registry);

    let listener = TcpListener::bind(&args.bind).await?;
    info!(addr = %args.bind, "cowork-server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
