//! Penalty shot coordinator.
//!
//! Settings come from `PS_*` environment variables (or `--config`), flags override them.

use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use penalty_shot::{
    logger::{init_logger, LogTarget},
    prelude::*,
    render::TextRenderer,
};
use tracing::Level;

#[derive(Parser, Debug)]
#[command(name = "penalty-shot-server")]
#[command(about = "Pair a puck and a bar agent and run penalty shot episodes", long_about = None)]
struct Args {
    /// JSON config file ("host", "port", "msg length", "... time lapse")
    #[arg(short, long)]
    config: Option<String>,

    /// Address to bind
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Draw every frame on stdout
    #[arg(short, long)]
    render: bool,

    /// Abort an episode when a peer stays silent this long (milliseconds)
    #[arg(long)]
    step_timeout_ms: Option<u64>,

    /// What to do with actions outside [-1, 1] (clamp, reject)
    #[arg(long)]
    action_policy: Option<ActionPolicy>,

    /// Stop after this many episodes
    #[arg(short, long)]
    episodes: Option<usize>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Configuration::from_json_file(path)?,
        None => Configuration::from_env(),
    };
    if let Some(host) = args.host {
        config = config.with_host(host);
    }
    if let Some(port) = args.port {
        config = config.with_port(port);
    }
    if args.render {
        config = config.with_render(true);
    }
    if let Some(ms) = args.step_timeout_ms {
        config = config.with_step_timeout(Some(Duration::from_millis(ms)));
    }
    if let Some(policy) = args.action_policy {
        config = config.with_action_policy(policy);
    }
    config = config.with_max_episodes(args.episodes);

    let target = if config.log_to_file() {
        LogTarget::File
    } else {
        LogTarget::Stderr
    };
    let level = if args.verbose { Level::TRACE } else { Level::INFO };
    init_logger(target, level);

    let render = config.render();
    let mut server = Server::bind(config).context("server error: could not start")?;
    if render {
        server = server.with_renderer(Box::new(TextRenderer::new(
            std::io::stdout(),
            Geometry::default(),
        )));
    }
    server.run()
}
