//! Penalty shot agent: connects as puck or bar and plays with a built-in policy.

use clap::{Parser, ValueEnum};
use penalty_shot::{
    logger::{try_init_logger, LogTarget},
    prelude::*,
};
use tracing::{warn, Level};

#[derive(ValueEnum, Clone, Copy, Debug)]
enum PolicyKind {
    Constant,
    Random,
    Sine,
    Tracking,
    Adaptive,
}

#[derive(Parser, Debug)]
#[command(name = "penalty-shot-agent")]
#[command(about = "Play penalty shot episodes against another agent", long_about = None)]
struct Args {
    /// Role to claim (puck, bar)
    #[arg(short, long)]
    role: Role,

    /// Policy choosing the actions
    #[arg(short, long, value_enum, default_value = "random")]
    policy: PolicyKind,

    /// Action of the constant policy, gain of the tracking policy
    #[arg(long, default_value = "1.0", allow_negative_numbers = true)]
    value: f64,

    /// Seed of the random and sine policies
    #[arg(short, long, default_value = "0")]
    seed: u64,

    /// Number of episodes to play
    #[arg(short, long, default_value = "1")]
    episodes: usize,

    /// Server address, overrides PS_HOST
    #[arg(long)]
    host: Option<String>,

    /// Server port, overrides PS_PORT
    #[arg(long)]
    port: Option<u16>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    if let Err(e) = try_init_logger(LogTarget::Stderr, level) {
        eprintln!("{e}");
    }

    let mut config = Configuration::from_env();
    if let Some(host) = args.host {
        config = config.with_host(host);
    }
    if let Some(port) = args.port {
        config = config.with_port(port);
    }

    let mut policy: Box<dyn Policy> = match args.policy {
        PolicyKind::Constant => Box::new(ConstantPolicy(args.value)),
        PolicyKind::Random => Box::new(RandomPolicy::new(args.seed)),
        PolicyKind::Sine => Box::new(SinePolicy::new(args.seed)),
        PolicyKind::Tracking => Box::new(TrackingPolicy::new(args.value)),
        PolicyKind::Adaptive => Box::new(TrackingPolicy::adaptive(Geometry::default())),
    };

    let mut client = Client::new(args.role, config);
    for episode in 1..=args.episodes {
        let report = run_agent(&mut client, policy.as_mut())?;
        if !report.completed {
            warn!(episode, "episode did not complete");
        }
        println!(
            "episode {episode}: {} after {} steps, reward {}",
            report
                .outcome
                .map_or_else(|| "aborted".to_string(), |o| o.to_string()),
            report.steps,
            report.reward
        );
    }
    Ok(())
}
