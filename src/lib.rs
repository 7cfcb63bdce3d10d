//! # Penalty Shot
//!
//! A session coordinator that pairs two independent remote agents, a **puck** and a
//! **bar**, into a lockstep simulation of a one-dimensional pursuit game.
//!
//! It provides:
//! - A deterministic simulation model ([`simulation::PenaltyShot`])
//! - A registry pairing exactly one puck and one bar connection ([`registry::Registry`])
//! - An episode driver running the start handshake and the step loop ([`episode::EpisodeDriver`])
//! - A TCP listener tying it together ([`server::Server`])
//! - A synchronous client for agents ([`client::Client`]) and a few reference policies
//!   ([`agent`])
//!
//! Each episode goes through the same phases: wait for both roles, both peers send
//! `start`, the simulation is reset and the start state is sent to both, then every tick
//! reads one action from each peer, steps once and sends the same result to both. A
//! disconnect or a protocol violation ends the episode, never the server.
//!
//! # Documentation Overview
//!
//! - For the rules of the game (movement, acceleration, termination), see [`simulation`].
//! - For the messages and their framing, see [`protocol`] and [`transport`].
//! - For host, port, delays and the out of range action policy, see
//!   [`Configuration`](crate::configuration::Configuration).
//!
//! # Usage Example
//!
//! A server and two agents in the same process:
//!
//! ```no_run
//! use std::thread;
//!
//! use penalty_shot::prelude::*;
//!
//! fn main() -> anyhow::Result<()> {
//!     let server = Server::bind(Configuration::new().with_port(0))?.spawn()?;
//!     let config = Configuration::new().with_port(server.local_addr().port());
//!
//!     let puck = {
//!         let config = config.clone();
//!         thread::spawn(move || {
//!             let mut client = Client::new(Role::Puck, config);
//!             run_agent(&mut client, &mut SinePolicy::new(0))
//!         })
//!     };
//!     let mut client = Client::new(Role::Bar, config);
//!     let bar = run_agent(&mut client, &mut TrackingPolicy::default())?;
//!     let puck = puck.join().expect("puck agent panicked")?;
//!
//!     println!("puck: {puck:?}\nbar: {bar:?}");
//!     Ok(())
//! }
//! ```
//!
//! ## Protocol
//!
//! - Agent -> Server : `claim` with role `P` or `B`, answered by `connected` (or `rejected`)
//! - Agent -> Server : `start`, answered by `reset` once both agents started
//! - Agent -> Server : `action`, answered by `step` once both agents sent theirs
//!
//! Frames are a 4-byte big-endian length followed by a JSON payload.

pub use anyhow;

pub mod agent;
pub mod client;
pub mod configuration;
pub mod episode;
pub mod error;
pub mod logger;
pub mod protocol;
pub mod registry;
pub mod render;
pub mod server;
pub mod simulation;
pub mod transport;

/// Commonly used types and traits for quick access.
///
/// ```rust
/// use penalty_shot::prelude::*;
/// ```
pub mod prelude {
    pub use crate::agent::{
        run_agent, AgentReport, ConstantPolicy, Policy, RandomPolicy, SinePolicy, TrackingPolicy,
    };
    pub use crate::client::Client;
    pub use crate::configuration::Configuration;
    pub use crate::episode::{EpisodeOutcome, EpisodeReport};
    pub use crate::error::{ClientError, SessionError};
    pub use crate::protocol::Role;
    pub use crate::server::{Server, ServerHandle};
    pub use crate::simulation::{
        ActionPolicy, Geometry, Outcome, PenaltyShot, Reward, SimulationState, StepInfo,
        StepResult,
    };
}
