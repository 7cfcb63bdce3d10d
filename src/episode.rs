//! The turn-taking loop.
//!
//! One [`EpisodeDriver`] runs on its own thread. For every episode it waits on the
//! registry barrier, takes both connections, runs the start handshake, then steps the
//! simulation in lockstep: one action from each peer, one step, the same result to both.
//! Any failure ends the episode (never the driver) and the registry is cleared for the
//! next pair.

use std::{
    fmt::Display,
    sync::{mpsc::Sender, Arc},
    thread,
    time::Duration,
};

use tracing::{debug, info, instrument, trace, warn};

use crate::{
    configuration::Configuration,
    error::SessionError,
    protocol::{ClientMessage, Role, ServerMessage},
    registry::{Registry, Session},
    render::Renderer,
    simulation::{Geometry, Outcome, PenaltyShot, SimulationState},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverPhase {
    Idle,
    WaitingForPeers,
    Handshake,
    Running,
    Terminating,
}

/// How an episode ended, from the coordinator's point of view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EpisodeOutcome {
    Goal,
    Intercepted,
    Timeout,
    /// Torn down early: disconnect, protocol violation, refused action.
    Aborted(String),
}

impl From<Outcome> for EpisodeOutcome {
    fn from(o: Outcome) -> Self {
        match o {
            Outcome::Goal => EpisodeOutcome::Goal,
            Outcome::Intercepted => EpisodeOutcome::Intercepted,
            Outcome::Timeout => EpisodeOutcome::Timeout,
        }
    }
}

impl Display for EpisodeOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EpisodeOutcome::Goal => write!(f, "goal"),
            EpisodeOutcome::Intercepted => write!(f, "intercepted"),
            EpisodeOutcome::Timeout => write!(f, "timeout"),
            EpisodeOutcome::Aborted(reason) => write!(f, "aborted ({reason})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodeReport {
    /// 1-based episode number since the driver started.
    pub episode: usize,
    pub outcome: EpisodeOutcome,
    /// Simulation steps played.
    pub steps: u32,
}

pub struct EpisodeDriver {
    registry: Arc<Registry>,
    env: PenaltyShot,
    renderer: Box<dyn Renderer>,
    config: Configuration,
    phase: DriverPhase,
    episodes: usize,
    steps: u32,
    reports: Option<Sender<EpisodeReport>>,
    phases: Option<Sender<DriverPhase>>,
}

impl EpisodeDriver {
    pub fn new(
        registry: Arc<Registry>,
        config: Configuration,
        renderer: Box<dyn Renderer>,
    ) -> Self {
        Self {
            registry,
            env: PenaltyShot::new(Geometry::default(), config.action_policy),
            renderer,
            config,
            phase: DriverPhase::Idle,
            episodes: 0,
            steps: 0,
            reports: None,
            phases: None,
        }
    }

    pub fn with_geometry(mut self, geometry: Geometry) -> Self {
        self.env = PenaltyShot::new(geometry, self.config.action_policy);
        self
    }

    /// Every finished episode is reported on `sender`.
    pub fn with_reports(mut self, sender: Sender<EpisodeReport>) -> Self {
        self.reports = Some(sender);
        self
    }

    /// Every phase change is sent on `sender`.
    pub fn with_phase_updates(mut self, sender: Sender<DriverPhase>) -> Self {
        self.phases = Some(sender);
        self
    }

    fn set_phase(&mut self, phase: DriverPhase) {
        if self.phase == phase {
            return;
        }
        trace!(from = ?self.phase, to = ?phase, "phase change");
        self.phase = phase;
        if let Some(phases) = &self.phases {
            let _ = phases.send(phase);
        }
    }

    pub fn phase(&self) -> DriverPhase {
        self.phase
    }

    pub fn episodes(&self) -> usize {
        self.episodes
    }

    /// Runs episodes until the registry shuts down or `max_episodes` is reached.
    pub fn run(&mut self) {
        loop {
            if self.config.max_episodes.is_some_and(|max| self.episodes >= max) {
                info!(episodes = self.episodes, "episode limit reached");
                break;
            }
            self.set_phase(DriverPhase::WaitingForPeers);
            debug!("waiting for peers");
            let Some(session) = self.registry.wait_for_session() else {
                debug!("registry shut down");
                break;
            };
            let report = self.run_episode(session);
            if let Some(reports) = &self.reports {
                // nobody listening is fine
                let _ = reports.send(report);
            }
        }
        self.set_phase(DriverPhase::Idle);
    }

    /// Plays one full episode on `session` and tears it down.
    #[instrument(skip_all, fields(episode = self.episodes + 1))]
    pub fn run_episode(&mut self, mut session: Session) -> EpisodeReport {
        self.episodes += 1;
        self.steps = 0;
        self.set_phase(DriverPhase::Handshake);
        info!("session formed, starting handshake");

        let played = self.play(&mut session);

        self.set_phase(DriverPhase::Terminating);
        let steps = self.steps;
        let outcome = match played {
            Ok(outcome) => {
                info!(%outcome, steps, "episode finished");
                EpisodeOutcome::from(outcome)
            }
            Err(e) => {
                warn!(error = %e, steps, "episode aborted");
                let notice = ServerMessage::Aborted {
                    reason: e.to_string(),
                };
                for role in Role::ALL {
                    let _ = session.peer_mut(role).send(&notice);
                }
                EpisodeOutcome::Aborted(e.to_string())
            }
        };

        pause(self.config.final_delay);
        if let Err(e) = self.renderer.close() {
            warn!(error = %e, "renderer close failed");
        }
        session.close();
        self.registry.clear();
        self.set_phase(DriverPhase::Idle);

        EpisodeReport {
            episode: self.episodes,
            outcome,
            steps,
        }
    }

    fn play(&mut self, session: &mut Session) -> Result<Outcome, SessionError> {
        for role in Role::ALL {
            session
                .peer_mut(role)
                .set_read_timeout(self.config.step_timeout)
                .map_err(|e| SessionError::from_transport(role, e))?;
        }

        for role in Role::ALL {
            match recv(session, role)? {
                ClientMessage::Start => trace!(peer = %role, "start received"),
                other => {
                    return Err(SessionError::ProtocolViolation(format!(
                        "{role} sent {} instead of start",
                        other.kind()
                    )))
                }
            }
        }

        let state = self.env.reset(self.config.seed);
        broadcast(session, &ServerMessage::Reset { state, done: false })?;
        info!("episode started");
        pause(self.config.initial_delay);
        self.render(&state);

        self.set_phase(DriverPhase::Running);
        loop {
            let puck_action = self.recv_action(session, Role::Puck)?;
            let bar_action = self.recv_action(session, Role::Bar)?;

            let result = self
                .env
                .step(puck_action, bar_action)
                .map_err(|e| SessionError::ProtocolViolation(e.to_string()))?;
            self.steps = result.state.step_count;
            trace!(
                step = result.state.step_count,
                puck_action,
                bar_action,
                done = result.done,
                "stepped"
            );
            broadcast(session, &ServerMessage::from(result))?;
            self.render(&result.state);

            if let Some(outcome) = result.info.outcome {
                return Ok(outcome);
            }
        }
    }

    fn recv_action(&self, session: &mut Session, role: Role) -> Result<f64, SessionError> {
        match recv(session, role)? {
            ClientMessage::Action { value } => self
                .config
                .action_policy
                .admit(value)
                .ok_or(SessionError::OutOfRangeAction { role, value }),
            other => Err(SessionError::ProtocolViolation(format!(
                "{role} sent {} while stepping",
                other.kind()
            ))),
        }
    }

    fn render(&mut self, state: &SimulationState) {
        if !self.config.render {
            return;
        }
        if let Err(e) = self.renderer.render(state) {
            warn!(error = %e, "render failed");
        }
        pause(self.config.frame_delay);
    }
}

fn recv(session: &mut Session, role: Role) -> Result<ClientMessage, SessionError> {
    session
        .peer_mut(role)
        .recv()
        .map_err(|e| SessionError::from_transport(role, e))
}

/// Same message to both peers, puck first.
fn broadcast(session: &mut Session, msg: &ServerMessage) -> Result<(), SessionError> {
    for role in Role::ALL {
        session
            .peer_mut(role)
            .send(msg)
            .map_err(|e| SessionError::from_transport(role, e))?;
    }
    Ok(())
}

fn pause(delay: Duration) {
    if !delay.is_zero() {
        thread::sleep(delay);
    }
}
