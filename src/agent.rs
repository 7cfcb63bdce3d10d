//! Client-side decision making.
//!
//! The coordinator never looks at how actions are chosen. Agents implement [`Policy`] and
//! are driven by [`run_agent`] over a [`Client`].

use std::f64::consts::PI;

use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing::{info, instrument, warn};

use crate::{
    client::Client,
    error::ClientError,
    protocol::Role,
    simulation::{Geometry, Outcome, SimulationState, StepInfo},
};

/// What an agent should implement.
pub trait Policy {
    /// Choose an action in [-1, 1] for the current observation.
    ///
    /// `info` is `None` right after the reset.
    fn decide(&mut self, observation: &SimulationState, info: Option<&StepInfo>) -> f64;

    /// Called before every episode.
    fn reset(&mut self) {}
}

/// Always plays the same action.
#[derive(Debug, Clone, Copy)]
pub struct ConstantPolicy(pub f64);

impl Policy for ConstantPolicy {
    fn decide(&mut self, _observation: &SimulationState, _info: Option<&StepInfo>) -> f64 {
        self.0
    }
}

/// Uniform actions in [-1, 1] from a seeded generator.
#[derive(Debug, Clone)]
pub struct RandomPolicy {
    rng: StdRng,
}

impl RandomPolicy {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Policy for RandomPolicy {
    fn decide(&mut self, _observation: &SimulationState, _info: Option<&StepInfo>) -> f64 {
        2.0 * self.rng.random::<f64>() - 1.0
    }
}

/// A sine wave over the episode, `amplitude * sin(pi * cycles * step / max_steps)`.
///
/// Amplitude and number of cycles are drawn again for every episode.
#[derive(Debug, Clone)]
pub struct SinePolicy {
    rng: StdRng,
    max_cycles: f64,
    min_magnitude: f64,
    max_steps: u32,
    wave: Option<(f64, f64)>,
}

impl SinePolicy {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            max_cycles: 2.0,
            min_magnitude: 0.8,
            max_steps: Geometry::default().max_steps,
            wave: None,
        }
    }

    pub fn with_max_cycles(mut self, cycles: f64) -> Self {
        self.max_cycles = cycles;
        self
    }

    fn draw(&mut self) -> (f64, f64) {
        let spread = 1.0 - self.min_magnitude;
        let amplitude = self.min_magnitude + self.rng.random::<f64>() * spread;
        let cycles = (2.0 * self.rng.random::<f64>() - 1.0) * self.max_cycles;
        (amplitude, cycles)
    }
}

impl Policy for SinePolicy {
    fn decide(&mut self, observation: &SimulationState, _info: Option<&StepInfo>) -> f64 {
        let (amplitude, cycles) = match self.wave {
            Some(wave) => wave,
            None => {
                let wave = self.draw();
                self.wave = Some(wave);
                wave
            }
        };
        let t = f64::from(observation.step_count) / f64::from(self.max_steps);
        amplitude * (PI * cycles * t).sin()
    }

    fn reset(&mut self) {
        self.wave = None;
    }
}

/// Bar baseline: push proportionally to the vertical gap to the puck.
#[derive(Debug, Clone, Copy)]
pub struct TrackingPolicy {
    gain: f64,
    /// Scale the gain up as the puck closes in on the goal line.
    adaptive: Option<Geometry>,
}

impl TrackingPolicy {
    pub fn new(gain: f64) -> Self {
        Self {
            gain,
            adaptive: None,
        }
    }

    /// Gain = full distance / remaining distance of the puck to the goal line.
    pub fn adaptive(geometry: Geometry) -> Self {
        Self {
            gain: 1.0,
            adaptive: Some(geometry),
        }
    }
}

impl Default for TrackingPolicy {
    fn default() -> Self {
        Self::new(2.0)
    }
}

impl Policy for TrackingPolicy {
    fn decide(&mut self, observation: &SimulationState, _info: Option<&StepInfo>) -> f64 {
        let (puck_x, puck_y) = observation.puck_position;
        let gap = puck_y - observation.bar_position.1;
        let gain = match &self.adaptive {
            None => self.gain,
            Some(g) => (g.goal_x - g.puck_start.0) / (g.goal_x - puck_x + 1e-6),
        };
        (gain * gap).clamp(-1.0, 1.0)
    }
}

/// Summary of one episode as seen by an agent.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentReport {
    pub role: Role,
    pub steps: u32,
    /// Final reward for this agent's role.
    pub reward: f64,
    pub outcome: Option<Outcome>,
    /// False when the episode was cut short by a disconnect.
    pub completed: bool,
}

/// Plays one episode with `policy`, then closes the client.
#[instrument(skip_all, fields(role = %client.role()))]
pub fn run_agent(client: &mut Client, policy: &mut dyn Policy) -> anyhow::Result<AgentReport> {
    let role = client.role();
    policy.reset();
    let (mut state, mut done) = client.connect()?;
    let mut info: Option<StepInfo> = None;
    let mut report = AgentReport {
        role,
        steps: 0,
        reward: 0.0,
        outcome: None,
        completed: done,
    };

    while !done {
        let action = policy.decide(&state, info.as_ref());
        match client.step(action) {
            Ok(result) => {
                state = result.state;
                info = Some(result.info);
                done = result.done;
                report.steps = result.state.step_count;
                report.reward = match role {
                    Role::Puck => result.reward.puck,
                    Role::Bar => result.reward.bar,
                };
                report.outcome = result.info.outcome;
                report.completed = done;
            }
            Err(ClientError::Disconnected) => {
                warn!(steps = report.steps, "disconnected mid-episode");
                break;
            }
            Err(e) => {
                client.close();
                return Err(e.into());
            }
        }
    }

    client.close();
    info!(
        steps = report.steps,
        reward = report.reward,
        completed = report.completed,
        "episode over"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start() -> SimulationState {
        Geometry::default().start_state()
    }

    #[test]
    fn random_policy_is_seeded_and_bounded() {
        let mut a = RandomPolicy::new(5);
        let mut b = RandomPolicy::new(5);
        for _ in 0..100 {
            let x = a.decide(&start(), None);
            assert_eq!(x, b.decide(&start(), None));
            assert!((-1.0..=1.0).contains(&x));
        }
    }

    #[test]
    fn sine_policy_redraws_on_reset() {
        let mut policy = SinePolicy::new(1);
        let mut state = start();
        state.step_count = 20;
        let first = policy.decide(&state, None);
        assert_eq!(first, policy.decide(&state, None));
        assert!(first.abs() <= 1.0);

        policy.reset();
        let second = policy.decide(&state, None);
        assert_ne!(first, second);
        // step 0 is always neutral
        assert_eq!(policy.decide(&start(), None), 0.0);
    }

    #[test]
    fn tracking_policy_follows_puck() {
        let mut policy = TrackingPolicy::default();
        let mut state = start();
        state.puck_position.1 = 0.2;
        assert!((policy.decide(&state, None) - 0.4).abs() < 1e-12);
        state.puck_position.1 = -0.9;
        assert_eq!(policy.decide(&state, None), -1.0);
    }

    #[test]
    fn adaptive_tracking_gets_sharper_near_goal() {
        let geometry = Geometry::default();
        let mut policy = TrackingPolicy::adaptive(geometry);
        let mut state = start();
        state.puck_position.1 = 0.01;
        let far = policy.decide(&state, None);
        state.puck_position.0 = 0.7;
        let near = policy.decide(&state, None);
        assert!(near > far);
    }
}
