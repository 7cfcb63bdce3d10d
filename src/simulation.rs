//! The penalty shot simulation.
//!
//! A puck travels from left to right at a fixed horizontal speed and steers vertically.
//! A bar sits in front of the goal line and moves vertically, accelerating when it keeps
//! pushing hard in the same direction. The episode ends when the puck's leading edge
//! crosses the goal line or when the bar intercepts the puck.
//!
//! [`Geometry::advance`] is the pure transition function. [`PenaltyShot`] wraps it with
//! the per-episode bookkeeping the episode driver needs (reset, action admission,
//! refusing to step a finished episode).

use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{trace, warn};

/// Actions with an absolute value at least this large count as "strong" bar input.
pub const STRONG_INPUT: f64 = 0.8;
/// Largest magnitude of the velocity indicator.
pub const MAX_INDICATOR: i8 = 3;
/// Bar speed gain per unit of theta.
pub const THETA_GAIN: f64 = 0.85;

/// Fixed dimensions of the pitch. All coordinates are normalised to [-1, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    /// Number of steps the puck needs to travel from its start to the goal line.
    pub max_steps: u32,
    pub puck_start: (f64, f64),
    pub bar_start: (f64, f64),
    /// x coordinate of the goal line.
    pub goal_x: f64,
    pub bar_length: f64,
    pub bar_width: f64,
    pub puck_diameter: f64,
    pub goal_epsilon: f64,
}

impl Default for Geometry {
    fn default() -> Self {
        Self {
            max_steps: 90,
            puck_start: (-0.75, 0.0),
            bar_start: (0.75, 0.0),
            goal_x: 0.77,
            bar_length: 1.0 / 6.0,
            bar_width: 1.0 / 128.0,
            puck_diameter: 1.0 / 64.0,
            goal_epsilon: 0.001,
        }
    }
}

/// Full observable state of an episode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulationState {
    pub puck_position: (f64, f64),
    pub bar_position: (f64, f64),
    /// Bar accelerator, grows while the indicator is saturated.
    pub theta: f64,
    /// Consecutive strong bar inputs in one direction, signed, in [-3, 3].
    pub velocity_indicator: i8,
    pub step_count: u32,
}

impl SimulationState {
    /// Flattened observation `[puck_x, puck_y, bar_x, bar_y, theta, velocity_indicator]`.
    pub fn observation(&self) -> [f64; 6] {
        [
            self.puck_position.0,
            self.puck_position.1,
            self.bar_position.0,
            self.bar_position.1,
            self.theta,
            f64::from(self.velocity_indicator),
        ]
    }
}

/// Reward pair, one value per role.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Reward {
    pub puck: f64,
    pub bar: f64,
}

impl Reward {
    pub const NONE: Reward = Reward { puck: 0.0, bar: 0.0 };
    pub const PUCK_SCORES: Reward = Reward { puck: 1.0, bar: -1.0 };
    pub const BAR_INTERCEPTS: Reward = Reward { puck: -1.0, bar: 1.0 };
}

/// How an episode ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The puck crossed the goal line.
    Goal,
    /// The bar stopped the puck.
    Intercepted,
    /// Neither happened within `max_steps + 1` steps (only reachable with custom geometry).
    Timeout,
}

impl Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Goal => write!(f, "goal"),
            Outcome::Intercepted => write!(f, "intercepted"),
            Outcome::Timeout => write!(f, "timeout"),
        }
    }
}

/// Auxiliary per-step data for policies that need elapsed-time context.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepInfo {
    pub step_count: u32,
    pub velocity_indicator: i8,
    pub theta: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
}

/// Result of a single step. Sent identically to both peers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub state: SimulationState,
    pub reward: Reward,
    pub done: bool,
    pub info: StepInfo,
}

/// What to do with an action outside [-1, 1].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActionPolicy {
    /// Clamp into range and carry on.
    #[default]
    Clamp,
    /// Refuse the action; the episode is aborted.
    Reject,
}

impl ActionPolicy {
    /// Returns the action to feed to the simulation, or `None` if it must be refused.
    ///
    /// Non-finite values are refused under every policy.
    pub fn admit(self, value: f64) -> Option<f64> {
        if !value.is_finite() {
            return None;
        }
        if (-1.0..=1.0).contains(&value) {
            return Some(value);
        }
        match self {
            ActionPolicy::Clamp => {
                warn!(value, "clamping out of range action");
                Some(value.clamp(-1.0, 1.0))
            }
            ActionPolicy::Reject => None,
        }
    }
}

impl FromStr for ActionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "clamp" => Ok(ActionPolicy::Clamp),
            "reject" => Ok(ActionPolicy::Reject),
            other => Err(format!("unknown action policy '{other}' (expected clamp or reject)")),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum SimulationError {
    #[error("step called before reset")]
    NotReset,
    #[error("episode already finished")]
    EpisodeFinished,
    #[error("invalid action {0}")]
    InvalidAction(f64),
}

impl Geometry {
    /// Horizontal puck speed, one `max_steps`-th of the distance to the goal line.
    pub fn puck_speed(&self) -> f64 {
        (self.goal_x - self.puck_start.0) / f64::from(self.max_steps)
    }

    /// Canonical start state.
    pub fn start_state(&self) -> SimulationState {
        SimulationState {
            puck_position: self.puck_start,
            bar_position: self.bar_start,
            theta: 0.0,
            velocity_indicator: 0,
            step_count: 0,
        }
    }

    /// Pure transition function. Both actions must already be in [-1, 1].
    ///
    /// Interception is checked before the goal line, so a step satisfying both ends as
    /// [`Outcome::Intercepted`].
    pub fn advance(
        &self,
        state: &SimulationState,
        puck_action: f64,
        bar_action: f64,
    ) -> StepResult {
        let v_p = self.puck_speed();

        let (mut puck_x, mut puck_y) = state.puck_position;
        puck_x += v_p;
        puck_y = (puck_y + v_p * puck_action).clamp(-1.0, 1.0);

        // bar speed uses theta from the previous step
        let (bar_x, bar_y) = state.bar_position;
        let v_w = 2.0 * v_p * (1.0 + THETA_GAIN * state.theta) / 3.0;
        let bar_y = (bar_y + v_w * bar_action).clamp(-1.0, 1.0);

        let velocity_indicator = if bar_y.abs() >= 1.0 {
            0
        } else {
            next_indicator(state.velocity_indicator, bar_action)
        };
        let theta = if velocity_indicator.abs() == MAX_INDICATOR {
            state.theta + 1.0
        } else {
            0.0
        };
        let step_count = state.step_count + 1;

        let intercepted = (bar_x - puck_x).abs() < (self.puck_diameter + self.bar_width) / 2.0
            && (bar_y - puck_y).abs() < (self.puck_diameter + self.bar_length) / 2.0;
        let scored = self.goal_x - (puck_x + self.puck_diameter / 2.0) < self.goal_epsilon;

        let outcome = if intercepted {
            Some(Outcome::Intercepted)
        } else if scored {
            Some(Outcome::Goal)
        } else if step_count > self.max_steps {
            Some(Outcome::Timeout)
        } else {
            None
        };
        let reward = match outcome {
            Some(Outcome::Intercepted) => Reward::BAR_INTERCEPTS,
            Some(Outcome::Goal) => Reward::PUCK_SCORES,
            Some(Outcome::Timeout) | None => Reward::NONE,
        };

        StepResult {
            state: SimulationState {
                puck_position: (puck_x, puck_y),
                bar_position: (bar_x, bar_y),
                theta,
                velocity_indicator,
                step_count,
            },
            reward,
            done: outcome.is_some(),
            info: StepInfo {
                step_count,
                velocity_indicator,
                theta,
                outcome,
            },
        }
    }
}

fn next_indicator(current: i8, bar_action: f64) -> i8 {
    if bar_action >= STRONG_INPUT {
        if current > 0 {
            (current + 1).min(MAX_INDICATOR)
        } else {
            1
        }
    } else if bar_action <= -STRONG_INPUT {
        if current < 0 {
            (current - 1).max(-MAX_INDICATOR)
        } else {
            -1
        }
    } else {
        0
    }
}

/// One penalty shot environment, reset once per episode.
#[derive(Debug, Clone)]
pub struct PenaltyShot {
    geometry: Geometry,
    action_policy: ActionPolicy,
    state: Option<SimulationState>,
    done: bool,
}

impl PenaltyShot {
    pub fn new(geometry: Geometry, action_policy: ActionPolicy) -> Self {
        Self {
            geometry,
            action_policy,
            state: None,
            done: false,
        }
    }

    /// Starts a new episode and returns the start state.
    ///
    /// The physics do not use randomness, `seed` only shows up in the logs.
    pub fn reset(&mut self, seed: u64) -> SimulationState {
        let state = self.geometry.start_state();
        trace!(seed, "reset");
        self.state = Some(state);
        self.done = false;
        state
    }

    pub fn step(
        &mut self,
        puck_action: f64,
        bar_action: f64,
    ) -> Result<StepResult, SimulationError> {
        let state = self.state.ok_or(SimulationError::NotReset)?;
        if self.done {
            return Err(SimulationError::EpisodeFinished);
        }
        let puck_action = self
            .action_policy
            .admit(puck_action)
            .ok_or(SimulationError::InvalidAction(puck_action))?;
        let bar_action = self
            .action_policy
            .admit(bar_action)
            .ok_or(SimulationError::InvalidAction(bar_action))?;

        let result = self.geometry.advance(&state, puck_action, bar_action);
        self.state = Some(result.state);
        self.done = result.done;
        Ok(result)
    }

    pub fn is_done(&self) -> bool {
        self.done
    }
}

impl Default for PenaltyShot {
    fn default() -> Self {
        Self::new(Geometry::default(), ActionPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, Rng, SeedableRng};

    use super::*;

    fn play(env: &mut PenaltyShot, actions: &[(f64, f64)]) -> Vec<StepResult> {
        let mut results = vec![];
        for &(p, b) in actions {
            let r = env.step(p, b).unwrap();
            results.push(r);
            if r.done {
                break;
            }
        }
        results
    }

    fn random_actions(seed: u64, n: usize) -> Vec<(f64, f64)> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| (rng.random_range(-1.0..=1.0), rng.random_range(-1.0..=1.0)))
            .collect()
    }

    #[test]
    fn reset_returns_start_state() {
        let mut env = PenaltyShot::default();
        let state = env.reset(42);
        assert_eq!(state.puck_position, (-0.75, 0.0));
        assert_eq!(state.bar_position, (0.75, 0.0));
        assert_eq!(state.theta, 0.0);
        assert_eq!(state.velocity_indicator, 0);
        assert_eq!(state.step_count, 0);
        assert_eq!(env.reset(7), state);
    }

    #[test]
    fn replay_is_bit_identical() {
        let actions = random_actions(3, 200);
        let mut a = PenaltyShot::default();
        let mut b = PenaltyShot::default();
        a.reset(1);
        b.reset(1);
        let ra = play(&mut a, &actions);
        let rb = play(&mut b, &actions);
        assert_eq!(ra.len(), rb.len());
        for (x, y) in ra.iter().zip(&rb) {
            for (u, v) in x.state.observation().iter().zip(y.state.observation()) {
                assert_eq!(u.to_bits(), v.to_bits());
            }
            assert_eq!(x, y);
        }
    }

    #[test]
    fn puck_scores_when_bar_stays_away() {
        let mut env = PenaltyShot::default();
        env.reset(0);
        let results = play(&mut env, &[(0.0, 1.0); 200]);
        let last = results.last().unwrap();
        assert!(last.done);
        assert_eq!(last.reward, Reward::PUCK_SCORES);
        assert_eq!(last.info.outcome, Some(Outcome::Goal));
        assert_eq!(last.state.step_count, 90);
        assert!(results[..results.len() - 1].iter().all(|r| !r.done));
    }

    #[test]
    fn bar_intercepts_puck_on_its_line() {
        let mut env = PenaltyShot::default();
        env.reset(0);
        let results = play(&mut env, &[(0.0, 0.0); 200]);
        let last = results.last().unwrap();
        assert!(last.done);
        assert_eq!(last.reward, Reward::BAR_INTERCEPTS);
        assert_eq!(last.info.outcome, Some(Outcome::Intercepted));
        assert_eq!(last.state.step_count, 89);
    }

    #[test]
    fn interception_wins_over_goal() {
        // bar sitting on the goal line: both conditions hold on the last step
        let geometry = Geometry {
            bar_start: (0.77, 0.0),
            ..Geometry::default()
        };
        let mut env = PenaltyShot::new(geometry, ActionPolicy::Clamp);
        env.reset(0);
        let results = play(&mut env, &[(0.0, 0.0); 200]);
        let last = results.last().unwrap();
        assert_eq!(last.info.outcome, Some(Outcome::Intercepted));
        assert_eq!(last.reward, Reward::BAR_INTERCEPTS);
    }

    #[test]
    fn terminations_are_exclusive() {
        for seed in 0..50 {
            let mut env = PenaltyShot::default();
            env.reset(seed);
            for r in play(&mut env, &random_actions(seed, 200)) {
                let scored = r.reward == Reward::PUCK_SCORES;
                let intercepted = r.reward == Reward::BAR_INTERCEPTS;
                assert!(!(scored && intercepted));
                assert_eq!(r.done, r.info.outcome.is_some());
            }
        }
    }

    #[test]
    fn sustained_input_builds_theta() {
        let mut env = PenaltyShot::default();
        env.reset(0);
        let results = play(&mut env, &[(0.0, 1.0); 5]);
        let indicators: Vec<_> = results.iter().map(|r| r.state.velocity_indicator).collect();
        let thetas: Vec<_> = results.iter().map(|r| r.state.theta).collect();
        assert_eq!(indicators, vec![1, 2, 3, 3, 3]);
        assert_eq!(thetas, vec![0.0, 0.0, 1.0, 2.0, 3.0]);

        // theta feeds back into the bar speed one step later
        let dy3 = results[3].state.bar_position.1 - results[2].state.bar_position.1;
        let dy2 = results[2].state.bar_position.1 - results[1].state.bar_position.1;
        assert!(dy3 > dy2);

        // reversal restarts the count
        let r = env.step(0.0, -1.0).unwrap();
        assert_eq!(r.state.velocity_indicator, -1);
        assert_eq!(r.state.theta, 0.0);

        // weak input resets it
        let r = env.step(0.0, -0.5).unwrap();
        assert_eq!(r.state.velocity_indicator, 0);
    }

    #[test]
    fn boundary_resets_indicator() {
        let geometry = Geometry {
            bar_start: (0.75, 0.999),
            ..Geometry::default()
        };
        let mut env = PenaltyShot::new(geometry, ActionPolicy::Clamp);
        env.reset(0);
        let r = env.step(0.0, 1.0).unwrap();
        assert_eq!(r.state.bar_position.1, 1.0);
        assert_eq!(r.state.velocity_indicator, 0);
    }

    #[test]
    fn indicator_and_theta_invariants() {
        for seed in 0..30 {
            let mut env = PenaltyShot::default();
            let mut prev = env.reset(seed);
            let mut rng = StdRng::seed_from_u64(seed);
            while !env.is_done() {
                // bias towards strong inputs so the indicator saturates regularly
                let bar = if rng.random_bool(0.8) { 1.0 } else { rng.random_range(-1.0..=1.0) };
                let r = env.step(rng.random_range(-1.0..=1.0), bar).unwrap();
                let s = r.state;
                assert!((-MAX_INDICATOR..=MAX_INDICATOR).contains(&s.velocity_indicator));
                if s.velocity_indicator.abs() == MAX_INDICATOR {
                    assert_eq!(s.theta, prev.theta + 1.0);
                } else {
                    assert_eq!(s.theta, 0.0);
                }
                assert!(s.puck_position.1.abs() <= 1.0 && s.bar_position.1.abs() <= 1.0);
                prev = s;
            }
        }
    }

    #[test]
    fn clamp_policy_treats_large_actions_as_unit() {
        let mut clamped = PenaltyShot::default();
        let mut unit = PenaltyShot::default();
        clamped.reset(0);
        unit.reset(0);
        assert_eq!(clamped.step(2.0, -5.0).unwrap(), unit.step(1.0, -1.0).unwrap());
    }

    #[test]
    fn reject_policy_refuses_large_actions() {
        let mut env = PenaltyShot::new(Geometry::default(), ActionPolicy::Reject);
        env.reset(0);
        assert_eq!(env.step(2.0, 0.0), Err(SimulationError::InvalidAction(2.0)));
        assert!(env.step(1.0, -1.0).is_ok());
    }

    #[test]
    fn non_finite_actions_always_refused() {
        assert_eq!(ActionPolicy::Clamp.admit(f64::NAN), None);
        assert_eq!(ActionPolicy::Clamp.admit(f64::INFINITY), None);
        assert_eq!(ActionPolicy::Clamp.admit(-0.3), Some(-0.3));
    }

    #[test]
    fn stepping_requires_live_episode() {
        let mut env = PenaltyShot::default();
        assert_eq!(env.step(0.0, 0.0), Err(SimulationError::NotReset));
        env.reset(0);
        play(&mut env, &[(0.0, 0.0); 200]);
        assert_eq!(env.step(0.0, 0.0), Err(SimulationError::EpisodeFinished));
        env.reset(0);
        assert!(env.step(0.0, 0.0).is_ok());
    }

    #[test]
    fn action_policy_from_str() {
        assert_eq!("Clamp".parse::<ActionPolicy>(), Ok(ActionPolicy::Clamp));
        assert_eq!("reject".parse::<ActionPolicy>(), Ok(ActionPolicy::Reject));
        assert!("drop".parse::<ActionPolicy>().is_err());
    }
}
