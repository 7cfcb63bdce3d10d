//! Roles and the closed set of messages exchanged with peers.
//!
//! Every frame carries exactly one of these variants, JSON encoded with a `type` tag.
//! Anything that does not decode into the expected enum is a protocol violation.

use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::simulation::{Reward, SimulationState, StepInfo, StepResult};

/// The two seats of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "P")]
    Puck,
    #[serde(rename = "B")]
    Bar,
}

impl Role {
    pub const ALL: [Role; 2] = [Role::Puck, Role::Bar];

    /// Identifier used on the wire.
    pub fn code(self) -> &'static str {
        match self {
            Role::Puck => "P",
            Role::Bar => "B",
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Puck => write!(f, "puck"),
            Role::Bar => write!(f, "bar"),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    /// Accepts both the wire codes and the full names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "p" | "puck" => Ok(Role::Puck),
            "b" | "bar" => Ok(Role::Bar),
            other => Err(format!("unknown role '{other}' (expected puck or bar)")),
        }
    }
}

/// Messages sent by an agent to the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// First message on a connection.
    Claim { role: Role },
    /// Sent once after `Connected`, gates the reset.
    Start,
    /// One action per step, in [-1, 1].
    Action { value: f64 },
}

/// Messages sent by the coordinator to an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Connected,
    Rejected {
        reason: String,
    },
    Reset {
        state: SimulationState,
        done: bool,
    },
    Step {
        state: SimulationState,
        reward: Reward,
        done: bool,
        info: StepInfo,
    },
    /// Best-effort notice that the episode was torn down early.
    Aborted {
        reason: String,
    },
}

impl From<StepResult> for ServerMessage {
    fn from(r: StepResult) -> Self {
        ServerMessage::Step {
            state: r.state,
            reward: r.reward,
            done: r.done,
            info: r.info,
        }
    }
}

impl ServerMessage {
    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Connected => "connected",
            ServerMessage::Rejected { .. } => "rejected",
            ServerMessage::Reset { .. } => "reset",
            ServerMessage::Step { .. } => "step",
            ServerMessage::Aborted { .. } => "aborted",
        }
    }
}

impl ClientMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Claim { .. } => "claim",
            ClientMessage::Start => "start",
            ClientMessage::Action { .. } => "action",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_uses_single_letter_codes() {
        let json = serde_json::to_string(&ClientMessage::Claim { role: Role::Puck }).unwrap();
        assert_eq!(json, format!(r#"{{"type":"claim","role":"{}"}}"#, Role::Puck.code()));
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"claim","role":"B"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Claim { role: Role::Bar });
    }

    #[test]
    fn unknown_variants_do_not_decode() {
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"restart"}"#).is_err());
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"claim","role":"X"}"#).is_err());
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"action"}"#).is_err());
        assert!(serde_json::from_str::<ClientMessage>("start").is_err());
    }

    #[test]
    fn role_parsing() {
        assert_eq!("P".parse::<Role>(), Ok(Role::Puck));
        assert_eq!("bar".parse::<Role>(), Ok(Role::Bar));
        assert!("goalie".parse::<Role>().is_err());
    }
}
