//! Synchronous client used by agents.
//!
//! ```no_run
//! use penalty_shot::prelude::*;
//!
//! fn main() -> anyhow::Result<()> {
//!     let mut client = Client::new(Role::Puck, Configuration::from_env());
//!     let (_state, mut done) = client.connect()?;
//!     while !done {
//!         done = client.step(0.0)?.done;
//!     }
//!     client.close();
//!     Ok(())
//! }
//! ```

use tracing::{debug, instrument, trace};

use crate::{
    configuration::Configuration,
    error::ClientError,
    protocol::{ClientMessage, Role, ServerMessage},
    simulation::{SimulationState, StepResult},
    transport::FramedStream,
};

#[derive(Debug)]
pub struct Client {
    role: Role,
    config: Configuration,
    stream: Option<FramedStream>,
    done: bool,
}

impl Client {
    pub fn new(role: Role, config: Configuration) -> Self {
        Self {
            role,
            config,
            stream: None,
            done: false,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Claims the role, sends `start`, and blocks until the episode is reset.
    ///
    /// This returns only once the other role has joined and started too.
    #[instrument(skip(self), fields(role = %self.role))]
    pub fn connect(&mut self) -> Result<(SimulationState, bool), ClientError> {
        self.close();
        let mut stream = FramedStream::connect(&self.config.address(), self.config.max_msg_len)?;

        match stream.send_and_recv(&ClientMessage::Claim { role: self.role })? {
            ServerMessage::Connected => debug!("connected"),
            other => return Err(unexpected(other)),
        }

        let reply = stream.send_and_recv(&ClientMessage::Start)?;
        match reply {
            ServerMessage::Reset { state, done } => {
                debug!("episode started");
                self.stream = Some(stream);
                self.done = done;
                Ok((state, done))
            }
            other => Err(unexpected(other)),
        }
    }

    /// Sends one action and waits for the step result shared with the other peer.
    pub fn step(&mut self, action: f64) -> Result<StepResult, ClientError> {
        if self.done {
            return Err(ClientError::NotConnected);
        }
        let stream = self.stream.as_mut().ok_or(ClientError::NotConnected)?;

        let reply = stream.send_and_recv(&ClientMessage::Action { value: action });
        let reply = match reply {
            Ok(reply) => reply,
            Err(e) => {
                self.close();
                return Err(e.into());
            }
        };
        match reply {
            ServerMessage::Step {
                state,
                reward,
                done,
                info,
            } => {
                trace!(step = state.step_count, done, "step result");
                self.done = done;
                Ok(StepResult {
                    state,
                    reward,
                    done,
                    info,
                })
            }
            other => {
                self.close();
                Err(unexpected(other))
            }
        }
    }

    /// Whether the current episode reached a terminal step.
    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            stream.shutdown();
        }
        self.done = false;
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.close();
    }
}

fn unexpected(msg: ServerMessage) -> ClientError {
    match msg {
        ServerMessage::Rejected { reason } => ClientError::Rejected(reason),
        ServerMessage::Aborted { reason } => {
            debug!(%reason, "episode aborted by server");
            ClientError::Disconnected
        }
        other => ClientError::UnexpectedReply(other.kind().to_string()),
    }
}
