//! Rendezvous of the two roled connections.
//!
//! The registry owns accepted connections until both roles are filled. The episode driver
//! then takes both out as a [`Session`]; the slots stay marked as playing until
//! [`Registry::clear`] so that nobody else can claim a role mid-episode. A waiting
//! connection whose peer hung up does not keep its role: the next claim replaces it.

use std::sync::{Condvar, Mutex};

use tracing::{debug, info, instrument, warn};

use crate::{
    error::SessionError,
    protocol::{Role, ServerMessage},
    transport::FramedStream,
};

#[derive(Debug, Default)]
enum Slot {
    #[default]
    Empty,
    Waiting(FramedStream),
    Playing,
}

impl Slot {
    fn is_empty(&self) -> bool {
        matches!(self, Slot::Empty)
    }
}

#[derive(Debug, Default)]
struct Slots {
    puck: Slot,
    bar: Slot,
    /// Handles on the connections of the episode being played.
    playing: Vec<FramedStream>,
    shutdown: bool,
}

impl Slots {
    fn get_mut(&mut self, role: Role) -> &mut Slot {
        match role {
            Role::Puck => &mut self.puck,
            Role::Bar => &mut self.bar,
        }
    }

    fn get(&self, role: Role) -> &Slot {
        match role {
            Role::Puck => &self.puck,
            Role::Bar => &self.bar,
        }
    }
}

/// A refused registration. The connection is handed back so the caller can tell the
/// peer why before closing it.
#[derive(Debug)]
pub struct Rejected {
    pub reason: SessionError,
    pub connection: FramedStream,
}

/// Exactly one puck and one bar connection, owned by the episode driver for one episode.
#[derive(Debug)]
pub struct Session {
    pub puck: FramedStream,
    pub bar: FramedStream,
}

impl Session {
    pub fn peer(&self, role: Role) -> &FramedStream {
        match role {
            Role::Puck => &self.puck,
            Role::Bar => &self.bar,
        }
    }

    pub fn peer_mut(&mut self, role: Role) -> &mut FramedStream {
        match role {
            Role::Puck => &mut self.puck,
            Role::Bar => &mut self.bar,
        }
    }

    /// Closes both connections.
    pub fn close(self) {
        self.puck.shutdown();
        self.bar.shutdown();
    }
}

#[derive(Debug, Default)]
pub struct Registry {
    slots: Mutex<Slots>,
    ready: Condvar,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `role` for `connection`.
    ///
    /// The check and the insertion happen under one lock, and the `Connected` reply is
    /// sent before the lock is released, so a peer is only ever told it holds a role it
    /// actually holds.
    #[instrument(skip(self, connection))]
    pub fn register(&self, role: Role, mut connection: FramedStream) -> Result<(), Rejected> {
        let mut slots = self.slots.lock().expect("poisoned");
        if slots.shutdown {
            return Err(Rejected {
                reason: SessionError::ProtocolViolation("server shutting down".to_string()),
                connection,
            });
        }
        let hung_up = matches!(slots.get(role), Slot::Waiting(held) if held.is_closed());
        if hung_up {
            info!(peer = %role, "waiting peer hung up, releasing its role");
            if let Slot::Waiting(held) = std::mem::take(slots.get_mut(role)) {
                held.shutdown();
            }
        }
        if !slots.get(role).is_empty() {
            debug!("role already held");
            return Err(Rejected {
                reason: SessionError::RoleConflict(role),
                connection,
            });
        }
        if let Err(e) = connection.send(&ServerMessage::Connected) {
            return Err(Rejected {
                reason: SessionError::from_transport(role, e),
                connection,
            });
        }
        *slots.get_mut(role) = Slot::Waiting(connection);
        info!(peer = %role, "role registered");

        if Self::pair_ready(&slots) {
            self.ready.notify_all();
        }
        Ok(())
    }

    fn pair_ready(slots: &Slots) -> bool {
        matches!(
            (&slots.puck, &slots.bar),
            (Slot::Waiting(_), Slot::Waiting(_))
        )
    }

    /// Blocks until both roles are registered, then hands both connections over.
    ///
    /// Returns `None` once [`Registry::shutdown`] was called.
    pub fn wait_for_session(&self) -> Option<Session> {
        let mut slots = self
            .ready
            .wait_while(self.slots.lock().expect("poisoned"), |s| {
                !s.shutdown && !Self::pair_ready(s)
            })
            .expect("poisoned");
        if slots.shutdown {
            return None;
        }
        let puck = std::mem::replace(&mut slots.puck, Slot::Playing);
        let bar = std::mem::replace(&mut slots.bar, Slot::Playing);
        let session = match (puck, bar) {
            (Slot::Waiting(puck), Slot::Waiting(bar)) => Session { puck, bar },
            _ => unreachable!("pair_ready checked both slots"),
        };
        for role in Role::ALL {
            match session.peer(role).try_clone() {
                Ok(handle) => slots.playing.push(handle),
                Err(e) => {
                    warn!(peer = %role, error = %e, "cannot track connection for shutdown")
                }
            }
        }
        Some(session)
    }

    /// True when both roles are held, either waiting or playing.
    pub fn both_present(&self) -> bool {
        let slots = self.slots.lock().expect("poisoned");
        !slots.puck.is_empty() && !slots.bar.is_empty()
    }

    pub fn is_held(&self, role: Role) -> bool {
        !self.slots.lock().expect("poisoned").get(role).is_empty()
    }

    /// Releases both roles. Connections still waiting in a slot are closed.
    pub fn clear(&self) {
        let mut slots = self.slots.lock().expect("poisoned");
        slots.playing.clear();
        for role in Role::ALL {
            if let Slot::Waiting(connection) = std::mem::take(slots.get_mut(role)) {
                connection.shutdown();
            }
        }
        debug!("registry cleared");
    }

    /// Wakes any waiter, refuses further registrations and closes the connections of
    /// the episode in progress, which makes it abort at its next read.
    pub fn shutdown(&self) {
        let mut slots = self.slots.lock().expect("poisoned");
        slots.shutdown = true;
        for connection in slots.playing.drain(..) {
            connection.shutdown();
        }
        drop(slots);
        self.clear();
        self.ready.notify_all();
    }
}
