//! Listener side of the coordinator.
//!
//! The accept loop hands every connection to its own thread, which reads the role claim
//! and registers the connection. Registered connections are then owned by the registry
//! until the single [`EpisodeDriver`] thread takes them for an episode. A peer that
//! never claims a role only ever blocks its own thread.
//!
//! # Example
//!
//! ```no_run
//! use penalty_shot::prelude::*;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Configuration::from_env().with_port(5555);
//!     Server::bind(config)?.run()
//! }
//! ```

use std::{
    net::{SocketAddr, TcpListener, TcpStream},
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Receiver},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use anyhow::{anyhow, Context};
use tracing::{debug, info, instrument, warn};

use crate::{
    configuration::Configuration,
    episode::{EpisodeDriver, EpisodeReport},
    error::SessionError,
    protocol::{ClientMessage, ServerMessage},
    registry::{Registry, Rejected},
    render::{NullRenderer, Renderer},
    simulation::Geometry,
    transport::FramedStream,
};

/// A bound, not yet running, coordinator.
pub struct Server {
    listener: TcpListener,
    config: Configuration,
    registry: Arc<Registry>,
    renderer: Box<dyn Renderer>,
    geometry: Geometry,
}

impl Server {
    /// Binds the listener on `config.host:config.port`.
    pub fn bind(config: Configuration) -> anyhow::Result<Server> {
        let address = config.address();
        let listener = TcpListener::bind(&address)
            .with_context(|| format!("could not bind listener on {address}"))?;
        info!(address = %listener.local_addr()?, "listening");
        Ok(Server {
            listener,
            config,
            registry: Arc::new(Registry::new()),
            renderer: Box::new(NullRenderer),
            geometry: Geometry::default(),
        })
    }

    pub fn with_renderer(mut self, renderer: Box<dyn Renderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_geometry(mut self, geometry: Geometry) -> Self {
        self.geometry = geometry;
        self
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("listener has no local address")
    }

    /// Serves until the episode limit of the configuration is reached (forever by default).
    pub fn run(self) -> anyhow::Result<()> {
        let mut handle = self.spawn()?;
        if let Some(driver) = handle.driver.take() {
            driver
                .join()
                .map_err(|_| anyhow!("episode driver panicked"))?;
        }
        handle.shutdown();
        Ok(())
    }

    /// Starts the accept loop and the episode driver on background threads.
    pub fn spawn(self) -> anyhow::Result<ServerHandle> {
        let addr = self.local_addr()?;
        let stop = Arc::new(AtomicBool::new(false));
        let (tx, reports) = mpsc::channel();

        let mut driver =
            EpisodeDriver::new(self.registry.clone(), self.config.clone(), self.renderer)
                .with_geometry(self.geometry)
                .with_reports(tx);
        let driver = thread::Builder::new()
            .name("episode-driver".to_string())
            .spawn(move || driver.run())
            .context("could not spawn episode driver")?;

        let accept = {
            let listener = self.listener;
            let registry = self.registry.clone();
            let config = self.config.clone();
            let stop = stop.clone();
            thread::Builder::new()
                .name("accept-loop".to_string())
                .spawn(move || accept_loop(listener, registry, config, stop))
                .context("could not spawn accept loop")?
        };

        Ok(ServerHandle {
            addr,
            registry: self.registry,
            stop,
            accept: Some(accept),
            driver: Some(driver),
            reports,
        })
    }
}

fn accept_loop(
    listener: TcpListener,
    registry: Arc<Registry>,
    config: Configuration,
    stop: Arc<AtomicBool>,
) {
    for stream in listener.incoming() {
        if stop.load(Ordering::SeqCst) {
            break;
        }
        match stream {
            Ok(stream) => {
                let registry = registry.clone();
                let max_len = config.max_msg_len;
                let claim_timeout = config.step_timeout;
                thread::spawn(move || handle_connection(stream, registry, max_len, claim_timeout));
            }
            Err(e) => warn!(error = %e, "accept failed"),
        }
    }
    debug!("accept loop stopped");
}

/// Reads the role claim of a fresh connection and registers it.
#[instrument(skip_all, fields(peer = ?stream.peer_addr().ok()))]
fn handle_connection(
    stream: TcpStream,
    registry: Arc<Registry>,
    max_len: usize,
    claim_timeout: Option<Duration>,
) {
    let mut connection = FramedStream::new(stream, max_len);
    info!("got connection");
    if let Err(e) = connection.set_read_timeout(claim_timeout) {
        warn!(error = %e, "could not set claim timeout");
    }

    let role = match connection.recv::<ClientMessage>() {
        Ok(ClientMessage::Claim { role }) => role,
        Ok(other) => {
            let reason = SessionError::ProtocolViolation(format!(
                "expected a role claim, got {}",
                other.kind()
            ));
            refuse(connection, &reason);
            return;
        }
        Err(e) => {
            debug!(error = %e, "connection closed before claiming a role");
            connection.shutdown();
            return;
        }
    };

    info!(requested = %role, "role requested");
    match registry.register(role, connection) {
        Ok(()) => info!(playing_as = %role, "registered"),
        Err(Rejected { reason, connection }) => refuse(connection, &reason),
    }
}

fn refuse(mut connection: FramedStream, reason: &SessionError) {
    warn!(%reason, "closing connection");
    let _ = connection.send(&ServerMessage::Rejected {
        reason: reason.to_string(),
    });
    connection.shutdown();
}

/// A running coordinator.
pub struct ServerHandle {
    addr: SocketAddr,
    registry: Arc<Registry>,
    stop: Arc<AtomicBool>,
    accept: Option<JoinHandle<()>>,
    driver: Option<JoinHandle<()>>,
    reports: Receiver<EpisodeReport>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Finished episodes, in order.
    pub fn reports(&self) -> &Receiver<EpisodeReport> {
        &self.reports
    }

    /// Stops accepting, aborts the wait for peers and joins both threads.
    ///
    /// An episode in progress is aborted: its connections are closed under the driver.
    pub fn shutdown(&mut self) {
        if self.stop.swap(true, Ordering::SeqCst) {
            return;
        }
        self.registry.shutdown();

        // unblock `accept` with a throwaway connection
        let mut wake = self.addr;
        if wake.ip().is_unspecified() {
            wake.set_ip([127, 0, 0, 1].into());
        }
        let _ = TcpStream::connect_timeout(&wake, Duration::from_secs(1));

        for handle in [self.accept.take(), self.driver.take()].into_iter().flatten() {
            if handle.join().is_err() {
                warn!("server thread panicked");
            }
        }
        info!("server stopped");
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
