//! Length-prefixed framing over a `TcpStream`.
//!
//! A frame is a 4-byte big-endian length followed by a JSON payload of at most
//! `max_len` bytes. Both sides of the protocol use [`FramedStream`].

use std::{
    io::{ErrorKind, Read, Write},
    net::{Shutdown, TcpStream},
    time::Duration,
};

use serde::{de::DeserializeOwned, Serialize};
use tracing::{instrument, trace};

use crate::error::TransportError;

const HEADER_LEN: usize = 4;
/// The length prefix is a `u32`.
const MAX_FRAME_LEN: usize = u32::MAX as usize;

#[derive(Debug)]
pub struct FramedStream {
    stream: TcpStream,
    max_len: usize,
}

impl FramedStream {
    /// `max_len` is capped at what the length prefix can carry.
    pub fn new(stream: TcpStream, max_len: usize) -> Self {
        // frames are tiny, don't let Nagle hold them back
        let _ = stream.set_nodelay(true);
        Self {
            stream,
            max_len: max_len.min(MAX_FRAME_LEN),
        }
    }

    pub fn connect(addr: &str, max_len: usize) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(addr)?;
        Ok(Self::new(stream, max_len))
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// `None` blocks forever.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<(), TransportError> {
        self.stream.set_read_timeout(timeout)?;
        Ok(())
    }

    pub fn send<T: Serialize>(&mut self, msg: &T) -> Result<(), TransportError> {
        let payload = serde_json::to_vec(msg)?;
        if payload.len() > self.max_len {
            return Err(TransportError::FrameTooLarge {
                len: payload.len(),
                max: self.max_len,
            });
        }
        let len = u32::try_from(payload.len()).map_err(|_| TransportError::FrameTooLarge {
            len: payload.len(),
            max: self.max_len,
        })?;
        let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
        frame.extend_from_slice(&len.to_be_bytes());
        frame.extend_from_slice(&payload);
        self.stream.write_all(&frame)?;
        self.stream.flush()?;
        trace!(len = payload.len(), "frame sent");
        Ok(())
    }

    pub fn recv<T: DeserializeOwned>(&mut self) -> Result<T, TransportError> {
        let mut header = [0u8; HEADER_LEN];
        self.stream.read_exact(&mut header)?;
        let len = u32::from_be_bytes(header) as usize;
        if len > self.max_len {
            return Err(TransportError::FrameTooLarge {
                len,
                max: self.max_len,
            });
        }
        if len == 0 {
            return Err(TransportError::Malformed("empty frame".to_string()));
        }
        let mut payload = vec![0u8; len];
        self.stream.read_exact(&mut payload)?;
        trace!(len, "frame received");
        Ok(serde_json::from_slice(&payload)?)
    }

    /// One request/response exchange.
    #[instrument(skip_all)]
    pub fn send_and_recv<Req: Serialize, Resp: DeserializeOwned>(
        &mut self,
        msg: &Req,
    ) -> Result<Resp, TransportError> {
        self.send(msg)?;
        self.recv()
    }

    /// Checks without blocking whether the peer hung up. Pending data is left unread.
    pub fn is_closed(&self) -> bool {
        if self.stream.set_nonblocking(true).is_err() {
            return true;
        }
        let mut buf = [0u8; 1];
        let closed = match self.stream.peek(&mut buf) {
            Ok(0) => true,
            Ok(_) => false,
            Err(e) => !matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted),
        };
        if self.stream.set_nonblocking(false).is_err() {
            return true;
        }
        closed
    }

    /// Another handle on the same socket, so it can be shut down from another thread.
    pub fn try_clone(&self) -> Result<FramedStream, TransportError> {
        Ok(Self {
            stream: self.stream.try_clone()?,
            max_len: self.max_len,
        })
    }

    /// Closes both directions. Errors are ignored, the peer may already be gone.
    pub fn shutdown(&self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

#[cfg(test)]
mod tests {
    use std::{net::TcpListener, thread};

    use serde::Deserialize;

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Ping {
        n: u32,
    }

    fn pair(max_len: usize) -> (FramedStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        (FramedStream::new(server, max_len), client)
    }

    #[test]
    fn frames_cross_the_wire() {
        let (mut a, b) = pair(64);
        let mut b = FramedStream::new(b, 64);
        a.send(&Ping { n: 7 }).unwrap();
        assert_eq!(b.recv::<Ping>().unwrap(), Ping { n: 7 });
    }

    #[test]
    fn closed_peer_is_a_disconnect() {
        let (mut a, b) = pair(64);
        drop(b);
        assert!(matches!(a.recv::<Ping>(), Err(TransportError::Disconnected)));
    }

    #[test]
    fn oversized_frames_are_refused() {
        let (mut a, mut b) = pair(8);
        assert!(matches!(
            a.send(&Ping { n: 123456 }),
            Err(TransportError::FrameTooLarge { max: 8, .. })
        ));

        b.write_all(&1000u32.to_be_bytes()).unwrap();
        assert!(matches!(
            a.recv::<Ping>(),
            Err(TransportError::FrameTooLarge { len: 1000, max: 8 })
        ));
    }

    #[test]
    fn garbage_is_malformed() {
        let (mut a, mut b) = pair(64);
        b.write_all(&3u32.to_be_bytes()).unwrap();
        b.write_all(b"abc").unwrap();
        assert!(matches!(a.recv::<Ping>(), Err(TransportError::Malformed(_))));
    }

    #[test]
    fn max_len_fits_the_length_prefix() {
        let (a, _b) = pair(usize::MAX);
        assert_eq!(a.max_len(), u32::MAX as usize);
        let (a, _b) = pair(64);
        assert_eq!(a.max_len(), 64);
    }

    #[test]
    fn hang_up_is_noticed_without_reading() {
        let (mut a, mut b) = pair(64);
        assert!(!a.is_closed());

        // pending data is not a hang up and is still readable afterwards
        b.write_all(&9u32.to_be_bytes()).unwrap();
        b.write_all(br#"{"n":42}"#).unwrap();
        b.write_all(b" ").unwrap();
        thread::sleep(Duration::from_millis(50));
        assert!(!a.is_closed());
        assert_eq!(a.recv::<Ping>().unwrap(), Ping { n: 42 });
        assert!(!a.is_closed());

        drop(b);
        thread::sleep(Duration::from_millis(50));
        assert!(a.is_closed());
    }

    #[test]
    fn clone_shuts_down_the_shared_socket() {
        let (mut a, b) = pair(64);
        let _b = FramedStream::new(b, 64);
        a.try_clone().unwrap().shutdown();
        assert!(matches!(a.recv::<Ping>(), Err(TransportError::Disconnected)));
    }

    #[test]
    fn silent_peer_times_out() {
        let (mut a, _b) = pair(64);
        a.set_read_timeout(Some(Duration::from_millis(50))).unwrap();
        assert!(matches!(a.recv::<Ping>(), Err(TransportError::Timeout)));
    }
}
