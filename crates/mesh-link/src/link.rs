//! Emulated serial cable
//!
//! A [`DuplexLink`] is one end of a point-to-point byte stream. Two unconnected
//! ends are wired together with [`DuplexLink::connect`]; from then on bytes
//! written on one end can be read, in order, from the other. Each direction is
//! an unbounded FIFO, so writes never block. Reads wait until enough bytes
//! have arrived or the link is closed.
//!
//! `DuplexLink` is a cheap handle: clones refer to the same end. This is how
//! an end owned by one device's port set is handed to another device (or to
//! an observer) for wiring.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::Notify;
use tracing::trace;

use crate::error::LinkError;

static NEXT_LINK_ID: AtomicU64 = AtomicU64::new(1);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One direction of a link
#[derive(Default)]
struct Pipe {
    buffer: Mutex<VecDeque<u8>>,
    readable: Notify,
    closed: AtomicBool,
}

impl Pipe {
    fn push(&self, data: &[u8]) {
        lock(&self.buffer).extend(data.iter().copied());
        self.readable.notify_one();
    }

    fn len(&self) -> usize {
        lock(&self.buffer).len()
    }

    fn clear(&self) -> usize {
        let mut buffer = lock(&self.buffer);
        let discarded = buffer.len();
        buffer.clear();
        discarded
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.readable.notify_waiters();
        self.readable.notify_one();
    }

    async fn read_exact(&self, n: usize) -> Result<Vec<u8>, LinkError> {
        loop {
            {
                let mut buffer = lock(&self.buffer);
                if buffer.len() >= n {
                    return Ok(buffer.drain(..n).collect());
                }
            }
            if self.closed.load(Ordering::Acquire) {
                return Err(LinkError::Closed);
            }
            self.readable.notified().await;
        }
    }

    async fn wait_line(&self) -> Result<(), LinkError> {
        loop {
            if lock(&self.buffer).contains(&b'\n') {
                return Ok(());
            }
            if self.closed.load(Ordering::Acquire) {
                return Err(LinkError::Closed);
            }
            self.readable.notified().await;
        }
    }
}

#[derive(Default)]
struct LinkState {
    /// Bytes arriving from the peer
    rx: Option<Arc<Pipe>>,
    /// Bytes going to the peer
    tx: Option<Arc<Pipe>>,
    peer: Weak<LinkInner>,
    /// Set once `close` has been called on this end
    retired: bool,
}

impl LinkState {
    fn is_connected(&self) -> bool {
        self.rx.is_some()
    }

    fn detach(&mut self) {
        for pipe in [self.rx.take(), self.tx.take()].into_iter().flatten() {
            pipe.close();
        }
        self.peer = Weak::new();
    }
}

struct LinkInner {
    id: u64,
    state: Mutex<LinkState>,
}

/// One end of an emulated serial link
#[derive(Clone)]
pub struct DuplexLink {
    inner: Arc<LinkInner>,
}

impl Default for DuplexLink {
    fn default() -> Self {
        Self::new()
    }
}

impl DuplexLink {
    /// Create a new, unconnected link end
    pub fn new() -> Self {
        Self {
            inner: Arc::new(LinkInner {
                id: NEXT_LINK_ID.fetch_add(1, Ordering::Relaxed),
                state: Mutex::new(LinkState::default()),
            }),
        }
    }

    /// Create two ends that are already connected to each other
    pub fn pair() -> (Self, Self) {
        let a = Self::new();
        let b = Self::new();
        // Fresh ends cannot fail to connect
        let _ = a.connect(&b);
        (a, b)
    }

    /// Unique identifier of this end, for diagnostics
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Returns true if both handles refer to the same end
    pub fn same_end(&self, other: &DuplexLink) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Wire this end to `peer`
    ///
    /// Fails if either end already has a peer, if `peer` is this end, or if
    /// this end has been closed. Nothing is modified on failure.
    pub fn connect(&self, peer: &DuplexLink) -> Result<(), LinkError> {
        if self.same_end(peer) {
            return Err(LinkError::SelfConnection);
        }

        // Lock both ends in id order so concurrent connects cannot deadlock
        let (mut ours, mut theirs) = if self.inner.id < peer.inner.id {
            let ours = lock(&self.inner.state);
            let theirs = lock(&peer.inner.state);
            (ours, theirs)
        } else {
            let theirs = lock(&peer.inner.state);
            let ours = lock(&self.inner.state);
            (ours, theirs)
        };

        if ours.retired {
            return Err(LinkError::Closed);
        }
        if ours.is_connected() {
            return Err(LinkError::AlreadyConnected);
        }
        if theirs.is_connected() || theirs.retired {
            return Err(LinkError::PeerAlreadyConnected);
        }

        let outbound = Arc::new(Pipe::default());
        let inbound = Arc::new(Pipe::default());

        ours.tx = Some(Arc::clone(&outbound));
        ours.rx = Some(Arc::clone(&inbound));
        ours.peer = Arc::downgrade(&peer.inner);

        theirs.tx = Some(inbound);
        theirs.rx = Some(outbound);
        theirs.peer = Arc::downgrade(&self.inner);

        trace!("Link {} connected to link {}", self.inner.id, peer.inner.id);
        Ok(())
    }

    /// Whether this end currently has a peer
    pub fn is_connected(&self) -> bool {
        lock(&self.inner.state).is_connected()
    }

    /// Append bytes to the outbound direction
    pub fn write(&self, data: &[u8]) -> Result<(), LinkError> {
        let tx = lock(&self.inner.state).tx.clone();
        match tx {
            Some(pipe) => {
                pipe.push(data);
                Ok(())
            }
            None => Err(LinkError::NotConnected),
        }
    }

    /// Wait until `n` bytes are available and return exactly those bytes
    ///
    /// Returns [`LinkError::Closed`] if the link is closed before enough bytes
    /// arrive.
    pub async fn read(&self, n: usize) -> Result<Vec<u8>, LinkError> {
        let rx = lock(&self.inner.state).rx.clone();
        match rx {
            Some(pipe) => pipe.read_exact(n).await,
            None => Err(LinkError::NotConnected),
        }
    }

    /// Read bytes one at a time until `\n`, returning the line without it
    pub async fn read_line(&self) -> Result<String, LinkError> {
        let mut line = Vec::new();
        loop {
            let byte = self.read(1).await?;
            if byte[0] == b'\n' {
                break;
            }
            line.extend_from_slice(&byte);
        }
        Ok(String::from_utf8_lossy(&line).into_owned())
    }

    /// Wait until a complete line is waiting to be read, without consuming it
    ///
    /// Completes at once if a newline is already buffered.
    pub async fn wait_line(&self) -> Result<(), LinkError> {
        let rx = lock(&self.inner.state).rx.clone();
        match rx {
            Some(pipe) => pipe.wait_line().await,
            None => Err(LinkError::NotConnected),
        }
    }

    /// Number of bytes waiting to be read
    pub fn available(&self) -> usize {
        lock(&self.inner.state).rx.as_ref().map_or(0, |pipe| pipe.len())
    }

    /// Writes are unbuffered, so there is nothing to push out
    pub fn flush(&self) {}

    /// Discard every byte waiting to be read
    pub fn clear(&self) {
        if let Some(pipe) = lock(&self.inner.state).rx.as_ref() {
            let discarded = pipe.clear();
            if discarded > 0 {
                trace!("Link {} discarded {} unread bytes", self.inner.id, discarded);
            }
        }
    }

    /// Close both directions and disconnect both ends
    ///
    /// Pending reads on either end fail with [`LinkError::Closed`]. This end
    /// cannot be connected again; replace it with a new one. The peer end is
    /// left unconnected and may be reused.
    pub fn close(&self) {
        let peer = {
            let mut state = lock(&self.inner.state);
            let peer = state.peer.upgrade();
            state.detach();
            state.retired = true;
            peer
        };

        if let Some(peer) = peer {
            let mut state = lock(&peer.state);
            let points_back = state
                .peer
                .upgrade()
                .is_some_and(|p| Arc::ptr_eq(&p, &self.inner));
            if points_back {
                state.detach();
            }
        }

        trace!("Link {} closed", self.inner.id);
    }
}

impl fmt::Debug for DuplexLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DuplexLink")
            .field("id", &self.inner.id)
            .field("connected", &self.is_connected())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::time::Duration;

    #[test]
    fn test_connect_two_links() {
        let a = DuplexLink::new();
        let b = DuplexLink::new();

        assert!(!a.is_connected());
        a.connect(&b).unwrap();
        assert!(a.is_connected());
        assert!(b.is_connected());
    }

    #[test]
    fn test_connect_to_self_fails() {
        let a = DuplexLink::new();
        assert_eq!(a.connect(&a.clone()), Err(LinkError::SelfConnection));
        assert!(!a.is_connected());
    }

    #[test]
    fn test_connect_already_connected_fails() {
        let (a, b) = DuplexLink::pair();
        let c = DuplexLink::new();

        assert_eq!(a.connect(&c), Err(LinkError::AlreadyConnected));
        assert_eq!(c.connect(&b), Err(LinkError::PeerAlreadyConnected));
        assert!(!c.is_connected());
    }

    #[test]
    fn test_close_disconnects_both_ends() {
        let (a, b) = DuplexLink::pair();
        a.close();

        assert!(!a.is_connected());
        assert!(!b.is_connected());
        assert_eq!(a.write(b"x"), Err(LinkError::NotConnected));
        assert_eq!(b.write(b"x"), Err(LinkError::NotConnected));
    }

    #[test]
    fn test_closed_end_cannot_reconnect() {
        let (a, b) = DuplexLink::pair();
        a.close();

        let c = DuplexLink::new();
        assert_eq!(a.connect(&c), Err(LinkError::Closed));
        // The far end is free to be wired again
        b.connect(&c).unwrap();
        assert!(b.is_connected());
    }

    #[tokio::test]
    async fn test_write_and_read() {
        let (a, b) = DuplexLink::pair();
        let data = b"Hello, World!";

        a.write(data).unwrap();
        assert_eq!(b.available(), data.len());

        let read = b.read(data.len()).await.unwrap();
        assert_eq!(read, data);
        assert_eq!(b.available(), 0);
    }

    #[tokio::test]
    async fn test_both_directions_independent() {
        let (a, b) = DuplexLink::pair();
        a.write(b"ping").unwrap();
        b.write(b"pong").unwrap();

        assert_eq!(a.read(4).await.unwrap(), b"pong");
        assert_eq!(b.read(4).await.unwrap(), b"ping");
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_waits_for_enough_bytes() {
        let (a, b) = DuplexLink::pair();
        a.write(b"ab").unwrap();

        let reader = tokio::spawn(async move { b.read(4).await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!reader.is_finished());

        a.write(b"cd").unwrap();
        assert_eq!(reader.await.unwrap().unwrap(), b"abcd");
    }

    #[tokio::test]
    async fn test_read_line() {
        let (a, b) = DuplexLink::pair();
        a.write(b"RTS\nMSG,x,,a\n").unwrap();

        assert_eq!(b.read_line().await.unwrap(), "RTS");
        assert_eq!(b.read_line().await.unwrap(), "MSG,x,,a");
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_line_wakes_on_newline() {
        let (a, b) = DuplexLink::pair();

        let waiter = {
            let b = b.clone();
            tokio::spawn(async move { b.wait_line().await })
        };
        a.write(b"RT").unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        a.write(b"S\n").unwrap();
        waiter.await.unwrap().unwrap();
        // Waiting does not consume the line
        assert_eq!(b.read_line().await.unwrap(), "RTS");
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_line_fails_when_closed() {
        let (a, b) = DuplexLink::pair();

        let waiter = {
            let b = b.clone();
            tokio::spawn(async move { b.wait_line().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        a.close();
        assert_eq!(waiter.await.unwrap(), Err(LinkError::Closed));
        assert_eq!(DuplexLink::new().wait_line().await, Err(LinkError::NotConnected));
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_interrupts_pending_read() {
        let (a, b) = DuplexLink::pair();

        let reader = {
            let b = b.clone();
            tokio::spawn(async move { b.read_line().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        a.close();
        assert_eq!(reader.await.unwrap(), Err(LinkError::Closed));
    }

    #[tokio::test]
    async fn test_read_unconnected() {
        let a = DuplexLink::new();
        assert_eq!(a.read(1).await, Err(LinkError::NotConnected));
        assert_eq!(a.available(), 0);
    }

    #[test]
    fn test_clear_discards_pending() {
        let (a, b) = DuplexLink::pair();
        a.write(b"stale\n").unwrap();
        b.clear();
        assert_eq!(b.available(), 0);

        // Clearing the read side does not affect the other direction
        a.write(b"keep").unwrap();
        b.write(b"x").unwrap();
        a.clear();
        assert_eq!(a.available(), 0);
        assert_eq!(b.available(), 4);
    }

    proptest! {
        #[test]
        fn bytes_arrive_in_order(chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 0..8)) {
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let (a, b) = DuplexLink::pair();

            let expected: Vec<u8> = chunks.concat();
            for chunk in &chunks {
                a.write(chunk).unwrap();
            }

            let read = runtime.block_on(b.read(expected.len())).unwrap();
            prop_assert_eq!(read, expected);
            prop_assert_eq!(b.available(), 0);
        }
    }
}
