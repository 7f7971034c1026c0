//! Session lifecycle: connection state machine, drift tracking, and the
//! cooperative stop token shared between the transfer thread and its
//! controlling thread.

use crossbeam_channel::{bounded, Receiver, Sender};
use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::ConnectError;

/// Lifecycle states of one session instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Connected,
    Disconnected,
    Errored,
}

impl SessionState {
    /// Whether `next` is a legal transition from this state.
    ///
    /// `Connected -> Connecting` is the drift-triggered reconnect path;
    /// `Disconnected` and `Errored` are terminal.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Idle, Connecting)
                | (Connecting, Connected)
                | (Connecting, Errored)
                | (Connecting, Disconnected)
                | (Connected, Disconnected)
                | (Connected, Errored)
                | (Connected, Connecting)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Disconnected | SessionState::Errored)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
            SessionState::Disconnected => "disconnected",
            SessionState::Errored => "errored",
        };
        f.write_str(name)
    }
}

/// State-change notification delivered to the presentation layer.
/// Advisory only; the transfer loop never blocks on delivery.
#[derive(Debug, Clone)]
pub struct StateEvent {
    pub state: SessionState,
    pub message: String,
}

pub type EventSender = Sender<StateEvent>;
pub type EventReceiver = Receiver<StateEvent>;

/// Create the event channel an agent reports through
pub fn event_channel() -> (EventSender, EventReceiver) {
    bounded(64)
}

/// Tracks the lifecycle of one state machine instance and publishes
/// transitions as events.
pub struct StateReporter {
    state: SessionState,
    events: EventSender,
}

impl StateReporter {
    pub fn new(events: EventSender) -> Self {
        Self {
            state: SessionState::Idle,
            events,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Move to `next` and publish the change. An illegal transition is an
    /// agent bug; it is asserted in debug builds and logged, never fatal.
    pub fn transition(&mut self, next: SessionState, message: impl Into<String>) {
        let message = message.into();
        if !self.state.can_transition_to(next) {
            debug_assert!(false, "illegal transition {} -> {}", self.state, next);
            tracing::warn!("illegal session transition {} -> {}", self.state, next);
        }
        match next {
            SessionState::Errored => tracing::warn!("session {} -> {}: {}", self.state, next, message),
            _ => tracing::info!("session {} -> {}: {}", self.state, next, message),
        }
        self.state = next;
        // Presentation layer may be slow or gone; never block the loop
        let _ = self.events.try_send(StateEvent { state: next, message });
    }
}

/// Cooperative cancellation flag, observed at loop-iteration boundaries.
///
/// Setting it does not interrupt an in-progress blocking call, so stop
/// latency is bounded by one in-flight chunk transfer (unbounded if the
/// peer stalls entirely).
#[derive(Clone, Debug, Default)]
pub struct StopToken {
    flag: Arc<AtomicBool>,
}

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// One live connection plus its drift counter.
///
/// Owned exclusively by the transfer loop; dropping it closes the socket,
/// so an agent can never hold two live sessions at once.
pub struct Session {
    stream: TcpStream,
    drift: u64,
}

impl Session {
    /// Connect to the sender (receiver role)
    pub fn connect(addr: SocketAddr) -> Result<Self, ConnectError> {
        let stream = TcpStream::connect(addr).map_err(|source| ConnectError::Connect {
            addr: addr.to_string(),
            source,
        })?;
        Ok(Self::from_stream(stream))
    }

    /// Wrap an accepted connection (sender role)
    pub fn from_stream(stream: TcpStream) -> Self {
        // Chunks are small and latency-sensitive; don't let Nagle batch them
        let _ = stream.set_nodelay(true);
        Self { stream, drift: 0 }
    }

    pub fn stream(&mut self) -> &mut TcpStream {
        &mut self.stream
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.stream.peer_addr().ok()
    }

    /// Charge `reads` payload-read iterations against this session
    pub fn add_drift(&mut self, reads: u64) {
        self.drift += reads;
    }

    pub fn drift(&self) -> u64 {
        self.drift
    }

    /// Whether accumulated drift calls for a proactive reconnect
    pub fn drift_exceeded(&self, threshold: u64) -> bool {
        self.drift > threshold
    }
}
