//! Capture-and-send agent (TCP server role)
//!
//! Binds, accepts exactly one peer per listen cycle, then forwards captured
//! chunks over the socket until the session fails or a stop is requested.
//! Backpressure is direct: a blocking socket write stalls consumption of the
//! capture stream; there is no queueing between device and network.

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread::{self, JoinHandle};
use std::sync::Arc;

use crate::audio::capture::CaptureStream;
use crate::config::{NetworkConfig, WireFormat};
use crate::error::{ConnectError, DeviceError, Result};
use crate::net::session::{
    event_channel, EventReceiver, EventSender, Session, SessionState, StateReporter, StopToken,
};
use crate::protocol;

/// Opens a fresh capture stream for each accepted session, so the device
/// is released while the agent sits idle between peers.
pub type CaptureFactory =
    Arc<dyn Fn() -> std::result::Result<Box<dyn CaptureStream>, DeviceError> + Send + Sync>;

/// How a send session ended
enum SessionEnd {
    /// Explicit stop was observed
    Stopped,
    /// Capture or socket failure; the listen loop decides whether to retry
    Failed,
}

/// Capture-and-send agent. `start` spawns the transfer thread, `stop` sets
/// the cooperative token and joins it.
pub struct SenderAgent {
    network: NetworkConfig,
    capture_factory: CaptureFactory,
    stop: StopToken,
    thread_handle: Option<JoinHandle<()>>,
    event_tx: EventSender,
    event_rx: EventReceiver,
    local_addr: Option<SocketAddr>,
}

impl SenderAgent {
    pub fn new(network: NetworkConfig, capture_factory: CaptureFactory) -> Self {
        let (event_tx, event_rx) = event_channel();
        Self {
            network,
            capture_factory,
            stop: StopToken::new(),
            thread_handle: None,
            event_tx,
            event_rx,
            local_addr: None,
        }
    }

    /// Receiver for connection-state notifications
    pub fn events(&self) -> EventReceiver {
        self.event_rx.clone()
    }

    /// Address the listener actually bound to (useful with port 0)
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn is_running(&self) -> bool {
        self.thread_handle.is_some()
    }

    /// Bind the listener and spawn the transfer thread.
    ///
    /// Bind errors surface here synchronously; everything after the bind is
    /// reported through the event channel.
    pub fn start(&mut self) -> Result<()> {
        if self.thread_handle.is_some() {
            return Ok(());
        }

        let addr = self.network.socket_addr();
        let listener = TcpListener::bind(addr).map_err(|source| ConnectError::Bind {
            addr: addr.to_string(),
            source,
        })?;
        self.local_addr = listener.local_addr().ok();

        self.stop = StopToken::new();
        let stop = self.stop.clone();
        let network = self.network.clone();
        let factory = self.capture_factory.clone();
        let events = self.event_tx.clone();

        let handle = thread::Builder::new()
            .name("sender-transfer".to_string())
            .spawn(move || run_listen_loop(listener, network, factory, stop, events))
            .map_err(crate::Error::Io)?;

        self.thread_handle = Some(handle);
        Ok(())
    }

    /// Request a cooperative stop and wait for the transfer thread.
    pub fn stop(&mut self) {
        self.stop.stop();
        if let Some(addr) = self.local_addr {
            // Wake a blocked accept so the loop can observe the token
            let _ = TcpStream::connect(addr);
        }
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SenderAgent {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Outer listen loop: one session per accepted peer. In always-on mode a
/// failed session returns here to await the next peer; it is the retry
/// mechanism for new connections, never for a broken one.
fn run_listen_loop(
    listener: TcpListener,
    network: NetworkConfig,
    factory: CaptureFactory,
    stop: StopToken,
    events: EventSender,
) {
    let local = listener
        .local_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "<unknown>".to_string());

    loop {
        if stop.is_stopped() {
            break;
        }

        // Fresh state machine instance per listen cycle
        let mut reporter = StateReporter::new(events.clone());
        reporter.transition(SessionState::Connecting, format!("listening on {}", local));

        let stream = match listener.accept() {
            Ok((stream, peer)) => {
                tracing::debug!("accepted connection from {}", peer);
                stream
            }
            Err(e) => {
                reporter.transition(SessionState::Errored, format!("accept failed: {}", e));
                if network.always_on {
                    continue;
                }
                break;
            }
        };

        if stop.is_stopped() {
            reporter.transition(SessionState::Disconnected, "stopped");
            break;
        }

        let session = Session::from_stream(stream);
        let peer = session
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|| "<unknown>".to_string());
        reporter.transition(SessionState::Connected, format!("peer {} connected", peer));

        let capture = match (factory)() {
            Ok(capture) => capture,
            Err(e) => {
                reporter.transition(
                    SessionState::Errored,
                    format!("failed to open capture device: {}", e),
                );
                if network.always_on {
                    continue;
                }
                break;
            }
        };

        match run_send_session(session, capture, network.wire_format, &stop, &mut reporter) {
            SessionEnd::Stopped => break,
            SessionEnd::Failed => {
                if !network.always_on {
                    break;
                }
            }
        }
        // Session and capture dropped: socket and device released before
        // the next listen cycle
    }
}

/// Steady-state send loop for one session. Consumes the session and the
/// capture stream so both are released on every exit path.
fn run_send_session(
    mut session: Session,
    mut capture: Box<dyn CaptureStream>,
    wire_format: WireFormat,
    stop: &StopToken,
    reporter: &mut StateReporter,
) -> SessionEnd {
    loop {
        // Observed only at the iteration boundary; an in-flight transfer
        // always completes first
        if stop.is_stopped() {
            reporter.transition(SessionState::Disconnected, "stopped");
            return SessionEnd::Stopped;
        }

        let chunk = match capture.read_chunk() {
            Ok(chunk) => chunk,
            Err(e) => {
                reporter.transition(SessionState::Errored, format!("capture failed: {}", e));
                return SessionEnd::Failed;
            }
        };

        let written = match wire_format {
            WireFormat::Framed => protocol::write_frame(session.stream(), &chunk),
            WireFormat::Fixed => protocol::write_block(session.stream(), &chunk),
        };
        if let Err(e) = written {
            reporter.transition(SessionState::Errored, format!("send failed: {}", e));
            return SessionEnd::Failed;
        }
    }
}
