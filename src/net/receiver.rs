//! Receive-and-play agent (TCP client role)
//!
//! Connects to the sender and copies framed (or fixed-size) payloads to the
//! playback stream. In the framed variant the agent also runs the drift
//! policy: payload-read iterations are counted per session and, past a
//! threshold, the connection is torn down and re-established to shed the
//! latency piling up in the OS receive buffer. The reconnect costs a brief
//! audio gap; no clock or buffer-occupancy measurement is involved.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::config::{AudioFormat, NetworkConfig, WireFormat};
use crate::error::{DeviceError, Result};
use crate::net::session::{
    event_channel, EventReceiver, EventSender, Session, SessionState, StateReporter, StopToken,
};
use crate::protocol::{self, BlockRead, FrameRead, FrameReader};

/// Opens the playback stream the agent writes into. Called once per run;
/// the device survives drift reconnects.
pub type PlaybackFactory = Arc<
    dyn Fn() -> std::result::Result<Box<dyn crate::audio::PlaybackStream>, DeviceError>
        + Send
        + Sync,
>;

/// Receive-and-play agent. `start` spawns the transfer thread, `stop` sets
/// the cooperative token and joins it.
///
/// The token is only observed between full frame receptions, so stop latency
/// is bounded by one in-flight transfer — and unbounded if the peer goes
/// silent, since the blocking read never returns.
pub struct ReceiverAgent {
    audio: AudioFormat,
    network: NetworkConfig,
    playback_factory: PlaybackFactory,
    stop: StopToken,
    thread_handle: Option<JoinHandle<()>>,
    event_tx: EventSender,
    event_rx: EventReceiver,
}

impl ReceiverAgent {
    pub fn new(audio: AudioFormat, network: NetworkConfig, playback_factory: PlaybackFactory) -> Self {
        let (event_tx, event_rx) = event_channel();
        Self {
            audio,
            network,
            playback_factory,
            stop: StopToken::new(),
            thread_handle: None,
            event_tx,
            event_rx,
        }
    }

    /// Receiver for connection-state notifications
    pub fn events(&self) -> EventReceiver {
        self.event_rx.clone()
    }

    pub fn is_running(&self) -> bool {
        self.thread_handle.is_some()
    }

    /// Spawn the transfer thread; connect results are reported through the
    /// event channel.
    pub fn start(&mut self) -> Result<()> {
        if self.thread_handle.is_some() {
            return Ok(());
        }

        self.stop = StopToken::new();
        let stop = self.stop.clone();
        let audio = self.audio;
        let network = self.network.clone();
        let factory = self.playback_factory.clone();
        let events = self.event_tx.clone();

        let handle = thread::Builder::new()
            .name("receiver-transfer".to_string())
            .spawn(move || run_receive_loop(audio, network, factory, stop, events))
            .map_err(crate::Error::Io)?;

        self.thread_handle = Some(handle);
        Ok(())
    }

    /// Request a cooperative stop and wait for the transfer thread.
    pub fn stop(&mut self) {
        self.stop.stop();
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ReceiverAgent {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_receive_loop(
    audio: AudioFormat,
    network: NetworkConfig,
    factory: PlaybackFactory,
    stop: StopToken,
    events: EventSender,
) {
    let addr = network.socket_addr();
    let mut reporter = StateReporter::new(events);
    reporter.transition(SessionState::Connecting, format!("connecting to {}", addr));

    // Playback opens before the socket and outlives drift reconnects
    let mut playback = match (factory)() {
        Ok(playback) => playback,
        Err(e) => {
            reporter.transition(
                SessionState::Errored,
                format!("failed to open playback device: {}", e),
            );
            return;
        }
    };

    let mut session = match Session::connect(addr) {
        Ok(session) => session,
        Err(e) => {
            reporter.transition(SessionState::Errored, e.to_string());
            return;
        }
    };
    reporter.transition(SessionState::Connected, format!("connected to {}", addr));

    let mut frame_reader = FrameReader::new();
    let mut block = vec![0u8; audio.chunk_bytes()];

    loop {
        // Observed only at the iteration boundary; an in-flight reception
        // always completes first
        if stop.is_stopped() {
            reporter.transition(SessionState::Disconnected, "stopped");
            return;
        }

        match network.wire_format {
            WireFormat::Framed => match frame_reader.read_frame(session.stream()) {
                Ok(FrameRead::Frame {
                    payload,
                    payload_reads,
                }) => {
                    session.add_drift(payload_reads);

                    if session.drift_exceeded(network.drift_reconnect_after) {
                        reporter.transition(
                            SessionState::Connecting,
                            format!(
                                "drift threshold {} exceeded, reconnecting",
                                network.drift_reconnect_after
                            ),
                        );
                        // Close the lagging connection before opening the
                        // replacement; never two live sessions
                        drop(session);
                        session = match Session::connect(addr) {
                            Ok(session) => session,
                            Err(e) => {
                                reporter.transition(SessionState::Errored, e.to_string());
                                return;
                            }
                        };
                        reporter
                            .transition(SessionState::Connected, format!("reconnected to {}", addr));
                    }

                    if let Err(e) = playback.write_chunk(payload) {
                        reporter
                            .transition(SessionState::Errored, format!("playback failed: {}", e));
                        return;
                    }
                }
                Ok(FrameRead::Closed) => {
                    reporter.transition(SessionState::Disconnected, "remote closed");
                    return;
                }
                Err(e) => {
                    reporter.transition(SessionState::Errored, format!("receive failed: {}", e));
                    return;
                }
            },
            WireFormat::Fixed => match protocol::read_block(session.stream(), &mut block) {
                Ok(BlockRead::Block) => {
                    if let Err(e) = playback.write_chunk(&block) {
                        reporter
                            .transition(SessionState::Errored, format!("playback failed: {}", e));
                        return;
                    }
                }
                Ok(BlockRead::Closed) => {
                    reporter.transition(SessionState::Disconnected, "remote closed");
                    return;
                }
                Err(e) => {
                    reporter.transition(SessionState::Errored, format!("receive failed: {}", e));
                    return;
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::PlaybackStream;
    use crate::protocol::encode_frame;
    use crossbeam_channel::{unbounded, Receiver, Sender};
    use std::io::Write;
    use std::net::{IpAddr, Ipv4Addr, TcpListener};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    fn test_audio(chunk_frames: usize) -> AudioFormat {
        AudioFormat {
            sample_rate: 44100,
            channels: 1,
            chunk_frames,
        }
    }

    fn test_network(port: u16, wire_format: WireFormat, drift_reconnect_after: u64) -> NetworkConfig {
        NetworkConfig {
            address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port,
            wire_format,
            drift_reconnect_after,
            always_on: false,
        }
    }

    /// Playback stream forwarding every chunk to the test thread
    struct RecordingPlayback {
        tx: Sender<Vec<u8>>,
    }

    impl PlaybackStream for RecordingPlayback {
        fn write_chunk(&mut self, chunk: &[u8]) -> std::result::Result<(), DeviceError> {
            self.tx.send(chunk.to_vec()).map_err(|_| DeviceError::Closed)
        }
    }

    fn recording_factory() -> (PlaybackFactory, Receiver<Vec<u8>>) {
        let (tx, rx) = unbounded();
        let factory: PlaybackFactory = Arc::new(move || {
            Ok(Box::new(RecordingPlayback { tx: tx.clone() }) as Box<dyn PlaybackStream>)
        });
        (factory, rx)
    }

    fn wait_for_state(rx: &EventReceiver, state: SessionState) -> bool {
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while std::time::Instant::now() < deadline {
            if let Ok(event) = rx.recv_timeout(Duration::from_millis(100)) {
                if event.state == state {
                    return true;
                }
            }
        }
        false
    }

    #[test]
    fn test_framed_payload_reassembled_from_fragments() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        // One 2000-byte payload written in 700-byte slices
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let payload: Vec<u8> = (0..2000u32).map(|i| (i % 251) as u8).collect();
            let wire = encode_frame(&payload);
            for piece in wire.chunks(700) {
                stream.write_all(piece).unwrap();
                stream.flush().unwrap();
                thread::sleep(Duration::from_millis(5));
            }
            payload
        });

        let (factory, chunks) = recording_factory();
        let mut agent = ReceiverAgent::new(
            test_audio(512),
            test_network(port, WireFormat::Framed, 100),
            factory,
        );
        agent.start().unwrap();
        let events = agent.events();

        let expected = server.join().unwrap();
        let got = chunks.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(got, expected);

        // Server closed after one frame: orderly disconnect, no hang
        assert!(wait_for_state(&events, SessionState::Disconnected));
        agent.stop();
    }

    #[test]
    fn test_fixed_blocks_delivered_in_order() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            for i in 1u8..=3 {
                stream.write_all(&vec![i; 1024]).unwrap();
            }
        });

        let (factory, chunks) = recording_factory();
        // 512 mono 16-bit frames = 1024-byte blocks
        let mut agent = ReceiverAgent::new(
            test_audio(512),
            test_network(port, WireFormat::Fixed, 100),
            factory,
        );
        agent.start().unwrap();
        let events = agent.events();

        for i in 1u8..=3 {
            let got = chunks.recv_timeout(Duration::from_secs(2)).unwrap();
            assert_eq!(got, vec![i; 1024]);
        }

        server.join().unwrap();
        assert!(wait_for_state(&events, SessionState::Disconnected));
        agent.stop();
    }

    #[test]
    fn test_drift_threshold_triggers_reconnect() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let addr = listener.local_addr().unwrap();

        let accepted = Arc::new(AtomicUsize::new(0));
        let server_done = Arc::new(AtomicBool::new(false));
        let accepted_for_server = accepted.clone();
        let done_for_server = server_done.clone();

        // Keep feeding frames to every connection until it drops, then
        // accept the next one
        let server = thread::spawn(move || {
            while !done_for_server.load(Ordering::SeqCst) {
                let Ok((mut stream, _)) = listener.accept() else {
                    break;
                };
                accepted_for_server.fetch_add(1, Ordering::SeqCst);
                loop {
                    let wire = encode_frame(&[0x5Au8; 64]);
                    if stream.write_all(&wire).is_err() {
                        break;
                    }
                    thread::sleep(Duration::from_millis(1));
                }
            }
        });

        let (factory, chunks) = recording_factory();
        let mut agent = ReceiverAgent::new(
            test_audio(32),
            test_network(port, WireFormat::Framed, 3),
            factory,
        );
        agent.start().unwrap();

        // Drift charges at least one read per frame, so a reconnect must
        // land within a handful of frames; wait for the second accept
        let deadline = std::time::Instant::now() + Duration::from_secs(3);
        while accepted.load(Ordering::SeqCst) < 2 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert!(accepted.load(Ordering::SeqCst) >= 2, "no drift reconnect happened");

        // Audio kept flowing across the reconnect
        assert!(chunks.recv_timeout(Duration::from_secs(1)).is_ok());

        agent.stop();
        server_done.store(true, Ordering::SeqCst);
        // Unblock the accept so the server thread can exit
        let _ = std::net::TcpStream::connect(addr);
        server.join().unwrap();
    }

    #[test]
    fn test_connect_failure_reports_errored() {
        // Grab a free port, then close it again so nobody is listening
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let (factory, _chunks) = recording_factory();
        let mut agent = ReceiverAgent::new(
            test_audio(512),
            test_network(port, WireFormat::Framed, 100),
            factory,
        );
        agent.start().unwrap();
        let events = agent.events();

        assert!(wait_for_state(&events, SessionState::Errored));
        agent.stop();
    }

    #[test]
    fn test_stop_observed_between_frames() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        // Endless frame source
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            loop {
                let wire = encode_frame(&[1u8; 64]);
                if stream.write_all(&wire).is_err() {
                    break;
                }
                thread::sleep(Duration::from_millis(2));
            }
        });

        let (factory, chunks) = recording_factory();
        let mut agent = ReceiverAgent::new(
            test_audio(32),
            test_network(port, WireFormat::Framed, 10_000),
            factory,
        );
        agent.start().unwrap();
        let events = agent.events();

        // Let a couple of chunks through, then request the stop
        assert!(chunks.recv_timeout(Duration::from_secs(2)).is_ok());
        assert!(chunks.recv_timeout(Duration::from_secs(2)).is_ok());
        agent.stop();

        assert!(wait_for_state(&events, SessionState::Disconnected));

        // The transfer thread is gone; no further playback writes occur
        while chunks.try_recv().is_ok() {}
        thread::sleep(Duration::from_millis(50));
        assert!(chunks.try_recv().is_err());

        server.join().unwrap();
    }
}
