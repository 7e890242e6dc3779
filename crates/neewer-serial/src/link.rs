//! The connection manager.
//!
//! A single `neewer-link` thread owns the serial port. It is the only reader
//! and the only writer: collaborators talk to it through [`LightLink`], which
//! forwards requests over a command channel and reads connection and light
//! state from a shared snapshot the worker keeps current.
//!
//! ## Worker loop
//!
//! Each iteration services queued commands, releases a due debounced intent,
//! then either reads from the open port (bounded by the read timeout) and
//! checks that the port is still enumerated, or, while disconnected, runs
//! auto-discovery once per reconnect interval.

use std::io::{Read, Write};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use neewer_metrics::{metric_defs, LinkLabels};
use neewer_protocol::{
    build_cct, build_power, CalibrationTable, Frame, FrameDecoder, LightState, ProtocolError,
    StatusDecoder, StatusOutcome, CONFIRMED_KELVIN, MAX_BRIGHTNESS,
};
use parking_lot::RwLock;
use tracing::{debug, info, trace, warn};

use crate::config::LinkConfig;
use crate::debounce::Debouncer;
use crate::error::{LinkError, LinkResult};
use crate::events::{ConnectionState, LinkEvent};
use crate::transport::{is_transient, PortProvider, PortSettings, SerialIo, SystemPorts};

/// Bytes requested per read.
const READ_CHUNK: usize = 256;

type Reply<T> = Sender<LinkResult<T>>;

/// A requested brightness/temperature, waiting in the debouncer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LightIntent {
    brightness: u8,
    kelvin: u32,
}

// ============================================================================
// Commands (LightLink → worker)
// ============================================================================

#[derive(Debug)]
enum LinkCommand {
    /// Open the given port, replacing any current connection.
    Connect { port: String, reply: Reply<()> },
    /// Run auto-discovery now.
    Discover { reply: Reply<String> },
    /// Release the port and pause auto-discovery.
    Disconnect { reply: Reply<()> },
    /// Debounced light change, already validated.
    SetLight(LightIntent),
    SetPower { on: bool, reply: Reply<()> },
    Write { frame: Frame, reply: Reply<()> },
    Shutdown,
}

/// State the worker publishes for [`LightLink`]'s getters.
#[derive(Debug, Clone, Default)]
struct Snapshot {
    state: ConnectionState,
    port: Option<String>,
    light: LightState,
}

// ============================================================================
// Public handle
// ============================================================================

/// Handle to the connection manager.
///
/// Dropping the handle shuts the worker down and releases the port.
pub struct LightLink {
    cmd_tx: Sender<LinkCommand>,
    shared: Arc<RwLock<Snapshot>>,
    provider: Arc<dyn PortProvider>,
    config: LinkConfig,
    table: CalibrationTable,
    thread: Option<JoinHandle<()>>,
}

impl LightLink {
    /// Start the link on the operating system's serial ports.
    pub fn open(config: LinkConfig) -> LinkResult<(Self, Receiver<LinkEvent>)> {
        Self::spawn(config, SystemPorts)
    }

    /// Start the link worker on ports from `provider`.
    ///
    /// Returns the handle and the event stream. With `auto_connect` set the
    /// worker immediately starts looking for a matching port. Fails with
    /// [`LinkError::Config`] if `config` does not pass
    /// [`LinkConfig::validate`].
    pub fn spawn<P: PortProvider>(
        config: LinkConfig,
        provider: P,
    ) -> LinkResult<(Self, Receiver<LinkEvent>)> {
        config.validate()?;
        let table = config.calibration_table()?;
        let provider: Arc<dyn PortProvider> = Arc::new(provider);
        let shared = Arc::new(RwLock::new(Snapshot::default()));
        let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded();
        let (event_tx, event_rx) = crossbeam_channel::unbounded();

        let worker = LinkWorker::new(
            config.clone(),
            table.clone(),
            Arc::clone(&provider),
            Arc::clone(&shared),
            cmd_rx,
            event_tx,
        );
        let thread = thread::Builder::new()
            .name("neewer-link".to_string())
            .spawn(move || worker.run())?;

        let link = LightLink {
            cmd_tx,
            shared,
            provider,
            config,
            table,
            thread: Some(thread),
        };
        Ok((link, event_rx))
    }

    /// Open `port`, replacing any current connection. Re-enables
    /// auto-reconnect if a previous [`disconnect`](Self::disconnect) paused it.
    pub fn connect(&self, port: &str) -> LinkResult<()> {
        self.request(|reply| LinkCommand::Connect {
            port: port.to_string(),
            reply,
        })
    }

    /// Try every candidate port now. Returns the port that was opened, or the
    /// current one if already connected.
    pub fn discover(&self) -> LinkResult<String> {
        self.request(|reply| LinkCommand::Discover { reply })
    }

    /// Release the port. Auto-reconnect stays off until the next `connect`.
    pub fn disconnect(&self) -> LinkResult<()> {
        self.request(|reply| LinkCommand::Disconnect { reply })
    }

    /// Serial ports matching the configured name patterns.
    pub fn list_ports(&self) -> Vec<String> {
        candidate_ports(self.provider.as_ref(), &self.config)
    }

    /// Whether a port is open.
    pub fn is_connected(&self) -> bool {
        self.connection_state() == ConnectionState::Connected
    }

    /// Current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        self.shared.read().state
    }

    /// Path of the open port.
    pub fn port_path(&self) -> Option<String> {
        self.shared.read().port.clone()
    }

    /// Latest known panel state, including optimistic updates from writes.
    pub fn light_state(&self) -> LightState {
        self.shared.read().light
    }

    /// Request a brightness and color temperature.
    ///
    /// Validated here, then coalesced with other requests arriving within
    /// the debounce window. Returns once queued, not once the panel confirms.
    ///
    /// If the connection drops before the worker sends the request, the
    /// request is discarded and a [`LinkEvent::Disconnected`] follows instead.
    pub fn set_light(&self, brightness: u8, kelvin: u32) -> LinkResult<()> {
        if !self.is_connected() {
            return Err(LinkError::NotConnected);
        }
        self.table.byte_for(kelvin)?;
        let intent = LightIntent {
            brightness: brightness.min(MAX_BRIGHTNESS),
            kelvin,
        };
        self.cmd_tx
            .send(LinkCommand::SetLight(intent))
            .map_err(|_| LinkError::Shutdown)
    }

    /// Turn the panel off, or back on at its last non-zero brightness.
    pub fn set_power(&self, on: bool) -> LinkResult<()> {
        self.request(|reply| LinkCommand::SetPower { on, reply })
    }

    /// Write a raw frame and wait for the result.
    pub fn write(&self, frame: Frame) -> LinkResult<()> {
        self.request(|reply| LinkCommand::Write { frame, reply })
    }

    /// Stop the worker and release the port.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn request<T>(&self, make: impl FnOnce(Reply<T>) -> LinkCommand) -> LinkResult<T> {
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        self.cmd_tx
            .send(make(reply_tx))
            .map_err(|_| LinkError::Shutdown)?;
        reply_rx.recv().map_err(|_| LinkError::Shutdown)?
    }

    fn stop(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        // The worker may already be gone
        let _ = self.cmd_tx.send(LinkCommand::Shutdown);
        if thread.join().is_err() {
            warn!("LightLink: worker thread panicked");
        }
    }
}

impl Drop for LightLink {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for LightLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.shared.read();
        f.debug_struct("LightLink")
            .field("state", &snapshot.state)
            .field("port", &snapshot.port)
            .finish()
    }
}

/// Ports from `provider` whose names match the configured patterns.
fn candidate_ports(provider: &dyn PortProvider, config: &LinkConfig) -> Vec<String> {
    provider
        .available_ports()
        .into_iter()
        .filter(|p| config.matches_port(p))
        .collect()
}

// ============================================================================
// Worker
// ============================================================================

/// The open port and what the worker knows about it.
struct ActivePort {
    path: String,
    io: Box<dyn SerialIo>,
    /// Whether the port showed up in enumeration when opened. Only listed
    /// ports are checked for unplug.
    listed: bool,
    labels: Vec<(&'static str, String)>,
}

struct LinkWorker {
    config: LinkConfig,
    settings: PortSettings,
    provider: Arc<dyn PortProvider>,
    shared: Arc<RwLock<Snapshot>>,
    cmd_rx: Receiver<LinkCommand>,
    event_tx: Sender<LinkEvent>,

    port: Option<ActivePort>,
    /// Last port that was open, tried first on reconnect.
    last_port: Option<String>,
    frames: FrameDecoder,
    /// Discarded byte count already reported to metrics.
    discarded_reported: u64,
    status: StatusDecoder,
    debouncer: Debouncer<LightIntent>,

    auto_connect: bool,
    next_discovery: Instant,
    next_health_check: Instant,
}

impl LinkWorker {
    fn new(
        config: LinkConfig,
        table: CalibrationTable,
        provider: Arc<dyn PortProvider>,
        shared: Arc<RwLock<Snapshot>>,
        cmd_rx: Receiver<LinkCommand>,
        event_tx: Sender<LinkEvent>,
    ) -> Self {
        let now = Instant::now();
        LinkWorker {
            settings: PortSettings {
                baud_rate: config.baud_rate,
                read_timeout: config.read_timeout(),
            },
            status: StatusDecoder::with_echo_window(table, config.echo_window()),
            debouncer: Debouncer::new(config.debounce()),
            auto_connect: config.auto_connect,
            config,
            provider,
            shared,
            cmd_rx,
            event_tx,
            port: None,
            last_port: None,
            frames: FrameDecoder::new(),
            discarded_reported: 0,
            next_discovery: now,
            next_health_check: now,
        }
    }

    fn run(mut self) {
        debug!("LinkWorker: started");
        metrics::gauge!(metric_defs::CONNECTED.name).set(0.0);

        while self.service_commands() {
            let now = Instant::now();
            if let Some(intent) = self.debouncer.poll(now) {
                self.send_intent(intent);
            }

            if self.port.is_some() {
                self.read_once();
                self.check_health(Instant::now());
            } else if self.auto_connect && now >= self.next_discovery {
                // Nothing to report to: failures are logged
                let _ = self.discover(now);
            }

            self.status.expire(Instant::now());
        }

        self.release();
        debug!("LinkWorker: stopped");
    }

    /// Handle queued commands. Returns `false` once the worker should exit.
    ///
    /// While disconnected this waits up to one tick for the first command.
    fn service_commands(&mut self) -> bool {
        if self.port.is_none() {
            match self.cmd_rx.recv_timeout(self.settings.read_timeout) {
                Ok(cmd) => {
                    if !self.handle_command(cmd) {
                        return false;
                    }
                }
                Err(RecvTimeoutError::Timeout) => return true,
                Err(RecvTimeoutError::Disconnected) => return false,
            }
        }

        loop {
            match self.cmd_rx.try_recv() {
                Ok(cmd) => {
                    if !self.handle_command(cmd) {
                        return false;
                    }
                }
                Err(TryRecvError::Empty) => return true,
                Err(TryRecvError::Disconnected) => return false,
            }
        }
    }

    fn handle_command(&mut self, cmd: LinkCommand) -> bool {
        match cmd {
            LinkCommand::Connect { port, reply } => {
                self.auto_connect = true;
                let _ = reply.send(self.connect_to(&port));
            }
            LinkCommand::Discover { reply } => {
                self.auto_connect = true;
                let _ = reply.send(self.discover(Instant::now()));
            }
            LinkCommand::Disconnect { reply } => {
                self.auto_connect = false;
                self.release();
                let _ = reply.send(Ok(()));
            }
            LinkCommand::SetLight(intent) => {
                if self.port.is_none() {
                    debug!("LinkWorker: dropping {:?}, not connected", intent);
                } else if self.debouncer.submit(intent, Instant::now()) {
                    metrics::counter!(metric_defs::INTENTS_COALESCED.name).increment(1);
                }
            }
            LinkCommand::SetPower { on, reply } => {
                self.flush_intent();
                let _ = reply.send(self.set_power(on));
            }
            LinkCommand::Write { frame, reply } => {
                self.flush_intent();
                let _ = reply.send(self.write_frame(&frame));
            }
            LinkCommand::Shutdown => return false,
        }
        true
    }

    // ------------------------------------------------------------------------
    // Connection lifecycle
    // ------------------------------------------------------------------------

    fn connect_to(&mut self, path: &str) -> LinkResult<()> {
        self.release();
        self.set_state(ConnectionState::Connecting, None);
        self.try_open(path)
    }

    /// Open the first candidate that works, the last used port first.
    fn discover(&mut self, now: Instant) -> LinkResult<String> {
        if let Some(port) = &self.port {
            return Ok(port.path.clone());
        }
        self.next_discovery = now + self.config.reconnect_interval();

        let present = self.provider.available_ports();
        let mut candidates: Vec<String> = present
            .iter()
            .filter(|p| self.config.matches_port(p))
            .cloned()
            .collect();
        if let Some(last) = &self.last_port {
            if present.contains(last) {
                candidates.retain(|p| p != last);
                candidates.insert(0, last.clone());
            }
        }
        if candidates.is_empty() {
            trace!("LinkWorker: no candidate ports");
            return Err(LinkError::NoPortFound);
        }

        self.set_state(ConnectionState::Connecting, None);
        for path in candidates {
            match self.try_open(&path) {
                Ok(()) => return Ok(path),
                Err(e) => debug!("LinkWorker: {} did not open: {}", path, e),
            }
        }
        Err(LinkError::NoPortFound)
    }

    fn try_open(&mut self, path: &str) -> LinkResult<()> {
        let labels = LinkLabels::new(path);
        match self.provider.open(path, &self.settings) {
            Ok(io) => {
                metrics::counter!(
                    metric_defs::CONNECT_ATTEMPTS.name,
                    &labels.with(&[("outcome", "ok".to_string())])
                )
                .increment(1);
                self.attach(path, io, labels);
                Ok(())
            }
            Err(e) => {
                metrics::counter!(
                    metric_defs::CONNECT_ATTEMPTS.name,
                    &labels.with(&[("outcome", "error".to_string())])
                )
                .increment(1);
                warn!("LinkWorker: failed to open {}: {}", path, e);
                self.set_state(ConnectionState::Disconnected, None);
                Err(e)
            }
        }
    }

    fn attach(&mut self, path: &str, io: Box<dyn SerialIo>, labels: LinkLabels) {
        let listed = self.provider.available_ports().iter().any(|p| p == path);
        self.frames = FrameDecoder::new();
        self.discarded_reported = 0;
        self.status.reset();
        self.debouncer.clear();
        self.port = Some(ActivePort {
            path: path.to_string(),
            io,
            listed,
            labels: labels.to_labels(),
        });
        self.last_port = Some(path.to_string());
        self.next_health_check = Instant::now() + self.config.reconnect_interval();
        self.set_state(ConnectionState::Connected, Some(path.to_string()));
        metrics::gauge!(metric_defs::CONNECTED.name).set(1.0);
        info!("LinkWorker: connected to {}", path);
        self.emit(LinkEvent::Connected {
            port: path.to_string(),
        });
    }

    /// Close the port on request. No event is emitted.
    fn release(&mut self) {
        self.debouncer.clear();
        self.status.reset();
        if let Some(port) = self.port.take() {
            info!("LinkWorker: closed {}", port.path);
            metrics::gauge!(metric_defs::CONNECTED.name).set(0.0);
        }
        self.set_state(ConnectionState::Disconnected, None);
    }

    /// Close the port after a failure and schedule reconnection.
    fn drop_connection(&mut self, reason: &str) {
        let Some(port) = self.port.take() else {
            return;
        };
        warn!("LinkWorker[{}]: connection lost: {}", port.path, reason);
        metrics::counter!(metric_defs::DISCONNECTS.name, &port.labels).increment(1);
        metrics::gauge!(metric_defs::CONNECTED.name).set(0.0);

        self.debouncer.clear();
        self.status.reset();
        self.set_state(ConnectionState::Disconnected, None);
        self.next_discovery = Instant::now() + self.config.reconnect_interval();
        self.emit(LinkEvent::Disconnected { port: port.path });
    }

    /// Drop the connection if its port vanished from enumeration.
    fn check_health(&mut self, now: Instant) {
        if now < self.next_health_check {
            return;
        }
        self.next_health_check = now + self.config.reconnect_interval();

        let unplugged = match &self.port {
            Some(port) if port.listed => !self
                .provider
                .available_ports()
                .iter()
                .any(|p| *p == port.path),
            _ => false,
        };
        if unplugged {
            self.drop_connection("port no longer enumerated");
        }
    }

    // ------------------------------------------------------------------------
    // Reading
    // ------------------------------------------------------------------------

    fn read_once(&mut self) {
        let Some(port) = self.port.as_mut() else {
            return;
        };
        let mut buf = [0u8; READ_CHUNK];
        match port.io.read(&mut buf) {
            Ok(0) => self.drop_connection("end of stream"),
            Ok(n) => {
                trace!("LinkWorker[{}]: read {:02X?}", port.path, &buf[..n]);
                self.frames.push(&buf[..n]);
                self.drain_frames();
            }
            Err(e) if is_transient(&e) => {}
            Err(e) => self.drop_connection(&format!("read failed: {}", e)),
        }
    }

    fn drain_frames(&mut self) {
        let labels = match &self.port {
            Some(port) => port.labels.clone(),
            None => return,
        };
        let now = Instant::now();

        while let Some(frame) = self.frames.next_frame() {
            metrics::counter!(metric_defs::FRAMES_DECODED.name, &labels).increment(1);
            match self.status.handle_frame(&frame, now) {
                StatusOutcome::Changed(status) => {
                    metrics::counter!(metric_defs::STATUS_EVENTS.name, &labels).increment(1);
                    debug!(
                        "LinkWorker: panel reports brightness={} kelvin={:?}",
                        status.brightness, status.kelvin
                    );
                    self.publish_light();
                    self.emit(LinkEvent::LightStatus {
                        brightness: status.brightness,
                        kelvin: status.kelvin,
                    });
                }
                StatusOutcome::EchoSuppressed => {
                    metrics::counter!(metric_defs::ECHOES_SUPPRESSED.name, &labels).increment(1);
                    debug!("LinkWorker: echo of last write suppressed");
                }
                StatusOutcome::Ignored => {}
            }
        }

        let discarded = self.frames.discarded_bytes();
        if discarded > self.discarded_reported {
            let delta = discarded - self.discarded_reported;
            metrics::counter!(metric_defs::BYTES_DISCARDED.name, &labels).increment(delta);
            trace!("LinkWorker: discarded {} bytes while resynchronizing", delta);
            self.discarded_reported = discarded;
        }
    }

    // ------------------------------------------------------------------------
    // Writing
    // ------------------------------------------------------------------------

    fn flush_intent(&mut self) {
        if let Some(intent) = self.debouncer.flush() {
            self.send_intent(intent);
        }
    }

    fn send_intent(&mut self, intent: LightIntent) {
        let frame = match build_cct(self.status.table(), intent.brightness, intent.kelvin) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("LinkWorker: cannot encode {:?}: {}", intent, e);
                return;
            }
        };
        // A failure already dropped the connection and was logged
        let _ = self.write_frame(&frame);
    }

    fn set_power(&mut self, on: bool) -> LinkResult<()> {
        if self.port.is_none() {
            return Err(LinkError::NotConnected);
        }
        let state = self.status.state();
        let kelvin = match state.kelvin {
            Some(kelvin) => kelvin,
            None => self
                .status
                .table()
                .entries()
                .first()
                .map(|e| e.kelvin)
                .ok_or(ProtocolError::CalibrationGap(CONFIRMED_KELVIN))?,
        };
        let frame = build_power(self.status.table(), on, state.last_on_brightness(), kelvin)?;
        self.write_frame(&frame)
    }

    fn write_frame(&mut self, frame: &Frame) -> LinkResult<()> {
        let Some(port) = self.port.as_mut() else {
            return Err(LinkError::NotConnected);
        };
        let bytes = frame.encode();
        let started = Instant::now();
        let result = port.io.write_all(&bytes).and_then(|()| port.io.flush());

        match result {
            Ok(()) => {
                metrics::counter!(metric_defs::FRAMES_WRITTEN.name, &port.labels).increment(1);
                metrics::histogram!(metric_defs::WRITE_DURATION.name, &port.labels)
                    .record(started.elapsed().as_micros() as f64);
                debug!("LinkWorker[{}]: wrote {:02X?}", port.path, bytes);
                self.status.record_write(frame, Instant::now());
                self.publish_light();
                Ok(())
            }
            Err(e) => {
                metrics::counter!(metric_defs::WRITE_FAILURES.name, &port.labels).increment(1);
                self.drop_connection(&format!("write failed: {}", e));
                Err(LinkError::Io(e))
            }
        }
    }

    // ------------------------------------------------------------------------
    // Publishing
    // ------------------------------------------------------------------------

    fn set_state(&self, state: ConnectionState, port: Option<String>) {
        let mut snapshot = self.shared.write();
        snapshot.state = state;
        snapshot.port = port;
    }

    fn publish_light(&self) {
        self.shared.write().light = self.status.state();
    }

    fn emit(&self, event: LinkEvent) {
        if self.event_tx.send(event).is_err() {
            trace!("LinkWorker: event receiver dropped");
        }
    }
}
