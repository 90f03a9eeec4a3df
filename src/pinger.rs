use crate::icmp::v4::socket::{is_poll_timeout, is_resource_exhausted, is_undecodable};
use crate::icmp::v4::{decode, IcmpMessage, IcmpV4, RawSocket, TSocket};
use crate::ledger::{ProbeRequest, RequestLedger};
use crate::outcome::{FailureKind, Outcome, PingReply};
use crate::pinger_config::{PingerConfig, ValidatedConfig};
use crate::records::{raw_packet_channel, RawPacket, RawPacketReceiver, RawPacketSender};
use crate::{PingError, PingResult, Reporter, StopHandle};
use pnet_packet::Packet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs};
use std::sync::mpsc::{self, RecvTimeoutError, TryRecvError};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant, SystemTime};

/// Read timeout of the socket; bounds how long a stop request may go unnoticed.
pub(crate) const RECEIVE_POLL_TIMEOUT: Duration = Duration::from_millis(100);
const PROCESS_POLL_INTERVAL: Duration = Duration::from_millis(10);
const MAX_SEND_ATTEMPTS: usize = 5;
const RECEIVE_BUFFER_SIZE: usize = 512;

macro_rules! debugf {
    ($pinger:expr, $($arg:tt)+) => {
        if $pinger.config.debug {
            tracing::debug!($($arg)+);
        }
    };
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum State {
    Idle,
    Running,
    Stopping,
    Stopped,
}

/// Sends an echo request every interval, matches replies against the
/// in-flight requests and reports each result to a [`Reporter`].
///
/// `ping` blocks the calling thread for the duration of the run; call
/// [`Pinger::stop`] (or [`StopHandle::stop`]) from another thread to end it.
pub struct Pinger<S> {
    config: ValidatedConfig,
    icmpv4: IcmpV4,
    socket: S,
    ledger: RequestLedger,
    reporter: Mutex<Box<dyn Reporter>>,
    stop_handle: StopHandle,
    states: Mutex<Vec<State>>,
    run_error: Mutex<Option<PingError>>,
}

impl Pinger<RawSocket> {
    /// Opens a raw ICMPv4 socket on the configured listen address.
    pub fn new(config: &PingerConfig, reporter: impl Reporter + 'static) -> PingResult<Self> {
        let config = config.validate()?;
        let socket = RawSocket::bind(config.listen_address, config.ttl, RECEIVE_POLL_TIMEOUT)?;
        Ok(Self::from_parts(config, socket, Box::new(reporter)))
    }
}

impl<S> Pinger<S>
where
    S: TSocket,
{
    pub fn with_socket(config: &PingerConfig, socket: S, reporter: impl Reporter + 'static) -> PingResult<Self> {
        Ok(Self::from_parts(config.validate()?, socket, Box::new(reporter)))
    }

    fn from_parts(config: ValidatedConfig, socket: S, reporter: Box<dyn Reporter>) -> Self {
        Pinger {
            config,
            icmpv4: IcmpV4::new(),
            socket,
            ledger: RequestLedger::new(),
            reporter: Mutex::new(reporter),
            stop_handle: StopHandle::new(),
            states: Mutex::new(vec![State::Idle]),
            run_error: Mutex::new(None),
        }
    }

    pub fn get_states(&self) -> Vec<State> {
        lock(&self.states).clone()
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop_handle.clone()
    }

    pub fn stop(&self) {
        self.push_state_after(State::Running, State::Stopping);
        self.stop_handle.stop();
    }

    /// Resolves `host` (unless it is an IPv4 literal) and pings it until stopped.
    pub fn ping(&self, host: &str) -> PingResult<()> {
        let target = resolve(host)?;
        self.ping_addr(host, target)
    }

    /// Pings `target` until stopped or until sending or receiving fails.
    /// `host` is only used for reporting.
    pub fn ping_addr(&self, host: &str, target: Ipv4Addr) -> PingResult<()> {
        self.enter_running()?;
        lock(&self.reporter).start();

        let (packet_tx, packet_rx) = raw_packet_channel();
        let (receiver_halt_tx, receiver_halt_rx) = mpsc::channel::<()>();
        let (processor_halt_tx, processor_halt_rx) = mpsc::channel::<()>();

        std::thread::scope(|scope| {
            let receiver = scope.spawn(move || self.receive_loop(&receiver_halt_rx, &packet_tx));
            let processor = scope.spawn(move || self.process_loop(&processor_halt_rx, &packet_rx));

            self.send_loop(host, target);
            self.push_state_after(State::Running, State::Stopping);

            // The processor must outlive the receiver so no packet already read is lost.
            // mpsc::Sender::send() returns error only if the thread is already gone.
            let _ = receiver_halt_tx.send(());
            if receiver.join().is_err() {
                self.fail(PingError::ThreadPanicked("receiver"));
            }
            debugf!(self, "receiver stopped");
            let _ = processor_halt_tx.send(());
            if processor.join().is_err() {
                tracing::error!("processor thread panicked");
            }
            debugf!(self, "processor stopped");
        });

        lock(&self.states).push(State::Stopped);
        tracing::info!("ping process has stopped");
        match lock(&self.run_error).take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn enter_running(&self) -> PingResult<()> {
        let mut states = lock(&self.states);
        let current = *states.last().unwrap_or(&State::Idle);
        if current != State::Idle {
            return Err(PingError::InvalidState(current));
        }
        states.push(State::Running);
        Ok(())
    }

    fn push_state_after(&self, expected: State, next: State) {
        let mut states = lock(&self.states);
        if states.last() == Some(&expected) {
            states.push(next);
        }
    }

    /// Keeps the first fatal error of the run and asks everything to stop.
    fn fail(&self, error: PingError) {
        tracing::error!("ping run failed: {error}");
        let mut run_error = lock(&self.run_error);
        if run_error.is_none() {
            *run_error = Some(error);
        }
        self.stop_handle.stop();
    }

    fn send_loop(&self, host: &str, target: Ipv4Addr) {
        let start = Instant::now();
        let mut next_tick = start;
        let mut announced = false;
        loop {
            if self.stop_handle.is_stopped() {
                break;
            }
            match self.send_probe(target) {
                Ok(Some(package_size)) if !announced => {
                    tracing::info!("PING {host} ({target}): {package_size} data bytes");
                    announced = true;
                }
                Ok(_) => {}
                Err(error) => {
                    self.fail(error);
                    break;
                }
            }

            // Ticks missed while sending are skipped, not sent in a burst.
            let now = Instant::now();
            while next_tick <= now {
                next_tick += self.config.interval;
            }
            if self.stop_handle.wait_until(next_tick) {
                break;
            }
        }
        debugf!(self, "send loop finished");
    }

    /// Returns the package size if the probe went out, `None` if the socket
    /// stayed out of buffer space for every attempt.
    fn send_probe(&self, target: Ipv4Addr) -> PingResult<Option<usize>> {
        let send_time = SystemTime::now();
        let request = self.ledger.insert(target, Instant::now())?;
        let package = match self.icmpv4.new_echo_request(request.identifier, request.sequence_number, send_time) {
            Some(package) => package,
            None => {
                self.ledger.remove_by_id(request.identifier);
                return Err(PingError::PackageConstruction);
            }
        };
        let bytes = package.packet();
        debugf!(
            self,
            "send: id {}, seq {}, bytes {} {:02x?}",
            request.identifier,
            request.sequence_number,
            bytes.len(),
            bytes
        );

        let addr: socket2::SockAddr = SocketAddr::new(IpAddr::V4(target), 0).into();
        for attempt in 1..=MAX_SEND_ATTEMPTS {
            match self.socket.send_to(bytes, &addr) {
                Ok(_) => return Ok(Some(bytes.len())),
                Err(error) if is_resource_exhausted(&error) => {
                    debugf!(self, "send attempt {attempt} for icmp_seq={} failed: {error}", request.sequence_number);
                }
                Err(error) => {
                    self.ledger.remove_by_id(request.identifier);
                    return Err(error.into());
                }
            }
        }
        // The request stays in the ledger and is swept as a loss.
        tracing::warn!("failed to ping {target} for icmp_seq={}", request.sequence_number);
        Ok(None)
    }

    fn receive_loop(&self, halt_rx: &mpsc::Receiver<()>, packet_tx: &RawPacketSender) {
        let mut buf = [0u8; RECEIVE_BUFFER_SIZE];
        loop {
            match halt_rx.try_recv() {
                Ok(()) | Err(TryRecvError::Disconnected) => break,
                Err(TryRecvError::Empty) => {}
            }

            let (n, ip_addr, ttl) = match self.socket.recv_from(&mut buf) {
                Ok(received) => received,
                Err(error) if is_poll_timeout(&error) => continue,
                Err(error) if is_undecodable(&error) => {
                    debugf!(self, "skipping unreadable packet: {error}");
                    continue;
                }
                Err(error) => {
                    self.fail(error.into());
                    break;
                }
            };
            let packet = RawPacket {
                bytes: buf[..n].to_vec(),
                ip_addr,
                ttl,
                receive_time: Instant::now(),
                receive_system_time: SystemTime::now(),
            };
            debugf!(self, "received {n} bytes from {ip_addr}: {:02x?}", packet.bytes);

            if packet_tx.send(packet).is_err() {
                self.fail(PingError::ThreadPanicked("processor"));
                break;
            }
        }
        debugf!(self, "receive loop finished");
    }

    fn process_loop(&self, halt_rx: &mpsc::Receiver<()>, packet_rx: &RawPacketReceiver) {
        let mut reporter = lock(&self.reporter);
        let mut last_sweep = Instant::now();
        loop {
            match halt_rx.try_recv() {
                Ok(()) | Err(TryRecvError::Disconnected) => break,
                Err(TryRecvError::Empty) => {}
            }

            match packet_rx.recv_timeout(PROCESS_POLL_INTERVAL) {
                Ok(packet) => reporter.report(&self.classify(&packet)),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => match halt_rx.recv_timeout(PROCESS_POLL_INTERVAL) {
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    Err(RecvTimeoutError::Timeout) => {}
                },
            }

            // Also sweep between packets so a busy socket cannot starve loss detection.
            if last_sweep.elapsed() >= PROCESS_POLL_INTERVAL {
                for request in self.ledger.sweep_expired(self.config.max_rtt) {
                    reporter.report(&lost(FailureKind::Timeout, &request));
                }
                last_sweep = Instant::now();
            }
        }

        for request in self.ledger.drain() {
            reporter.report(&lost(FailureKind::Unanswered, &request));
        }
        debugf!(self, "process loop finished");
    }

    fn classify(&self, packet: &RawPacket) -> Outcome {
        let message = match decode(&packet.bytes) {
            Ok(message) => message,
            Err(error) => {
                return Outcome::failure(FailureKind::Malformed(error.to_string()), Some(packet.ip_addr), None);
            }
        };
        debugf!(self, "decoded {:?} from {}", message, packet.ip_addr);

        match message {
            IcmpMessage::TimeExceeded(None) => Outcome::failure(
                FailureKind::TimeExceededUntracked { identifier: None },
                Some(packet.ip_addr),
                None,
            ),
            IcmpMessage::TimeExceeded(Some(header)) => match self.ledger.remove_by_id(header.identifier) {
                Some(request) => {
                    Outcome::failure(FailureKind::TimeExceeded, Some(packet.ip_addr), Some(request.sequence_number))
                }
                None => Outcome::failure(
                    FailureKind::TimeExceededUntracked { identifier: Some(header.identifier) },
                    Some(packet.ip_addr),
                    Some(header.sequence_number),
                ),
            },
            IcmpMessage::EchoReply(reply) => {
                let Some(request) = self.ledger.remove_by_id(reply.header.identifier) else {
                    return Outcome::failure(
                        FailureKind::UntrackedId { identifier: reply.header.identifier },
                        Some(packet.ip_addr),
                        Some(reply.header.sequence_number),
                    );
                };
                let expected = IpAddr::V4(request.target);
                if packet.ip_addr != expected {
                    return Outcome::failure(
                        FailureKind::UnexpectedAddress { expected },
                        Some(packet.ip_addr),
                        Some(request.sequence_number),
                    );
                }
                // The reply still answers the probe, but its RTT cannot be trusted.
                let ping_duration = if reply.header.sequence_number == request.sequence_number {
                    reply
                        .send_time
                        .and_then(|send_time| packet.receive_system_time.duration_since(send_time).ok())
                        .unwrap_or_else(|| packet.receive_time.saturating_duration_since(request.sent_at))
                } else {
                    tracing::warn!(
                        "reply from {} for id {} carries icmp_seq={}, expected icmp_seq={}",
                        packet.ip_addr,
                        request.identifier,
                        reply.header.sequence_number,
                        request.sequence_number
                    );
                    Duration::ZERO
                };
                Outcome::Reply(PingReply {
                    package_size: packet.bytes.len(),
                    ip_addr: packet.ip_addr,
                    ttl: packet.ttl,
                    sequence_number: request.sequence_number,
                    ping_duration,
                })
            }
            IcmpMessage::Other { icmp_type, icmp_code } => Outcome::failure(
                FailureKind::UnexpectedType { icmp_type, icmp_code },
                Some(packet.ip_addr),
                None,
            ),
        }
    }
}

fn lost(kind: FailureKind, request: &ProbeRequest) -> Outcome {
    Outcome::failure(kind, Some(IpAddr::V4(request.target)), Some(request.sequence_number))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn resolve(host: &str) -> PingResult<Ipv4Addr> {
    if let Ok(ip) = host.parse::<Ipv4Addr>() {
        return Ok(ip);
    }
    let addrs = (host, 0).to_socket_addrs().map_err(|error| {
        tracing::debug!("resolving {host} failed: {error}");
        PingError::HostNotFound(host.to_owned())
    })?;
    addrs
        .filter_map(|addr| match addr.ip() {
            IpAddr::V4(ip) => Some(ip),
            IpAddr::V6(_) => None,
        })
        .next()
        .ok_or_else(|| PingError::HostNotFound(host.to_owned()))
}
