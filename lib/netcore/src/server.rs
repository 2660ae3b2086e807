//! The reusable connection-server core (component B): bind, listen (or
//! bind for datagrams), accept-with-timeout, dispatch to a handler on its
//! own thread, and supervise the resulting worker set.
//!
//! The teacher's `Endpoint` (`lib/neutronium/src/net/endpoint.rs`) drives
//! an analogous accept/dispatch loop by polling `mio`; this one polls a
//! blocking listener with a bounded nonblocking-accept retry loop instead,
//! since every worker here is a plain OS thread (see DESIGN.md for why the
//! teacher's fork-based default was replaced).

use crate::endpoint::{DatagramEndpoint, StreamEndpoint};
use flux::error::{NetworkError, NetworkResult};
use rand::Rng;
use slog::Logger;
use std::net::{SocketAddr, TcpListener, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// How the supervisor picks the next handler from its handler list for
/// each newly accepted connection or packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    RoundRobin,
    Random,
}

impl Default for DispatchMode {
    fn default() -> Self {
        DispatchMode::RoundRobin
    }
}

#[derive(Debug)]
pub enum ConfigurationError {
    AlreadyRunning,
    NoHandlers,
    Bind(String),
}

impl std::fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigurationError::AlreadyRunning => write!(f, "server is already running"),
            ConfigurationError::NoHandlers => write!(f, "no handler registered"),
            ConfigurationError::Bind(err) => write!(f, "bind failed: {}", err),
        }
    }
}

impl std::error::Error for ConfigurationError {}

/// Selects the next index out of `len` handlers.
struct Dispatcher {
    mode: DispatchMode,
    cursor: AtomicUsize,
}

impl Dispatcher {
    fn new(mode: DispatchMode) -> Dispatcher {
        Dispatcher {
            mode,
            cursor: AtomicUsize::new(0),
        }
    }

    fn next(&self, len: usize) -> usize {
        match self.mode {
            DispatchMode::RoundRobin => self.cursor.fetch_add(1, Ordering::Relaxed) % len,
            DispatchMode::Random => rand::thread_rng().gen_range(0..len),
        }
    }
}

/// Blocks the accept/recv loop in half-second slices until either data is
/// ready or `deadline` elapses, so a `0`-second timeout (infinite) and a
/// bounded one share the same code path.
fn poll_interval() -> Duration {
    Duration::from_millis(50)
}

/// Non-blockingly tries to accept once; returns `Ok(None)` on WouldBlock.
fn try_accept(listener: &TcpListener) -> NetworkResult<Option<std::net::TcpStream>> {
    match listener.accept() {
        Ok((stream, _)) => Ok(Some(stream)),
        Err(ref err) if err.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
        Err(err) => Err(NetworkError::from(err)),
    }
}

/// Accepts with a deadline. `timeout == 0` blocks indefinitely (returns
/// only with a connection or a fatal error).
fn accept_with_timeout(
    listener: &TcpListener,
    timeout: Duration,
) -> NetworkResult<Option<std::net::TcpStream>> {
    listener.set_nonblocking(true).map_err(NetworkError::from)?;
    let started = Instant::now();

    loop {
        if let Some(stream) = try_accept(listener)? {
            listener.set_nonblocking(false).ok();
            return Ok(Some(stream));
        }

        if !timeout.is_zero() && started.elapsed() >= timeout {
            return Ok(None);
        }

        thread::sleep(poll_interval());
    }
}

fn try_recv(socket: &UdpSocket, buf: &mut [u8]) -> NetworkResult<Option<(usize, std::net::SocketAddr)>> {
    match socket.recv_from(buf) {
        Ok(result) => Ok(Some(result)),
        Err(ref err) if err.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
        Err(err) => Err(NetworkError::from(err)),
    }
}

fn recv_with_timeout(
    socket: &UdpSocket,
    buf: &mut [u8],
    timeout: Duration,
) -> NetworkResult<Option<(usize, std::net::SocketAddr)>> {
    socket.set_nonblocking(true).map_err(NetworkError::from)?;
    let started = Instant::now();

    loop {
        if let Some(result) = try_recv(socket, buf)? {
            socket.set_nonblocking(false).ok();
            return Ok(Some(result));
        }

        if !timeout.is_zero() && started.elapsed() >= timeout {
            return Ok(None);
        }

        thread::sleep(poll_interval());
    }
}

/// Fluent, pre-`start()` configuration shared by the stream and datagram
/// flavours. All setters reject mutation once the server has started.
pub struct ServerConfig {
    bind_address: String,
    port: u16,
    backlog: i32,
    accept_timeout: Duration,
    max_timeouts: u32,
    max_clients: usize,
    dispatch_mode: DispatchMode,
    initial_packet_buffer_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind_address: "::".to_string(),
            port: 0,
            backlog: 128,
            accept_timeout: Duration::from_secs(0),
            max_timeouts: 0,
            max_clients: 256,
            dispatch_mode: DispatchMode::RoundRobin,
            initial_packet_buffer_size: 2048,
        }
    }
}

/// A stream (TCP) handler: owns the accepted endpoint for the lifetime of
/// one connection.
pub trait StreamHandler<Ctx>: Send + Sync {
    fn handle(&self, endpoint: StreamEndpoint, ctx: Arc<Ctx>);
}

impl<Ctx, F> StreamHandler<Ctx> for F
where
    F: Fn(StreamEndpoint, Arc<Ctx>) + Send + Sync,
{
    fn handle(&self, endpoint: StreamEndpoint, ctx: Arc<Ctx>) {
        self(endpoint, ctx)
    }
}

/// A datagram (UDP) handler: given the endpoint re-anchored to the first
/// packet's sender plus that packet's bytes.
pub trait DatagramHandler<Ctx>: Send + Sync {
    fn handle(&self, endpoint: DatagramEndpoint, first_packet: Vec<u8>, ctx: Arc<Ctx>);
}

impl<Ctx, F> DatagramHandler<Ctx> for F
where
    F: Fn(DatagramEndpoint, Vec<u8>, Arc<Ctx>) + Send + Sync,
{
    fn handle(&self, endpoint: DatagramEndpoint, first_packet: Vec<u8>, ctx: Arc<Ctx>) {
        self(endpoint, first_packet, ctx)
    }
}

enum RunState {
    Unstarted,
    Running,
    Stopped,
}

/// A TCP connection server: binds, listens, and dispatches each accepted
/// connection to one of its registered handlers on its own thread.
pub struct ConnectionServer<Ctx: Send + Sync + 'static> {
    config: ServerConfig,
    handlers: Vec<Arc<dyn StreamHandler<Ctx>>>,
    ctx: Arc<Ctx>,
    logger: Logger,
    state: RunState,
    shutdown: Arc<AtomicBool>,
    supervisor: Option<JoinHandle<()>>,
}

impl<Ctx: Send + Sync + 'static> ConnectionServer<Ctx> {
    pub fn new(ctx: Ctx, logger: Logger) -> Self {
        ConnectionServer {
            config: ServerConfig::default(),
            handlers: Vec::new(),
            ctx: Arc::new(ctx),
            logger,
            state: RunState::Unstarted,
            shutdown: Arc::new(AtomicBool::new(false)),
            supervisor: None,
        }
    }

    fn require_unstarted(&self) -> Result<(), ConfigurationError> {
        match self.state {
            RunState::Unstarted => Ok(()),
            _ => Err(ConfigurationError::AlreadyRunning),
        }
    }

    pub fn bind_address(mut self, addr: &str) -> Result<Self, ConfigurationError> {
        self.require_unstarted()?;
        self.config.bind_address = addr.to_string();
        Ok(self)
    }

    pub fn port(mut self, port: u16) -> Result<Self, ConfigurationError> {
        self.require_unstarted()?;
        self.config.port = port;
        Ok(self)
    }

    pub fn backlog(mut self, backlog: i32) -> Result<Self, ConfigurationError> {
        self.require_unstarted()?;
        self.config.backlog = backlog;
        Ok(self)
    }

    pub fn accept_timeout_secs(mut self, secs: u64) -> Result<Self, ConfigurationError> {
        self.require_unstarted()?;
        self.config.accept_timeout = Duration::from_secs(secs);
        Ok(self)
    }

    pub fn max_timeouts(mut self, count: u32) -> Result<Self, ConfigurationError> {
        self.require_unstarted()?;
        self.config.max_timeouts = count;
        Ok(self)
    }

    pub fn max_clients(mut self, count: usize) -> Result<Self, ConfigurationError> {
        self.require_unstarted()?;
        self.config.max_clients = count;
        Ok(self)
    }

    pub fn dispatch_mode(mut self, mode: DispatchMode) -> Result<Self, ConfigurationError> {
        self.require_unstarted()?;
        self.config.dispatch_mode = mode;
        Ok(self)
    }

    pub fn add_handler<H: StreamHandler<Ctx> + 'static>(
        mut self,
        handler: H,
    ) -> Result<Self, ConfigurationError> {
        self.require_unstarted()?;
        self.handlers.push(Arc::new(handler));
        Ok(self)
    }

    /// Spawns the supervisor thread and returns immediately.
    pub fn start(mut self) -> Result<ServerHandle, ConfigurationError> {
        if self.handlers.is_empty() {
            return Err(ConfigurationError::NoHandlers);
        }
        self.require_unstarted()?;

        let listener =
            TcpListener::bind((self.config.bind_address.as_str(), self.config.port))
                .map_err(|err| ConfigurationError::Bind(err.to_string()))?;
        let local_addr = listener.local_addr().map_err(|err| ConfigurationError::Bind(err.to_string()))?;

        let config = self.config;
        let handlers = self.handlers;
        let ctx = self.ctx;
        let logger = self.logger;
        let shutdown = self.shutdown.clone();
        let dispatcher = Dispatcher::new(config.dispatch_mode);

        let supervisor = thread::spawn(move || {
            run_stream_supervisor(listener, config, handlers, ctx, dispatcher, logger, shutdown)
        });

        self.state = RunState::Running;
        self.supervisor = Some(supervisor);

        Ok(ServerHandle {
            local_addr,
            shutdown: self.shutdown,
            supervisor: self.supervisor,
        })
    }

    /// `start()` followed by blocking until the supervisor exits naturally.
    pub fn exec(self) -> Result<(), ConfigurationError> {
        let handle = self.start()?;
        handle.join();
        Ok(())
    }
}

/// Returned by `start()`; lets the caller stop the server or wait for it to
/// exit on its own (e.g. after `max_timeouts` consecutive accept timeouts).
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    supervisor: Option<JoinHandle<()>>,
}

impl ServerHandle {
    /// The address actually bound, useful when `port(0)` asked for an
    /// ephemeral one.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Graceful stop: tells the supervisor to stop accepting and signals
    /// workers to finish at their next suspension point, then joins.
    /// Forced stop skips the join -- workers are left to exit on their own.
    pub fn stop(mut self, force: bool) {
        self.shutdown.store(true, Ordering::SeqCst);
        if !force {
            self.join();
        }
    }

    pub fn join(&mut self) {
        if let Some(handle) = self.supervisor.take() {
            let _ = handle.join();
        }
    }
}

fn run_stream_supervisor<Ctx: Send + Sync + 'static>(
    listener: TcpListener,
    config: ServerConfig,
    handlers: Vec<Arc<dyn StreamHandler<Ctx>>>,
    ctx: Arc<Ctx>,
    dispatcher: Dispatcher,
    logger: Logger,
    shutdown: Arc<AtomicBool>,
) {
    let mut workers: Vec<JoinHandle<()>> = Vec::new();
    let mut timeout_count: u32 = 0;

    while !shutdown.load(Ordering::SeqCst) {
        workers.retain(|handle| !handle.is_finished());

        let accepted = accept_with_timeout(&listener, config.accept_timeout);

        let stream = match accepted {
            Ok(Some(stream)) => {
                timeout_count = 0;
                stream
            }
            Ok(None) => {
                timeout_count += 1;
                slog::debug!(logger, "accept timed out"; "consecutive" => timeout_count);
                if config.max_timeouts > 0 && timeout_count >= config.max_timeouts {
                    slog::info!(logger, "max consecutive timeouts reached, stopping supervisor");
                    break;
                }
                continue;
            }
            Err(err) => {
                slog::error!(logger, "fatal accept error, stopping supervisor"; "error" => format!("{}", err));
                break;
            }
        };

        if workers.len() >= config.max_clients {
            slog::warn!(logger, "max concurrent clients reached, dropping connection");
            drop(stream);
            continue;
        }

        let handler = handlers[dispatcher.next(handlers.len())].clone();
        let ctx = ctx.clone();
        let worker_logger = logger.clone();

        let worker = thread::spawn(move || match StreamEndpoint::from_accepted(stream) {
            Ok(endpoint) => handler.handle(endpoint, ctx),
            Err(err) => slog::warn!(worker_logger, "failed wrapping accepted stream"; "error" => format!("{}", err)),
        });

        workers.push(worker);
    }

    slog::info!(logger, "supervisor exiting"; "live_workers" => workers.len());
}

/// A UDP connection server: binds once and dispatches each distinct
/// datagram-originated session to one of its registered handlers, with the
/// endpoint re-anchored to that packet's sender.
pub struct DatagramServer<Ctx: Send + Sync + 'static> {
    config: ServerConfig,
    handlers: Vec<Arc<dyn DatagramHandler<Ctx>>>,
    ctx: Arc<Ctx>,
    logger: Logger,
    state: RunState,
    shutdown: Arc<AtomicBool>,
}

impl<Ctx: Send + Sync + 'static> DatagramServer<Ctx> {
    pub fn new(ctx: Ctx, logger: Logger) -> Self {
        DatagramServer {
            config: ServerConfig::default(),
            handlers: Vec::new(),
            ctx: Arc::new(ctx),
            logger,
            state: RunState::Unstarted,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    fn require_unstarted(&self) -> Result<(), ConfigurationError> {
        match self.state {
            RunState::Unstarted => Ok(()),
            _ => Err(ConfigurationError::AlreadyRunning),
        }
    }

    pub fn bind_address(mut self, addr: &str) -> Result<Self, ConfigurationError> {
        self.require_unstarted()?;
        self.config.bind_address = addr.to_string();
        Ok(self)
    }

    pub fn port(mut self, port: u16) -> Result<Self, ConfigurationError> {
        self.require_unstarted()?;
        self.config.port = port;
        Ok(self)
    }

    pub fn accept_timeout_secs(mut self, secs: u64) -> Result<Self, ConfigurationError> {
        self.require_unstarted()?;
        self.config.accept_timeout = Duration::from_secs(secs);
        Ok(self)
    }

    pub fn max_clients(mut self, count: usize) -> Result<Self, ConfigurationError> {
        self.require_unstarted()?;
        self.config.max_clients = count;
        Ok(self)
    }

    pub fn initial_packet_buffer_size(mut self, size: usize) -> Result<Self, ConfigurationError> {
        self.require_unstarted()?;
        self.config.initial_packet_buffer_size = size;
        Ok(self)
    }

    pub fn dispatch_mode(mut self, mode: DispatchMode) -> Result<Self, ConfigurationError> {
        self.require_unstarted()?;
        self.config.dispatch_mode = mode;
        Ok(self)
    }

    pub fn add_handler<H: DatagramHandler<Ctx> + 'static>(
        mut self,
        handler: H,
    ) -> Result<Self, ConfigurationError> {
        self.require_unstarted()?;
        self.handlers.push(Arc::new(handler));
        Ok(self)
    }

    pub fn start(mut self) -> Result<ServerHandle, ConfigurationError> {
        if self.handlers.is_empty() {
            return Err(ConfigurationError::NoHandlers);
        }
        self.require_unstarted()?;

        let socket = UdpSocket::bind((self.config.bind_address.as_str(), self.config.port))
            .map_err(|err| ConfigurationError::Bind(err.to_string()))?;
        let local_addr = socket.local_addr().map_err(|err| ConfigurationError::Bind(err.to_string()))?;

        let config = self.config;
        let handlers = self.handlers;
        let ctx = self.ctx;
        let logger = self.logger;
        let shutdown = self.shutdown.clone();
        let dispatcher = Dispatcher::new(config.dispatch_mode);

        let supervisor = thread::spawn(move || {
            run_datagram_supervisor(socket, config, handlers, ctx, dispatcher, logger, shutdown)
        });

        self.state = RunState::Running;

        Ok(ServerHandle {
            local_addr,
            shutdown: self.shutdown,
            supervisor: Some(supervisor),
        })
    }

    pub fn exec(self) -> Result<(), ConfigurationError> {
        let handle = self.start()?;
        handle.join();
        Ok(())
    }
}

fn run_datagram_supervisor<Ctx: Send + Sync + 'static>(
    socket: UdpSocket,
    config: ServerConfig,
    handlers: Vec<Arc<dyn DatagramHandler<Ctx>>>,
    ctx: Arc<Ctx>,
    dispatcher: Dispatcher,
    logger: Logger,
    shutdown: Arc<AtomicBool>,
) {
    let workers: Mutex<Vec<JoinHandle<()>>> = Mutex::new(Vec::new());
    let mut timeout_count: u32 = 0;
    let mut buf = vec![0u8; config.initial_packet_buffer_size];

    while !shutdown.load(Ordering::SeqCst) {
        workers.lock().unwrap().retain(|handle| !handle.is_finished());

        let received = recv_with_timeout(&socket, &mut buf, config.accept_timeout);

        let (len, from) = match received {
            Ok(Some(result)) => {
                timeout_count = 0;
                result
            }
            Ok(None) => {
                timeout_count += 1;
                if config.max_timeouts > 0 && timeout_count >= config.max_timeouts {
                    slog::info!(logger, "max consecutive timeouts reached, stopping supervisor");
                    break;
                }
                continue;
            }
            Err(err) => {
                slog::error!(logger, "fatal recv error, stopping supervisor"; "error" => format!("{}", err));
                break;
            }
        };

        let mut live = workers.lock().unwrap();
        if live.len() >= config.max_clients {
            slog::warn!(logger, "max concurrent clients reached, dropping packet");
            continue;
        }

        let packet = buf[..len].to_vec();
        let handler = handlers[dispatcher.next(handlers.len())].clone();
        let ctx = ctx.clone();
        let worker_logger = logger.clone();

        let worker = thread::spawn(move || match DatagramEndpoint::connected_to(from) {
            Ok(endpoint) => handler.handle(endpoint, packet, ctx),
            Err(err) => slog::warn!(worker_logger, "failed anchoring datagram endpoint"; "error" => format!("{}", err)),
        });

        live.push(worker);
    }

    slog::info!(logger, "datagram supervisor exiting");
}
