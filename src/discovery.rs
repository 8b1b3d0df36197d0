//! Find Kasa devices by UDP broadcast
use std::{
    collections::BTreeSet,
    io,
    net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket},
    thread,
    time::{Duration, Instant},
};

use socket2::{Domain, Protocol, SockAddr, Socket, Type};

use crate::{
    commands,
    config::{
        Config, BROADCAST_TARGETS, DEFAULT_PORT, ECHO_THRESHOLD, RECV_BUFFER_SIZE, RECV_TIMEOUT,
        SEND_PACING, SEND_ROUNDS,
    },
    error::{Error, Result},
    interfaces, protocol,
};

/// Datagram transport used by discovery.
pub trait Datagrams {
    fn send_to(&self, buf: &[u8], addr: SocketAddr) -> io::Result<usize>;
    fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;
}

impl Datagrams for UdpSocket {
    fn send_to(&self, buf: &[u8], addr: SocketAddr) -> io::Result<usize> {
        UdpSocket::send_to(self, buf, addr)
    }

    fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        UdpSocket::recv_from(self, buf)
    }
}

#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub port: u16,
    /// How long to keep listening once the broadcasts are out
    pub timeout: Duration,
    pub targets: Vec<Ipv4Addr>,
    pub rounds: usize,
    pub pacing: Duration,
    pub recv_timeout: Duration,
    pub echo_threshold: usize,
}

impl DiscoveryConfig {
    pub fn new(timeout: Duration) -> Self {
        Self {
            port: DEFAULT_PORT,
            timeout,
            targets: BROADCAST_TARGETS.to_vec(),
            rounds: SEND_ROUNDS,
            pacing: SEND_PACING,
            recv_timeout: RECV_TIMEOUT,
            echo_threshold: ECHO_THRESHOLD,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let mut discovery = Self::new(config.discovery_timeout);
        discovery.port = config.port;
        if config.interface_broadcasts {
            discovery = discovery.with_broadcasts(interfaces::broadcast_candidates(
                interfaces::local_addresses(),
            ));
        }
        discovery
    }

    /// Put extra broadcast targets ahead of the fixed ones, dropping repeats.
    pub fn with_broadcasts(mut self, extra: Vec<Ipv4Addr>) -> Self {
        let mut targets = extra;
        targets.append(&mut self.targets);

        let mut seen = BTreeSet::new();
        targets.retain(|ip| seen.insert(*ip));
        self.targets = targets;
        self
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Broadcast a sysinfo query and collect the addresses of devices that answer
/// within `timeout`.
pub fn discover(timeout: Duration) -> Result<BTreeSet<IpAddr>> {
    let mut config = DiscoveryConfig::default();
    config.timeout = timeout;
    Discovery::new(config).run()
}

pub struct Discovery {
    config: DiscoveryConfig,
}

impl Discovery {
    pub fn new(config: DiscoveryConfig) -> Self {
        Self { config }
    }

    pub fn run(&self) -> Result<BTreeSet<IpAddr>> {
        let socket = open_socket(self.config.port, self.config.recv_timeout)
            .map_err(Error::Discovery)?;

        self.broadcast(&socket);
        let devices = self.collect(&socket)?;

        tracing::info!(count = devices.len(), "discovery finished");
        Ok(devices)
    }

    /// Send the query to every target, `rounds` times. A target that cannot
    /// be reached is skipped.
    pub fn broadcast<S: Datagrams>(&self, socket: &S) {
        let query = protocol::encode(&commands::get_sysinfo().to_string());
        let mut sent = 0;
        let mut failed = 0;

        for round in 0..self.config.rounds {
            for target in &self.config.targets {
                let addr = SocketAddr::V4(SocketAddrV4::new(*target, self.config.port));
                match socket.send_to(&query, addr) {
                    Ok(_) => sent += 1,
                    Err(err) => {
                        failed += 1;
                        if round == 0 {
                            tracing::warn!(%addr, error = %err, "broadcast failed");
                        }
                    }
                }
            }
            thread::sleep(self.config.pacing);
        }

        tracing::debug!(sent, failed, "broadcasts sent");
    }

    /// Receive until the timeout elapses, keeping senders of datagrams large
    /// enough to be a device reply.
    pub fn collect<S: Datagrams>(&self, socket: &S) -> Result<BTreeSet<IpAddr>> {
        let started = Instant::now();
        let mut buf = [0_u8; RECV_BUFFER_SIZE];
        let mut devices = BTreeSet::new();

        while started.elapsed() < self.config.timeout {
            match socket.recv_from(&mut buf) {
                Ok((size, addr)) if size > self.config.echo_threshold => {
                    if devices.insert(addr.ip()) {
                        tracing::debug!(%addr, size, "device replied");
                    }
                }
                Ok((size, addr)) => {
                    tracing::trace!(%addr, size, "ignoring echo");
                }
                Err(ref err)
                    if err.kind() == io::ErrorKind::WouldBlock
                        || err.kind() == io::ErrorKind::TimedOut =>
                {
                    continue
                }
                Err(err) => return Err(Error::Discovery(err)),
            }
        }

        Ok(devices)
    }
}

/// UDP socket with broadcast and address reuse, bound to `port` when it is
/// free and to an ephemeral port otherwise.
fn open_socket(port: u16, recv_timeout: Duration) -> io::Result<UdpSocket> {
    let socket = match bind_udp(port) {
        Ok(socket) => socket,
        Err(err) => {
            tracing::debug!(port, error = %err, "port busy, binding an ephemeral port");
            bind_udp(0)?
        }
    };
    socket.set_read_timeout(Some(recv_timeout))?;
    Ok(socket.into())
}

fn bind_udp(port: u16) -> io::Result<Socket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_broadcast(true)?;
    socket.set_reuse_address(true)?;
    socket.bind(&SockAddr::from(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port)))?;
    Ok(socket)
}
