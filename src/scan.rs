//! Probe a /24 for hosts listening on the Kasa port
use std::{
    io::{Read, Write},
    net::{Ipv4Addr, SocketAddr, TcpStream},
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use rayon::prelude::*;

use crate::{
    commands,
    config::{Config, RECV_BUFFER_SIZE, SCAN_WORKERS},
    error::{Error, Result},
    interfaces::{self, AddressClass},
    protocol,
};

const FALLBACK_SUBNET: [u8; 3] = [192, 168, 1];
const PROGRESS_EVERY: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanHit {
    pub ip: Ipv4Addr,
    pub port: u16,
    pub open: bool,
    pub responding: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_length: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// First three octets of the /24 to scan
    pub subnet: [u8; 3],
    pub start: u8,
    pub end: u8,
    pub port: u16,
    pub timeout: Duration,
    pub workers: usize,
}

impl ScanConfig {
    pub fn new(subnet: [u8; 3], config: &Config) -> Self {
        Self {
            subnet,
            start: 1,
            end: 255,
            port: config.port,
            timeout: config.scan_timeout,
            workers: SCAN_WORKERS,
        }
    }

    fn hosts(&self) -> Vec<Ipv4Addr> {
        let [a, b, c] = self.subnet;
        (self.start..=self.end)
            .map(|d| Ipv4Addr::new(a, b, c, d))
            .collect()
    }
}

/// Parse `"192.168.4"` (or `"192.168.4.0"`) into the three network octets.
pub fn parse_subnet(subnet: &str) -> Result<[u8; 3]> {
    let invalid = || Error::Other(format!("Invalid subnet: {}", subnet));
    let octets = subnet
        .split('.')
        .map(|part| part.parse::<u8>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|_| invalid())?;

    match octets.as_slice() {
        [a, b, c] | [a, b, c, 0] => Ok([*a, *b, *c]),
        _ => Err(invalid()),
    }
}

/// The /24 of the recommended local address when it is on 192.168.x.x,
/// otherwise 192.168.1.
pub fn default_subnet() -> [u8; 3] {
    let local = interfaces::local_interfaces();
    match interfaces::recommended(&local) {
        Some(iface) if iface.category == AddressClass::Private192 => {
            let [a, b, c, _] = iface.ip.octets();
            [a, b, c]
        }
        Some(iface) => {
            tracing::warn!(ip = %iface.ip, "local address is not on 192.168.x.x, using default subnet");
            FALLBACK_SUBNET
        }
        None => {
            tracing::warn!("could not detect a local address, using default subnet");
            FALLBACK_SUBNET
        }
    }
}

/// Connect to `ip:port`; when it accepts, send a sysinfo query and note
/// whether anything came back. Closed or filtered ports yield `None`.
pub fn check_port(ip: Ipv4Addr, port: u16, timeout: Duration) -> Option<ScanHit> {
    let addr = SocketAddr::from((ip, port));
    let mut stream = TcpStream::connect_timeout(&addr, timeout).ok()?;

    let closed = ScanHit {
        ip,
        port,
        open: true,
        responding: false,
        data_length: None,
    };

    let query = protocol::encode(&commands::get_sysinfo().to_string());
    let exchange = stream
        .set_read_timeout(Some(timeout))
        .and_then(|_| stream.set_write_timeout(Some(timeout)))
        .and_then(|_| stream.write_all(&query))
        .and_then(|_| {
            let mut buf = [0_u8; RECV_BUFFER_SIZE];
            stream.read(&mut buf)
        });

    match exchange {
        Ok(read) if read > 4 => Some(ScanHit {
            responding: true,
            data_length: Some(read),
            ..closed
        }),
        Ok(_) => Some(closed),
        Err(err) => {
            tracing::debug!(%addr, error = %err, "port open but no reply");
            Some(closed)
        }
    }
}

/// Probe every host in the range on a bounded pool.
pub fn scan_subnet(config: &ScanConfig) -> Result<Vec<ScanHit>> {
    let hosts = config.hosts();
    let total = hosts.len();
    let checked = AtomicUsize::new(0);
    let [a, b, c] = config.subnet;

    tracing::info!(
        "scanning {}.{}.{}.{}-{} for port {}",
        a,
        b,
        c,
        config.start,
        config.end,
        config.port
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.workers)
        .build()
        .map_err(|err| Error::Other(format!("Could not start scan workers: {}", err)))?;

    let mut hits: Vec<ScanHit> = pool.install(|| {
        hosts
            .into_par_iter()
            .filter_map(|ip| {
                let hit = check_port(ip, config.port, config.timeout);
                let done = checked.fetch_add(1, Ordering::Relaxed) + 1;
                if done % PROGRESS_EVERY == 0 {
                    tracing::info!("progress: {}/{} hosts checked", done, total);
                }
                if let Some(hit) = &hit {
                    tracing::info!(ip = %hit.ip, responding = hit.responding, "found open port");
                }
                hit
            })
            .collect()
    });

    hits.sort_by_key(|hit| hit.ip);
    Ok(hits)
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub found: usize,
    pub kasa_devices: Vec<Ipv4Addr>,
    pub other_devices: Vec<Ipv4Addr>,
    pub all_devices: Vec<ScanHit>,
}

impl From<Vec<ScanHit>> for ScanReport {
    fn from(hits: Vec<ScanHit>) -> Self {
        let (kasa, other): (Vec<_>, Vec<_>) = hits.iter().partition(|hit| hit.responding);
        Self {
            found: hits.len(),
            kasa_devices: kasa.into_iter().map(|hit| hit.ip).collect(),
            other_devices: other.into_iter().map(|hit| hit.ip).collect(),
            all_devices: hits,
        }
    }
}
