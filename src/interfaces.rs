//! Best-effort enumeration of local IPv4 addresses
//!
//! This is a heuristic: it resolves the host name and asks the kernel which
//! address it would route an outbound datagram from. Results depend on the
//! platform and resolver configuration, and any source that fails simply
//! contributes nothing.
use std::{
    collections::HashSet,
    iter,
    net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs, UdpSocket},
};

/// Where the outbound-route probe pretends to send. Nothing is transmitted.
const ROUTE_PROBE: &str = "8.8.8.8:80";

/// Candidate local IPv4 addresses, loopback excluded, each reported once.
pub fn local_addresses() -> impl Iterator<Item = Ipv4Addr> {
    let mut seen = HashSet::new();
    iter::once(hostname_addresses as fn() -> Vec<Ipv4Addr>)
        .chain(iter::once(route_address as fn() -> Vec<Ipv4Addr>))
        .flat_map(|source| source())
        .filter(|ip| !ip.is_loopback() && !ip.is_unspecified())
        .filter(move |ip| seen.insert(*ip))
}

#[cfg(unix)]
fn hostname_addresses() -> Vec<Ipv4Addr> {
    let hostname = match nix::unistd::gethostname() {
        Ok(name) => name.to_string_lossy().into_owned(),
        Err(err) => {
            tracing::debug!(error = %err, "could not read host name");
            return Vec::new();
        }
    };
    match (hostname.as_str(), 0).to_socket_addrs() {
        Ok(addrs) => addrs.filter_map(|addr| ipv4(addr.ip())).collect(),
        Err(err) => {
            tracing::debug!(%hostname, error = %err, "could not resolve host name");
            Vec::new()
        }
    }
}

#[cfg(not(unix))]
fn hostname_addresses() -> Vec<Ipv4Addr> {
    Vec::new()
}

fn route_address() -> Vec<Ipv4Addr> {
    let probe = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
        .and_then(|socket| socket.connect(ROUTE_PROBE).map(|_| socket))
        .and_then(|socket| socket.local_addr());
    match probe {
        Ok(SocketAddr::V4(addr)) => vec![*addr.ip()],
        Ok(_) => Vec::new(),
        Err(err) => {
            tracing::debug!(error = %err, "no outbound route");
            Vec::new()
        }
    }
}

fn ipv4(ip: IpAddr) -> Option<Ipv4Addr> {
    match ip {
        IpAddr::V4(ip) => Some(ip),
        IpAddr::V6(_) => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressClass {
    Private10,
    Private172,
    Private192,
    /// 100.64.0.0/10, as handed out by Tailscale and similar overlays
    CgnatVpn,
    LinkLocal,
    Public,
}

impl AddressClass {
    pub fn of(ip: Ipv4Addr) -> AddressClass {
        match ip.octets() {
            [10, ..] => AddressClass::Private10,
            [172, b, ..] if (16..=31).contains(&b) => AddressClass::Private172,
            [192, 168, ..] => AddressClass::Private192,
            [100, b, ..] if (64..=127).contains(&b) => AddressClass::CgnatVpn,
            [169, 254, ..] => AddressClass::LinkLocal,
            _ => AddressClass::Public,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            AddressClass::Private10 => "Private network (10.x.x.x)",
            AddressClass::Private172 => "Private network (172.16-31.x.x)",
            AddressClass::Private192 => "Private network (192.168.x.x)",
            AddressClass::CgnatVpn => "CGNAT/VPN (likely Tailscale/ZeroTier)",
            AddressClass::LinkLocal => "Link-local (169.254.x.x - no DHCP)",
            AddressClass::Public => "Unknown/Public",
        }
    }

    pub fn is_private(self) -> bool {
        matches!(
            self,
            AddressClass::Private10 | AddressClass::Private172 | AddressClass::Private192
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterfaceInfo {
    pub ip: Ipv4Addr,
    pub category: AddressClass,
    pub description: &'static str,
    pub broadcast_24: Ipv4Addr,
    pub broadcast_16: Ipv4Addr,
    pub is_vpn: bool,
}

impl InterfaceInfo {
    pub fn new(ip: Ipv4Addr) -> Self {
        let category = AddressClass::of(ip);
        let [a, b, c, _] = ip.octets();
        Self {
            ip,
            category,
            description: category.description(),
            broadcast_24: Ipv4Addr::new(a, b, c, 255),
            broadcast_16: Ipv4Addr::new(a, b, 255, 255),
            is_vpn: category == AddressClass::CgnatVpn,
        }
    }
}

pub fn local_interfaces() -> Vec<InterfaceInfo> {
    local_addresses().map(InterfaceInfo::new).collect()
}

/// First non-VPN private interface, else whatever came first.
pub fn recommended(interfaces: &[InterfaceInfo]) -> Option<&InterfaceInfo> {
    interfaces
        .iter()
        .find(|iface| !iface.is_vpn && iface.category.is_private())
        .or_else(|| interfaces.first())
}

/// Subnet broadcasts worth trying for discovery: /24 then /16 of every
/// non-VPN address.
pub fn broadcast_candidates<I>(addresses: I) -> Vec<Ipv4Addr>
where
    I: IntoIterator<Item = Ipv4Addr>,
{
    addresses
        .into_iter()
        .map(InterfaceInfo::new)
        .filter(|iface| !iface.is_vpn)
        .flat_map(|iface| vec![iface.broadcast_24, iface.broadcast_16])
        .collect()
}
